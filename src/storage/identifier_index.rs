#![forbid(unsafe_code)]

use rustc_hash::FxHashMap;

use crate::types::{ElementIndex, Identifier, Result, RoadGraphError};

/// Lookup mode for [`IdentifierIndex::index_for`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndexMode {
    /// Return the existing index or fail with `NotFound`.
    Get,
    /// Return the existing index or allocate the next one.
    Create,
}

/// Bidirectional identifier ↔ dense index mapping for one store.
///
/// Indices start at 1 and are handed out sequentially. Removing an identifier
/// never compacts: the slot it occupied stays allocated for the life of the
/// store. Identifiers are keyed by absolute value, so a reverse edge resolves
/// to the same slot as its forward edge.
#[derive(Debug, Clone)]
pub struct IdentifierIndex {
    map: FxHashMap<i64, u32>,
    next: u32,
}

impl Default for IdentifierIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty index sized for `capacity` identifiers.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut map = FxHashMap::default();
        map.reserve(capacity);
        Self { map, next: 1 }
    }

    /// Reconstructs the index from a persisted identifier column.
    ///
    /// Slot 0 and null markers are skipped; the next index continues after the
    /// last slot of the column.
    pub fn rebuild(identifiers: &[Identifier]) -> Self {
        let mut index = Self::with_capacity(identifiers.len());
        for (slot, identifier) in identifiers.iter().enumerate().skip(1) {
            if identifier.is_valid() {
                index.map.insert(identifier.normalized().0, slot as u32);
            }
        }
        index.next = identifiers.len().max(1) as u32;
        index
    }

    /// Resolves `identifier` according to `mode`.
    pub fn index_for(&mut self, identifier: Identifier, mode: IndexMode) -> Result<ElementIndex> {
        match mode {
            IndexMode::Get => self.get(identifier),
            IndexMode::Create => {
                if !identifier.is_valid() {
                    return Err(RoadGraphError::Invalid("identifier must be non-zero"));
                }
                let key = identifier.normalized().0;
                if let Some(&existing) = self.map.get(&key) {
                    return Ok(ElementIndex(existing));
                }
                let index = self.next;
                self.next = self
                    .next
                    .checked_add(1)
                    .ok_or(RoadGraphError::Invalid("index space exhausted"))?;
                self.map.insert(key, index);
                Ok(ElementIndex(index))
            }
        }
    }

    /// GET-mode lookup through a shared reference.
    pub fn get(&self, identifier: Identifier) -> Result<ElementIndex> {
        self.map
            .get(&identifier.normalized().0)
            .map(|&index| ElementIndex(index))
            .ok_or(RoadGraphError::NotFound(identifier))
    }

    /// Returns true when `identifier` is mapped.
    pub fn contains(&self, identifier: Identifier) -> bool {
        self.map.contains_key(&identifier.normalized().0)
    }

    /// Deletes the mapping for `identifier`, returning the index it held.
    pub fn remove(&mut self, identifier: Identifier) -> Option<ElementIndex> {
        self.map
            .remove(&identifier.normalized().0)
            .map(ElementIndex)
    }

    /// Retargets slot `index` from `old` to `new`.
    ///
    /// Fails without changing anything when `old` is not mapped to `index` or
    /// `new` already maps to a different slot.
    pub fn overwrite(
        &mut self,
        index: ElementIndex,
        old: Identifier,
        new: Identifier,
    ) -> Result<()> {
        if !new.is_valid() {
            return Err(RoadGraphError::Invalid("identifier must be non-zero"));
        }
        let current = self.get(old)?;
        if current != index {
            return Err(RoadGraphError::Invalid(
                "overwrite index does not match identifier",
            ));
        }
        let new_key = new.normalized().0;
        match self.map.get(&new_key) {
            Some(&other) if other != index.0 => {
                return Err(RoadGraphError::Invalid("identifier already indexed"));
            }
            _ => {}
        }
        self.map.remove(&old.normalized().0);
        self.map.insert(new_key, index.0);
        Ok(())
    }

    /// Number of live mappings.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no identifier is mapped.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The index the next CREATE will hand out. Also the slot count of the
    /// columns (slot 0 included).
    pub fn next_index(&self) -> ElementIndex {
        ElementIndex(self.next)
    }

    /// Iterates over `(normalized identifier, index)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (Identifier, ElementIndex)> + '_ {
        self.map
            .iter()
            .map(|(&identifier, &index)| (Identifier(identifier), ElementIndex(index)))
    }
}
