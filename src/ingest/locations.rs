//! Temporary node id to location map used between the node and way phases.

use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::debug;

use crate::types::{Location, Result, RoadGraphError};

#[derive(Default)]
struct Pending {
    entries: Vec<(i64, u64)>,
    sealed: bool,
}

struct Frozen {
    ids: Vec<i64>,
    packed: Vec<u64>,
}

/// Node positions collected during the node phase.
///
/// Inserts go through a lock. [`NodeLocationMap::freeze`] sorts the entries
/// into two parallel arrays; lookups are only answered after that and need
/// no lock.
#[derive(Default)]
pub struct NodeLocationMap {
    pending: Mutex<Pending>,
    frozen: OnceLock<Frozen>,
}

impl std::fmt::Debug for NodeLocationMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeLocationMap")
            .field("frozen", &self.is_frozen())
            .field("len", &self.len())
            .finish()
    }
}

impl NodeLocationMap {
    /// An empty, writable map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the position of node `id`. A later insert for the same id wins.
    pub fn insert(&self, id: i64, location: Location) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.sealed {
            return Err(RoadGraphError::Invalid("node location map is frozen"));
        }
        pending.entries.push((id, location.packed()));
        Ok(())
    }

    /// Sorts the collected entries and makes the map read-only. Returns the
    /// number of distinct nodes. Idempotent.
    pub fn freeze(&self) -> usize {
        let frozen = self.frozen.get_or_init(|| {
            let mut entries = {
                let mut pending = self.pending.lock();
                pending.sealed = true;
                std::mem::take(&mut pending.entries)
            };
            entries.sort_by_key(|(id, _)| *id);
            let mut ids: Vec<i64> = Vec::with_capacity(entries.len());
            let mut packed: Vec<u64> = Vec::with_capacity(entries.len());
            for (id, location) in entries {
                if ids.last() == Some(&id) {
                    if let Some(last) = packed.last_mut() {
                        *last = location;
                    }
                    continue;
                }
                ids.push(id);
                packed.push(location);
            }
            ids.shrink_to_fit();
            packed.shrink_to_fit();
            debug!(nodes = ids.len(), "node_locations.freeze");
            Frozen { ids, packed }
        });
        frozen.ids.len()
    }

    /// True once [`NodeLocationMap::freeze`] ran.
    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    /// Position of node `id`. Always `None` before the map is frozen.
    pub fn get(&self, id: i64) -> Option<Location> {
        let frozen = self.frozen.get()?;
        let slot = frozen.ids.binary_search(&id).ok()?;
        frozen.packed.get(slot).map(|packed| Location::from_packed(*packed))
    }

    /// Entries held, pending or frozen.
    pub fn len(&self) -> usize {
        match self.frozen.get() {
            Some(frozen) => frozen.ids.len(),
            None => self.pending.lock().entries.len(),
        }
    }

    /// True when the map holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
