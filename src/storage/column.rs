#![forbid(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::storage::archive::{Archive, FieldPayload};
use crate::storage::codec::ColumnCodec;
use crate::types::{ElementIndex, Result, RoadGraphError};

/// One lazily loaded attribute array of a store.
///
/// Slot `i` holds the value of the element with index `i`; slot 0 is never
/// written. Slots past the end read as `T::default()`, the null marker.
pub struct AttributeColumn<T: ColumnCodec> {
    owner: String,
    name: &'static str,
    estimate: usize,
    values: RwLock<Option<Vec<T>>>,
    frozen: AtomicBool,
    archive: RwLock<Option<Arc<Archive>>>,
}

impl<T: ColumnCodec> fmt::Debug for AttributeColumn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeColumn")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl<T: ColumnCodec> AttributeColumn<T> {
    /// Declares an unloaded column.
    pub fn new(owner: impl Into<String>, name: &'static str, estimate: usize) -> Self {
        Self {
            owner: owner.into(),
            name,
            estimate,
            values: RwLock::new(None),
            frozen: AtomicBool::new(false),
            archive: RwLock::new(None),
        }
    }

    /// Field name inside the owner's archive entries.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Backs the column with `archive` for lazy loads.
    pub fn attach(&self, archive: Arc<Archive>) {
        *self.archive.write() = Some(archive);
    }

    /// Returns true when values are resident.
    pub fn is_loaded(&self) -> bool {
        self.values.read().is_some()
    }

    /// Returns true once [`AttributeColumn::freeze`] ran.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Loads the persisted values, or allocates an empty column when the
    /// archive has none. A no-op when already loaded.
    pub fn load(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let archive = self.archive.read().clone();
        let mut guard = self.values.write();
        if guard.is_some() {
            return Ok(());
        }
        let persisted = match archive {
            Some(archive) => archive.load_column::<T>(&self.owner, self.name)?,
            None => None,
        };
        match persisted {
            Some(values) => {
                trace!(
                    owner = %self.owner,
                    column = self.name,
                    len = values.len(),
                    "column.load"
                );
                *guard = Some(values);
            }
            None => *guard = Some(Vec::with_capacity(self.estimate)),
        }
        Ok(())
    }

    /// Replaces the values with an empty vector sized by the estimate.
    pub fn allocate(&self) {
        *self.values.write() = Some(Vec::with_capacity(self.estimate));
    }

    /// Drops the in-memory values. Persisted data is untouched.
    pub fn unload(&self) {
        if self.values.write().take().is_some() {
            trace!(owner = %self.owner, column = self.name, "column.unload");
        }
    }

    /// Reads slot `index`, loading the column first if needed.
    pub fn get(&self, index: ElementIndex) -> Result<T> {
        self.with_values(|values| values.get(index.slot()).cloned().unwrap_or_default())
    }

    /// Writes slot `index`, growing the column with null markers as needed.
    pub fn set(&self, index: ElementIndex, value: T) -> Result<()> {
        if self.is_frozen() {
            return Err(RoadGraphError::Frozen(format!("{}.{}", self.owner, self.name)));
        }
        self.load()?;
        let mut guard = self.values.write();
        let values = guard.get_or_insert_with(Vec::new);
        let slot = index.slot();
        if values.len() <= slot {
            values.resize(slot + 1, T::default());
        }
        values[slot] = value;
        Ok(())
    }

    /// Shrinks storage and marks the column read-only.
    pub fn freeze(&self) {
        if let Some(values) = self.values.write().as_mut() {
            values.shrink_to_fit();
        }
        self.frozen.store(true, Ordering::Release);
    }

    /// Makes a frozen column writable again.
    pub fn thaw(&self) {
        self.frozen.store(false, Ordering::Release);
    }

    /// Number of slots (slot 0 included), loading first if needed.
    pub fn len(&self) -> Result<usize> {
        self.with_values(|values| values.len())
    }

    /// Returns true when no slot is allocated.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Runs `f` over the loaded values.
    pub fn with_values<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        self.load()?;
        let guard = self.values.read();
        Ok(f(guard.as_deref().unwrap_or(&[])))
    }

    /// Clones the loaded values.
    pub fn snapshot(&self) -> Result<Vec<T>> {
        self.with_values(|values| values.to_vec())
    }

    /// Encodes the column for the archive.
    pub fn payload(&self) -> Result<FieldPayload> {
        self.with_values(|values| FieldPayload::column(self.name, values))
    }
}

/// Type-erased view of a column used by store-wide lifecycle operations.
pub trait Column: Send + Sync {
    /// Field name.
    fn name(&self) -> &'static str;
    /// See [`AttributeColumn::load`].
    fn load(&self) -> Result<()>;
    /// See [`AttributeColumn::unload`].
    fn unload(&self);
    /// See [`AttributeColumn::is_loaded`].
    fn is_loaded(&self) -> bool;
    /// See [`AttributeColumn::freeze`].
    fn freeze(&self);
    /// See [`AttributeColumn::thaw`].
    fn thaw(&self);
    /// See [`AttributeColumn::attach`].
    fn attach(&self, archive: Arc<Archive>);
    /// See [`AttributeColumn::payload`].
    fn payload(&self) -> Result<FieldPayload>;
}

impl<T: ColumnCodec> Column for AttributeColumn<T> {
    fn name(&self) -> &'static str {
        AttributeColumn::name(self)
    }

    fn load(&self) -> Result<()> {
        AttributeColumn::load(self)
    }

    fn unload(&self) {
        AttributeColumn::unload(self)
    }

    fn is_loaded(&self) -> bool {
        AttributeColumn::is_loaded(self)
    }

    fn freeze(&self) {
        AttributeColumn::freeze(self)
    }

    fn thaw(&self) {
        AttributeColumn::thaw(self)
    }

    fn attach(&self, archive: Arc<Archive>) {
        AttributeColumn::attach(self, archive)
    }

    fn payload(&self) -> Result<FieldPayload> {
        AttributeColumn::payload(self)
    }
}

/// A fixed group of columns belonging to one element kind.
pub trait ColumnSet: Send + Sync {
    /// Every column of the group.
    fn columns(&self) -> Vec<&dyn Column>;
}
