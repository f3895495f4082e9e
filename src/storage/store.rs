#![forbid(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::archive::{Archive, ArchiveOwner, ArchiveVersion, FieldPayload};
use super::batch::{Adder, Batcher};
use super::column::{Column, ColumnSet};
use super::context::GraphContext;
use super::element::{CommonColumns, ElementKind, Rejection};
use super::identifier_index::{IdentifierIndex, IndexMode};
use super::metrics::StoreMetrics;
use super::options::StoreOptions;
use super::validate::ValidationReport;
use crate::types::{ElementIndex, ElementKindTag, Identifier, Result, RoadGraphError};

/// Archive field holding [`StoreMetadata`].
pub const STORE_METADATA_FIELD: &str = "store_metadata";

/// Counters persisted next to a store's columns.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreMetadata {
    /// Kind of the store.
    pub kind: ElementKindTag,
    /// Accepted adds.
    pub size: u64,
    /// Rejected adds.
    pub discarded: u64,
    /// Whether the store was committed when saved.
    pub committed: bool,
}

/// Columnar storage for all elements of one kind.
///
/// Elements are appended through [`ElementStore::add`] (or an [`Adder`]),
/// each receiving a dense index from the store's [`IdentifierIndex`].
/// [`ElementStore::commit`] freezes every column; afterwards the store is
/// read-only except for the thread running [`ElementStore::post_commit`].
pub struct ElementStore<K: ElementKind> {
    name: String,
    context: Arc<GraphContext>,
    options: StoreOptions,
    metrics: Arc<dyn StoreMetrics>,
    index: Mutex<IdentifierIndex>,
    common: CommonColumns,
    columns: K::Columns,
    size: AtomicU64,
    discarded: AtomicU64,
    committed: AtomicBool,
    dirty: AtomicBool,
    batcher: Mutex<Option<Batcher<K>>>,
    archive: RwLock<Option<Arc<Archive>>>,
    reopen: Mutex<()>,
    reopened_by: RwLock<Option<ThreadId>>,
}

impl<K: ElementKind> fmt::Debug for ElementStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementStore")
            .field("name", &self.name)
            .field("kind", &K::TAG)
            .field("size", &self.size())
            .field("committed", &self.is_committed())
            .finish()
    }
}

impl<K: ElementKind> ElementStore<K> {
    /// Creates an empty, open store.
    pub fn new(name: impl Into<String>, context: Arc<GraphContext>, options: StoreOptions) -> Arc<Self> {
        Arc::new(Self::build(name.into(), context, options))
    }

    fn build(name: String, context: Arc<GraphContext>, options: StoreOptions) -> Self {
        let metrics = options
            .metrics
            .clone()
            .unwrap_or_else(|| Arc::clone(context.metrics()));
        let common = CommonColumns::new(&name, options.estimate);
        let columns = K::columns(&name, options.estimate);
        Self {
            index: Mutex::new(IdentifierIndex::with_capacity(options.estimate)),
            name,
            context,
            options,
            metrics,
            common,
            columns,
            size: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            committed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            batcher: Mutex::new(None),
            archive: RwLock::new(None),
            reopen: Mutex::new(()),
            reopened_by: RwLock::new(None),
        }
    }

    /// Opens a store previously saved into `archive`.
    ///
    /// Only the identifier column is read eagerly, to rebuild the index;
    /// every other column loads on first access.
    pub fn open(
        name: impl Into<String>,
        context: Arc<GraphContext>,
        options: StoreOptions,
        archive: Arc<Archive>,
    ) -> Result<Arc<Self>> {
        let store = Self::build(name.into(), context, options);
        let metadata: StoreMetadata = archive
            .load_value(&store.name, STORE_METADATA_FIELD)?
            .ok_or(RoadGraphError::Corruption("store metadata missing"))?;
        if metadata.kind != K::TAG {
            return Err(RoadGraphError::Corruption("store kind mismatch"));
        }
        store.attach(Arc::clone(&archive));
        let identifiers = store.common.identifier.snapshot()?;
        *store.index.lock() = IdentifierIndex::rebuild(&identifiers);
        store.size.store(metadata.size, Ordering::Relaxed);
        store.discarded.store(metadata.discarded, Ordering::Relaxed);
        if metadata.committed {
            store.freeze_columns();
            store.committed.store(true, Ordering::Release);
        }
        info!(
            store = %store.name,
            kind = %K::TAG,
            size = metadata.size,
            archive = %archive.path().display(),
            "store.open"
        );
        Ok(Arc::new(store))
    }

    /// Name of the store; also its archive owner key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared graph context.
    pub fn context(&self) -> &Arc<GraphContext> {
        &self.context
    }

    /// Kind-specific columns.
    pub fn kind_columns(&self) -> &K::Columns {
        &self.columns
    }

    /// Columns shared by every kind.
    pub fn common_columns(&self) -> &CommonColumns {
        &self.common
    }

    /// Returns a producer handle: batched when the store was built with
    /// [`StoreOptions::batching`], direct otherwise.
    pub fn adder(self: &Arc<Self>) -> Result<Adder<K>> {
        if self.is_committed() {
            return Err(RoadGraphError::Committed(self.name.clone()));
        }
        if !self.options.batching {
            return Ok(Adder::Direct(Arc::clone(self)));
        }
        let mut batcher = self.batcher.lock();
        if batcher.is_none() {
            *batcher = Some(Batcher::spawn(
                Arc::downgrade(self),
                &self.name,
                self.options.queue_capacity,
            )?);
        }
        batcher
            .as_ref()
            .and_then(Batcher::handle)
            .map(Adder::Batched)
            .ok_or(RoadGraphError::Committed(self.name.clone()))
    }

    /// Validates and appends one element. Returns true when it was stored.
    pub fn add(&self, spec: K::Spec) -> bool {
        if !self.accepts_writes() {
            self.refuse_late(&spec);
            return false;
        }
        if let Err(rejection) = K::validate(&spec) {
            self.reject(&spec, rejection);
            return false;
        }
        match self.insert(&spec) {
            Ok(index) => {
                self.metrics.element_added(K::TAG);
                trace!(store = %self.name, index = index.0, "store.add");
                true
            }
            Err(RoadGraphError::Committed(_)) => {
                self.refuse_late(&spec);
                false
            }
            Err(err) => {
                warn!(
                    store = %self.name,
                    identifier = %K::common(&spec).identifier,
                    error = %err,
                    "store.add_failed"
                );
                self.discarded.fetch_add(1, Ordering::Relaxed);
                self.metrics.element_discarded(K::TAG);
                false
            }
        }
    }

    fn refuse_late(&self, spec: &K::Spec) {
        warn!(
            store = %self.name,
            identifier = %K::common(spec).identifier,
            "store.add_after_commit"
        );
        self.metrics.add_after_commit(K::TAG);
    }

    fn reject(&self, spec: &K::Spec, rejection: Rejection) {
        debug!(
            store = %self.name,
            identifier = %K::common(spec).identifier,
            reason = %rejection,
            "store.discard"
        );
        self.discarded.fetch_add(1, Ordering::Relaxed);
        self.metrics.element_discarded(K::TAG);
    }

    fn insert(&self, spec: &K::Spec) -> Result<ElementIndex> {
        let common = K::common(spec);
        self.run_hook("on_adding", K::on_adding(&self.columns, spec));

        let mut index_guard = self.index.lock();
        if !self.accepts_writes() {
            return Err(RoadGraphError::Committed(self.name.clone()));
        }
        if index_guard.contains(common.identifier) {
            return Err(RoadGraphError::Invalid("identifier already stored"));
        }
        let index = index_guard.index_for(common.identifier, IndexMode::Create)?;
        let written = self
            .common
            .write(index, common, self.context.tags())
            .and_then(|()| K::write(&self.columns, index, spec));
        if let Err(err) = written {
            index_guard.remove(common.identifier);
            if let Err(cleanup) = self.common.identifier.set(index, Identifier::NULL) {
                warn!(
                    store = %self.name,
                    index = index.0,
                    error = %cleanup,
                    "store.add_cleanup_failed"
                );
            }
            return Err(err);
        }
        self.run_hook("on_add", K::on_add(&self.columns, index, spec));
        self.size.fetch_add(1, Ordering::Relaxed);
        self.dirty.store(true, Ordering::Release);
        self.run_hook("on_added", K::on_added(&self.columns, index, spec));
        Ok(index)
    }

    fn run_hook(&self, hook: &'static str, outcome: Result<()>) {
        if let Err(err) = outcome {
            warn!(store = %self.name, hook, error = %err, "store.hook_failed");
        }
    }

    /// Flushes the batch queue and freezes every column. Idempotent.
    ///
    /// Blocks until every [`super::BatchAdder`] handed out has been dropped.
    pub fn commit(&self) -> Result<()> {
        if self.is_committed() {
            return Ok(());
        }
        let batcher = self.batcher.lock().take();
        if let Some(batcher) = batcher {
            batcher.finish()?;
        }
        let _index = self.index.lock();
        K::finalize(&self.columns)?;
        self.freeze_columns();
        self.committed.store(true, Ordering::Release);
        self.metrics.store_committed(K::TAG);
        info!(
            store = %self.name,
            kind = %K::TAG,
            size = self.size(),
            discarded = self.discarded(),
            "store.commit"
        );
        Ok(())
    }

    /// Re-opens a committed store for the calling thread, runs `f`, and
    /// freezes it again whether or not `f` succeeded. On an open store `f`
    /// simply runs.
    ///
    /// The store stays committed for every other thread while `f` runs;
    /// their adds are refused as after any commit. Concurrent calls run one
    /// after the other.
    pub fn post_commit<R>(&self, f: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        if !self.is_committed() || self.is_reopened_here() {
            return f(self);
        }
        let _reopen = self.reopen.lock();
        let outcome = {
            let _reopened = Reopened::enter(self);
            f(self)
        };
        debug!(store = %self.name, ok = outcome.is_ok(), "store.post_commit");
        outcome
    }

    fn is_reopened_here(&self) -> bool {
        *self.reopened_by.read() == Some(thread::current().id())
    }

    fn accepts_writes(&self) -> bool {
        !self.is_committed() || self.is_reopened_here()
    }

    /// Fails with [`RoadGraphError::Committed`] unless the calling thread may
    /// write: the store is open, or this thread re-opened it.
    pub fn ensure_writable(&self) -> Result<()> {
        if self.accepts_writes() {
            Ok(())
        } else {
            Err(RoadGraphError::Committed(self.name.clone()))
        }
    }

    fn freeze_columns(&self) {
        for column in self.all_columns() {
            column.freeze();
        }
    }

    fn all_columns(&self) -> Vec<&dyn Column> {
        let mut columns = self.common.columns();
        columns.extend(self.columns.columns());
        columns
    }

    /// True after [`ElementStore::commit`], including while a
    /// [`ElementStore::post_commit`] closure runs.
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Index of `identifier` (either direction).
    pub fn retrieve_index(&self, identifier: Identifier) -> Result<ElementIndex> {
        self.index
            .lock()
            .get(identifier)
            .map_err(|_| RoadGraphError::NoIndex(identifier))
    }

    /// Index of the element a spec describes.
    pub fn retrieve_index_of(&self, spec: &K::Spec) -> Result<ElementIndex> {
        self.retrieve_index(K::common(spec).identifier)
    }

    /// Returns true when `identifier` is stored.
    pub fn contains(&self, identifier: Identifier) -> bool {
        self.index.lock().contains(identifier)
    }

    /// Reads the element at `index`.
    pub fn record(&self, index: ElementIndex) -> Result<K::Record> {
        let identifier = self.common.identifier.get(index)?;
        if !index.is_some() || !identifier.is_valid() {
            return Err(RoadGraphError::Invalid("no element at index"));
        }
        let common = self.common.read(index, self.context.tags())?;
        K::read(&self.columns, index, common)
    }

    /// Reads the element with `identifier`.
    pub fn record_of(&self, identifier: Identifier) -> Result<K::Record> {
        self.record(self.retrieve_index(identifier)?)
    }

    /// Accepted adds, including elements removed since.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Rejected adds.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Logical element count: live identifiers plus rows the kind implies.
    pub fn count(&self) -> Result<u64> {
        let live = self.live_indices()?;
        Ok(live.len() as u64 + K::implied_rows(&self.columns, &live)?)
    }

    fn live_indices(&self) -> Result<Vec<ElementIndex>> {
        self.common.identifier.with_values(|identifiers| {
            identifiers
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, identifier)| identifier.is_valid())
                .map(|(slot, _)| ElementIndex(slot as u32))
                .collect()
        })
    }

    /// Iterates live indices in index order.
    pub fn indices(&self) -> Indices<'_, K> {
        Indices {
            store: self,
            next: 1,
        }
    }

    /// Iterates live records in index order. Each call starts over.
    pub fn iter(&self) -> impl Iterator<Item = Result<K::Record>> + '_ {
        self.indices().map(move |index| self.record(index))
    }

    /// Checks that the identifier index and the identifier column agree.
    pub fn validator(&self) -> Result<ValidationReport> {
        let mut report = ValidationReport::new(&self.name, K::TAG);
        let index = self.index.lock();
        let identifiers = self.common.identifier.snapshot()?;
        report.counts.slots = identifiers.len().saturating_sub(1) as u64;
        report.counts.indexed = index.len() as u64;

        for (slot, identifier) in identifiers.iter().enumerate().skip(1) {
            if !identifier.is_valid() {
                continue;
            }
            report.counts.live += 1;
            match index.get(*identifier) {
                Ok(mapped) if mapped.slot() == slot => {}
                Ok(mapped) => report.problem(format!(
                    "identifier {identifier} at slot {slot} is indexed at {mapped}"
                )),
                Err(_) => report.problem(format!(
                    "identifier {identifier} at slot {slot} has no index"
                )),
            }
        }
        for (identifier, mapped) in index.iter() {
            let stored = identifiers
                .get(mapped.slot())
                .copied()
                .unwrap_or(Identifier::NULL);
            if stored.normalized() != identifier {
                report.problem(format!(
                    "index maps {identifier} to {mapped} which holds {stored}"
                ));
            }
        }
        if report.counts.live == 0 {
            report.warning(format!("store '{}' is empty", self.name));
        }
        Ok(report)
    }

    /// Retargets the element stored under `old` to `new`.
    ///
    /// Needs exclusive access to an open store with no batcher running.
    pub fn overwrite_identifier(&mut self, old: Identifier, new: Identifier) -> Result<ElementIndex> {
        if self.is_committed() {
            return Err(RoadGraphError::Committed(self.name.clone()));
        }
        if self.batcher.get_mut().is_some() {
            return Err(RoadGraphError::Invalid("batcher running"));
        }
        let index = self.index.get_mut().get(old)?;
        self.index.get_mut().overwrite(index, old, new)?;
        self.common.identifier.set(index, new)?;
        self.dirty.store(true, Ordering::Release);
        debug!(store = %self.name, %old, %new, index = index.0, "store.overwrite_identifier");
        Ok(index)
    }

    /// Removes `identifier`, leaving a null marker in its slot.
    pub fn remove(&self, identifier: Identifier) -> Result<ElementIndex> {
        let mut index = self.index.lock();
        self.ensure_writable()?;
        let slot = index
            .remove(identifier)
            .ok_or(RoadGraphError::NoIndex(identifier))?;
        self.common.identifier.set(slot, Identifier::NULL)?;
        self.dirty.store(true, Ordering::Release);
        debug!(store = %self.name, %identifier, index = slot.0, "store.remove");
        Ok(slot)
    }

    /// Backs every column with `archive`.
    pub fn attach(&self, archive: Arc<Archive>) {
        for column in self.all_columns() {
            column.attach(Arc::clone(&archive));
        }
        *self.archive.write() = Some(archive);
    }

    /// Loads one column by field name.
    pub fn load_field(&self, field: &str) -> Result<()> {
        let column = self
            .all_columns()
            .into_iter()
            .find(|column| column.name() == field)
            .ok_or(RoadGraphError::Invalid("unknown field"))?;
        self.load_column(column)
    }

    fn load_column(&self, column: &dyn Column) -> Result<()> {
        if column.is_loaded() {
            return Ok(());
        }
        let from_archive = self
            .archive
            .read()
            .as_ref()
            .is_some_and(|archive| archive.contains(&self.name, column.name()));
        column.load()?;
        self.metrics.column_loaded(K::TAG, from_archive);
        Ok(())
    }

    /// Loads every column.
    pub fn load_all(&self) -> Result<()> {
        for column in self.all_columns() {
            self.load_column(column)?;
        }
        Ok(())
    }

    /// Names of the resident columns.
    pub fn loaded_fields(&self) -> Vec<&'static str> {
        self.all_columns()
            .into_iter()
            .filter(|column| column.is_loaded())
            .map(|column| column.name())
            .collect()
    }

    /// Drops every column from memory. Refuses while changes are unsaved.
    pub fn unload(&self) -> Result<()> {
        if self.dirty.load(Ordering::Acquire) {
            return Err(RoadGraphError::Invalid("store has unsaved changes"));
        }
        for column in self.all_columns() {
            column.unload();
        }
        debug!(store = %self.name, "store.unload");
        Ok(())
    }

    /// Persists metadata and every column into `archive`, then backs the
    /// store with it.
    pub fn save(&self, archive: &Arc<Archive>, version: ArchiveVersion) -> Result<()> {
        archive.save_fields_of(self, version)?;
        self.attach(Arc::clone(archive));
        self.dirty.store(false, Ordering::Release);
        info!(store = %self.name, %version, size = self.size(), "store.save");
        Ok(())
    }

    /// Persisted counters.
    pub fn metadata(&self) -> StoreMetadata {
        StoreMetadata {
            kind: K::TAG,
            size: self.size(),
            discarded: self.discarded(),
            committed: self.is_committed(),
        }
    }
}

impl<K: ElementKind> ArchiveOwner for ElementStore<K> {
    fn owner_name(&self) -> &str {
        &self.name
    }

    fn archived_fields(&self) -> Result<Vec<FieldPayload>> {
        let mut fields = vec![FieldPayload::json(STORE_METADATA_FIELD, &self.metadata())?];
        for column in self.all_columns() {
            fields.push(column.payload()?);
        }
        Ok(fields)
    }
}

/// Write access of one thread to a committed store; refreezes on drop.
struct Reopened<'a, K: ElementKind> {
    store: &'a ElementStore<K>,
}

impl<'a, K: ElementKind> Reopened<'a, K> {
    fn enter(store: &'a ElementStore<K>) -> Self {
        let _index = store.index.lock();
        for column in store.all_columns() {
            column.thaw();
        }
        *store.reopened_by.write() = Some(thread::current().id());
        Self { store }
    }
}

impl<K: ElementKind> Drop for Reopened<'_, K> {
    fn drop(&mut self) {
        let _index = self.store.index.lock();
        self.store.freeze_columns();
        *self.store.reopened_by.write() = None;
    }
}

/// Live indices of a store in index order.
pub struct Indices<'a, K: ElementKind> {
    store: &'a ElementStore<K>,
    next: u32,
}

impl<K: ElementKind> Iterator for Indices<'_, K> {
    type Item = ElementIndex;

    fn next(&mut self) -> Option<ElementIndex> {
        let column = &self.store.common.identifier;
        loop {
            let index = ElementIndex(self.next);
            let (within, identifier) = column
                .with_values(|values| {
                    (
                        index.slot() < values.len(),
                        values.get(index.slot()).copied().unwrap_or_default(),
                    )
                })
                .ok()?;
            if !within {
                return None;
            }
            self.next += 1;
            if identifier.is_valid() {
                return Some(index);
            }
        }
    }
}
