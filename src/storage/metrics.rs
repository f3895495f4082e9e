use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::ElementKindTag;

/// Trait for tracking element store operations.
///
/// Implementations collect statistics about accepted and discarded elements,
/// column residency and commits. The store calls these hooks on its hot path,
/// so implementations must be cheap.
pub trait StoreMetrics: Send + Sync {
    /// Records an element accepted by `add`.
    fn element_added(&self, kind: ElementKindTag);

    /// Records an element that failed structural validation.
    fn element_discarded(&self, kind: ElementKindTag);

    /// Records an `add` attempted after the store was committed.
    fn add_after_commit(&self, kind: ElementKindTag);

    /// Records a column load.
    ///
    /// # Parameters
    /// * `from_archive` - Whether values were read from the archive (`true`)
    ///   or freshly allocated (`false`).
    fn column_loaded(&self, kind: ElementKindTag, from_archive: bool);

    /// Records a store commit.
    fn store_committed(&self, kind: ElementKindTag);
}

/// A no-op implementation of [`StoreMetrics`] that discards all recorded metrics.
#[derive(Default)]
pub struct NoopMetrics;

impl StoreMetrics for NoopMetrics {
    fn element_added(&self, _kind: ElementKindTag) {}
    fn element_discarded(&self, _kind: ElementKindTag) {}
    fn add_after_commit(&self, _kind: ElementKindTag) {}
    fn column_loaded(&self, _kind: ElementKindTag, _from_archive: bool) {}
    fn store_committed(&self, _kind: ElementKindTag) {}
}

/// Per-kind atomic counters.
#[derive(Default)]
pub struct KindCounters {
    /// Elements accepted.
    pub added: AtomicU64,
    /// Elements discarded by validation.
    pub discarded: AtomicU64,
    /// Adds refused because the store was committed.
    pub after_commit: AtomicU64,
    /// Commits.
    pub commits: AtomicU64,
}

impl KindCounters {
    /// Elements accepted so far.
    pub fn added(&self) -> u64 {
        self.added.load(Ordering::Relaxed)
    }

    /// Elements discarded so far.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// A thread-safe counter-based implementation of [`StoreMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Vertex store counters.
    pub vertices: KindCounters,
    /// Edge store counters.
    pub edges: KindCounters,
    /// Relation store counters.
    pub relations: KindCounters,
    /// Place store counters.
    pub places: KindCounters,
    /// Column loads served from the archive.
    pub column_loads_archived: AtomicU64,
    /// Column loads that allocated an empty column.
    pub column_loads_allocated: AtomicU64,
}

impl CounterMetrics {
    /// Counters for one kind.
    pub fn kind(&self, kind: ElementKindTag) -> &KindCounters {
        match kind {
            ElementKindTag::Vertex => &self.vertices,
            ElementKindTag::Edge => &self.edges,
            ElementKindTag::Relation => &self.relations,
            ElementKindTag::Place => &self.places,
        }
    }
}

impl StoreMetrics for CounterMetrics {
    fn element_added(&self, kind: ElementKindTag) {
        self.kind(kind).added.fetch_add(1, Ordering::Relaxed);
    }

    fn element_discarded(&self, kind: ElementKindTag) {
        self.kind(kind).discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn add_after_commit(&self, kind: ElementKindTag) {
        self.kind(kind).after_commit.fetch_add(1, Ordering::Relaxed);
    }

    fn column_loaded(&self, _kind: ElementKindTag, from_archive: bool) {
        if from_archive {
            self.column_loads_archived.fetch_add(1, Ordering::Relaxed);
        } else {
            self.column_loads_allocated.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn store_committed(&self, kind: ElementKindTag) {
        self.kind(kind).commits.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn StoreMetrics> {
    Arc::new(NoopMetrics)
}
