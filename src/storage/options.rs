use std::sync::Arc;

use super::metrics::StoreMetrics;

/// Configuration options supplied when creating an [`super::ElementStore`].
#[derive(Clone)]
pub struct StoreOptions {
    /// Expected number of elements; sizes columns on allocation.
    pub estimate: usize,
    /// Whether `adder()` hands out queued batch adders instead of direct ones.
    pub batching: bool,
    /// Capacity of the bounded batch queue.
    pub queue_capacity: usize,
    /// Optional metrics override; the graph context's metrics otherwise.
    pub metrics: Option<Arc<dyn StoreMetrics>>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            estimate: 1024,
            batching: false,
            queue_capacity: 4096,
            metrics: None,
        }
    }
}

impl StoreOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the element count estimate.
    pub fn estimate(mut self, estimate: usize) -> Self {
        self.estimate = estimate;
        self
    }

    /// Enables or disables batched adds.
    pub fn batching(mut self, enabled: bool) -> Self {
        self.batching = enabled;
        self
    }

    /// Sets the batch queue capacity (clamped to at least 1).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}
