#![forbid(unsafe_code)]

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::element::ElementKind;
use super::metrics::{default_metrics, StoreMetrics};
use super::store::ElementStore;
use super::tags::TagCodec;
use crate::types::ElementKindTag;

type StoreSlot = Weak<dyn Any + Send + Sync>;

/// Shared services of one graph: the tag dictionary, metrics and the
/// registry of element stores by kind.
///
/// Built once per graph and handed to every store as `Arc<GraphContext>`.
pub struct GraphContext {
    tags: TagCodec,
    metrics: Arc<dyn StoreMetrics>,
    registry: RwLock<BTreeMap<ElementKindTag, StoreSlot>>,
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::with_parts(TagCodec::new(), default_metrics())
    }
}

impl GraphContext {
    /// Creates a context with an empty tag dictionary and no-op metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a context from an existing dictionary and metrics sink.
    pub fn with_parts(tags: TagCodec, metrics: Arc<dyn StoreMetrics>) -> Self {
        Self {
            tags,
            metrics,
            registry: RwLock::new(BTreeMap::new()),
        }
    }

    /// The shared tag dictionary.
    pub fn tags(&self) -> &TagCodec {
        &self.tags
    }

    /// The metrics sink stores report to.
    pub fn metrics(&self) -> &Arc<dyn StoreMetrics> {
        &self.metrics
    }

    /// Registers `store` as the store of its kind, replacing any earlier one.
    pub fn register<K: ElementKind>(&self, store: &Arc<ElementStore<K>>) {
        let erased: Arc<dyn Any + Send + Sync> = store.clone();
        self.registry.write().insert(K::TAG, Arc::downgrade(&erased));
    }

    /// Returns the live store registered for `K`.
    pub fn store<K: ElementKind>(&self) -> Option<Arc<ElementStore<K>>> {
        let erased = self.registry.read().get(&K::TAG)?.upgrade()?;
        erased.downcast::<ElementStore<K>>().ok()
    }

    /// Kinds with a live registered store.
    pub fn registered(&self) -> Vec<ElementKindTag> {
        self.registry
            .read()
            .iter()
            .filter(|(_, slot)| slot.strong_count() > 0)
            .map(|(kind, _)| *kind)
            .collect()
    }
}
