#![forbid(unsafe_code)]

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Weak};
use std::thread;

use tracing::{debug, warn};

use super::element::ElementKind;
use super::store::ElementStore;
use crate::types::{Result, RoadGraphError};

/// Producer handle returned by [`ElementStore::adder`].
pub enum Adder<K: ElementKind> {
    /// Adds synchronously on the calling thread.
    Direct(Arc<ElementStore<K>>),
    /// Queues specs for the store's drainer thread.
    Batched(BatchAdder<K>),
}

impl<K: ElementKind> Adder<K> {
    /// Adds (or queues) one spec. Outcomes are visible through the store's
    /// `size` and `discarded` counters.
    pub fn add(&self, spec: K::Spec) -> Result<()> {
        match self {
            Adder::Direct(store) => {
                store.add(spec);
                Ok(())
            }
            Adder::Batched(batch) => batch.add(spec),
        }
    }

    /// Returns true for queued adders.
    pub fn is_batched(&self) -> bool {
        matches!(self, Adder::Batched(_))
    }
}

impl<K: ElementKind> Clone for Adder<K> {
    fn clone(&self) -> Self {
        match self {
            Adder::Direct(store) => Adder::Direct(Arc::clone(store)),
            Adder::Batched(batch) => Adder::Batched(batch.clone()),
        }
    }
}

/// Per-producer handle over the store's bounded queue.
///
/// `send` blocks while the queue is full. Every handle must be dropped before
/// [`ElementStore::commit`], which waits for the queue to drain.
pub struct BatchAdder<K: ElementKind> {
    store: String,
    sender: SyncSender<K::Spec>,
}

impl<K: ElementKind> fmt::Debug for BatchAdder<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAdder")
            .field("store", &self.store)
            .finish()
    }
}

impl<K: ElementKind> Clone for BatchAdder<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<K: ElementKind> BatchAdder<K> {
    /// Queues one spec, blocking while the queue is full.
    pub fn add(&self, spec: K::Spec) -> Result<()> {
        self.sender
            .send(spec)
            .map_err(|_| RoadGraphError::Committed(self.store.clone()))
    }
}

/// The store side of batching: the prototype sender and the drainer thread.
pub(crate) struct Batcher<K: ElementKind> {
    store: String,
    sender: Option<SyncSender<K::Spec>>,
    drainer: Option<thread::JoinHandle<u64>>,
}

impl<K: ElementKind> Batcher<K> {
    pub(crate) fn spawn(store: Weak<ElementStore<K>>, name: &str, capacity: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let drainer = thread::Builder::new()
            .name(format!("roadgraph-{name}-drainer"))
            .spawn(move || drain(store, receiver))?;
        debug!(store = name, capacity, "batch.spawn");
        Ok(Self {
            store: name.to_string(),
            sender: Some(sender),
            drainer: Some(drainer),
        })
    }

    pub(crate) fn handle(&self) -> Option<BatchAdder<K>> {
        self.sender.as_ref().map(|sender| BatchAdder {
            store: self.store.clone(),
            sender: sender.clone(),
        })
    }

    /// Closes the queue and waits for the drainer. Blocks until every
    /// outstanding [`BatchAdder`] has been dropped.
    pub(crate) fn finish(mut self) -> Result<u64> {
        self.sender.take();
        let Some(drainer) = self.drainer.take() else {
            return Ok(0);
        };
        let drained = drainer
            .join()
            .map_err(|_| RoadGraphError::Invalid("batch drainer panicked"))?;
        debug!(store = %self.store, drained, "batch.finish");
        Ok(drained)
    }
}

fn drain<K: ElementKind>(store: Weak<ElementStore<K>>, receiver: Receiver<K::Spec>) -> u64 {
    let mut drained = 0u64;
    for spec in receiver {
        let Some(store) = store.upgrade() else {
            warn!(kind = %K::TAG, "batch.store_dropped");
            break;
        };
        store.add(spec);
        drained += 1;
    }
    drained
}
