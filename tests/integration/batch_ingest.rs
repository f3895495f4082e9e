#![allow(missing_docs)]

use std::sync::{Arc, Barrier};
use std::thread;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use roadgraph::storage::kinds::{Vertex, VertexSpec};
use roadgraph::storage::{CommonAttributes, ElementStore, GraphContext, StoreOptions};
use roadgraph::types::{Identifier, Location, Result, RoadGraphError};

const PRODUCERS: usize = 6;
const PER_PRODUCER: usize = 2_000;
const SEED: u64 = 0x0a11_d0e5;

fn batched_store(capacity: usize) -> Arc<ElementStore<Vertex>> {
    let options = StoreOptions::new()
        .batching(true)
        .queue_capacity(capacity)
        .estimate(PRODUCERS * PER_PRODUCER);
    ElementStore::new("vertex-store", GraphContext::new(), options)
}

fn vertex(id: i64, rng: &mut ChaCha8Rng) -> VertexSpec {
    let location = Location::degrees(rng.gen_range(-60.0..60.0), rng.gen_range(-170.0..170.0));
    VertexSpec::new(CommonAttributes::new(id), location)
}

#[test]
fn producers_share_one_queue() -> Result<()> {
    let store = batched_store(64);
    let barrier = Arc::new(Barrier::new(PRODUCERS));
    let mut handles = Vec::with_capacity(PRODUCERS);

    for producer in 0..PRODUCERS {
        let adder = store.adder()?;
        assert!(adder.is_batched());
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<()> {
            let mut rng = ChaCha8Rng::seed_from_u64(SEED + producer as u64);
            barrier.wait();
            for n in 0..PER_PRODUCER {
                let id = (producer * PER_PRODUCER + n + 1) as i64;
                adder.add(vertex(id, &mut rng))?;
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle
            .join()
            .map_err(|_| RoadGraphError::Invalid("producer panicked"))??;
    }

    store.commit()?;
    assert_eq!(store.size(), (PRODUCERS * PER_PRODUCER) as u64);
    assert_eq!(store.discarded(), 0);
    for id in [1, PER_PRODUCER as i64, (PRODUCERS * PER_PRODUCER) as i64] {
        assert!(store.contains(Identifier(id)));
    }
    assert!(store.validator()?.is_consistent());
    Ok(())
}

#[test]
fn invalid_specs_are_discarded_by_the_drainer() -> Result<()> {
    let store = batched_store(8);
    let adder = store.adder()?;
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    for id in 1..=50 {
        adder.add(vertex(id, &mut rng))?;
    }
    adder.add(vertex(25, &mut rng))?;
    adder.add(VertexSpec::new(CommonAttributes::new(51), Location::dm7(i32::MAX, 0)))?;
    drop(adder);

    store.commit()?;
    assert_eq!(store.size(), 50);
    assert_eq!(store.discarded(), 2);
    Ok(())
}

#[test]
fn adders_are_refused_after_commit() -> Result<()> {
    let store = batched_store(4);
    let adder = store.adder()?;
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    adder.add(vertex(1, &mut rng))?;
    drop(adder);
    store.commit()?;

    assert!(matches!(store.adder(), Err(RoadGraphError::Committed(_))));
    assert_eq!(store.record_of(Identifier(1))?.common.identifier, Identifier(1));
    Ok(())
}

#[test]
fn unbatched_stores_hand_out_direct_adders() -> Result<()> {
    let store = ElementStore::<Vertex>::new("vertex-store", GraphContext::new(), StoreOptions::new());
    let adder = store.adder()?;
    assert!(!adder.is_batched());
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    adder.add(vertex(3, &mut rng))?;
    assert!(store.contains(Identifier(3)));
    Ok(())
}
