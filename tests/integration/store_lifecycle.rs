#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;

use roadgraph::storage::kinds::{Direction, Edge, EdgeSpec, Place, PlaceSpec, PlaceType, Vertex, VertexSpec};
use roadgraph::storage::{CommonAttributes, CounterMetrics, ElementStore, GraphContext, Severity, StoreOptions};
use roadgraph::types::{ElementIndex, ElementKindTag, Identifier, Location, Result, RoadGraphError};

fn vertex(id: i64, latitude: f64, longitude: f64) -> VertexSpec {
    VertexSpec::new(CommonAttributes::new(id), Location::degrees(latitude, longitude))
}

fn edge(id: i64, direction: Direction) -> EdgeSpec {
    let mut spec = EdgeSpec::new(
        CommonAttributes::new(id),
        (Identifier(1), Location::degrees(47.0, 8.0)),
        (Identifier(2), Location::degrees(47.001, 8.002)),
    )
    .with_polyline(vec![
        Location::degrees(47.0, 8.0),
        Location::degrees(47.0005, 8.001),
        Location::degrees(47.001, 8.002),
    ]);
    spec.direction = direction;
    spec
}

#[test]
fn add_commit_and_refuse_late_adds() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let options = StoreOptions::new().metrics(metrics.clone());
    let store = ElementStore::<Vertex>::new("vertex-store", GraphContext::new(), options);

    assert!(store.add(vertex(10, 47.0, 8.0)));
    assert!(store.add(vertex(11, 47.1, 8.1)));
    assert!(!store.add(vertex(10, 47.2, 8.2)), "duplicate identifier");
    assert!(!store.add(vertex(-12, 47.3, 8.3)), "negative vertex identifier");
    assert_eq!(store.size(), 2);
    assert_eq!(store.discarded(), 2);

    store.commit()?;
    store.commit()?;
    assert!(store.is_committed());
    assert!(!store.add(vertex(13, 47.4, 8.4)));
    assert_eq!(store.size(), 2);

    let counters = metrics.kind(ElementKindTag::Vertex);
    assert_eq!(counters.added(), 2);
    assert_eq!(counters.discarded(), 2);
    assert_eq!(counters.after_commit.load(Ordering::Relaxed), 1);
    assert_eq!(counters.commits.load(Ordering::Relaxed), 1);

    let first = store.record_of(Identifier(10))?;
    assert_eq!(first.index, ElementIndex(1));
    assert_eq!(first.location, Location::degrees(47.0, 8.0));
    Ok(())
}

#[test]
fn removed_slots_stay_allocated() -> Result<()> {
    let store = ElementStore::<Vertex>::new("vertex-store", GraphContext::new(), StoreOptions::new());
    for id in 1..=4 {
        assert!(store.add(vertex(id, 10.0, f64::from(id as i32) * 0.01)));
    }
    assert_eq!(store.remove(Identifier(2))?, ElementIndex(2));
    assert!(matches!(
        store.remove(Identifier(2)),
        Err(RoadGraphError::NoIndex(Identifier(2)))
    ));
    assert!(!store.contains(Identifier(2)));

    assert!(store.add(vertex(5, 10.0, 0.05)));
    assert_eq!(store.retrieve_index(Identifier(5))?, ElementIndex(5));
    assert_eq!(store.count()?, 4);
    assert_eq!(store.size(), 5);

    let live: Vec<ElementIndex> = store.indices().collect();
    assert_eq!(
        live,
        vec![ElementIndex(1), ElementIndex(3), ElementIndex(4), ElementIndex(5)]
    );
    assert!(store.record(ElementIndex(2)).is_err());
    assert!(store.validator()?.is_consistent());
    Ok(())
}

#[test]
fn overwrite_identifier_retargets_a_slot() -> Result<()> {
    let mut store = ElementStore::<Place>::new("place-store", GraphContext::new(), StoreOptions::new());
    let spec = PlaceSpec {
        common: CommonAttributes::new(300),
        location: Location::degrees(46.5, 6.6),
        place_type: PlaceType::Town,
        population: Some(12_000),
        name: Some("Morges".to_string()),
    };
    assert!(store.add(spec));
    let store = Arc::get_mut(&mut store).ok_or(RoadGraphError::Invalid("store is shared"))?;

    assert_eq!(store.overwrite_identifier(Identifier(300), Identifier(301))?, ElementIndex(1));
    assert!(!store.contains(Identifier(300)));
    let record = store.record_of(Identifier(301))?;
    assert_eq!(record.common.identifier, Identifier(301));
    assert_eq!(record.name.as_deref(), Some("Morges"));

    store.commit()?;
    assert!(matches!(
        store.overwrite_identifier(Identifier(301), Identifier(302)),
        Err(RoadGraphError::Committed(_))
    ));
    Ok(())
}

#[test]
fn reverse_edges_are_implied_by_two_way_edges() -> Result<()> {
    let store = ElementStore::<Edge>::new("edge-store", GraphContext::new(), StoreOptions::new());
    assert!(store.add(edge(5_000_001, Direction::TwoWay)));
    assert!(store.add(edge(6_000_001, Direction::OneWay)));
    assert!(!store.add(edge(-7_000_001, Direction::TwoWay)));
    store.commit()?;

    assert_eq!(store.count()?, 3);
    assert_eq!(
        store.retrieve_index(Identifier(-5_000_001))?,
        store.retrieve_index(Identifier(5_000_001))?
    );

    let forward = store.directed_edge(Identifier(5_000_001))?;
    let reverse = store.directed_edge(Identifier(-5_000_001))?;
    assert_eq!(reverse.common.identifier, Identifier(-5_000_001));
    assert_eq!(reverse.from_node, forward.to_node);
    assert_eq!(reverse.from_location, forward.to_location);
    let mut points = forward.polyline();
    points.reverse();
    assert_eq!(reverse.polyline(), points);
    assert_eq!(reverse.length_mm, forward.length_mm);

    assert!(store.directed_edge(Identifier(-6_000_001)).is_err());
    Ok(())
}

#[test]
fn post_commit_reopens_and_refreezes() -> Result<()> {
    let store = ElementStore::<Edge>::new("edge-store", GraphContext::new(), StoreOptions::new());
    assert!(store.add(edge(9_000_001, Direction::TwoWay)));
    store.commit()?;
    let index = store.retrieve_index(Identifier(9_000_001))?;

    store.post_commit(|edges| edges.link_relation(index, Identifier(77)))?;
    assert!(store.is_committed());

    let failed: Result<()> = store.post_commit(|_| Err(RoadGraphError::Invalid("abandoned")));
    assert!(failed.is_err());
    assert!(store.is_committed());
    assert!(!store.add(edge(9_000_002, Direction::TwoWay)));

    assert_eq!(store.record(index)?.relations, vec![Identifier(77)]);
    Ok(())
}

#[test]
fn post_commit_writes_only_from_the_reopening_thread() -> Result<()> {
    let store = ElementStore::<Vertex>::new("vertex-store", GraphContext::new(), StoreOptions::new());
    assert!(store.add(vertex(1, 47.0, 8.0)));
    store.commit()?;

    let reopened = Arc::new(Barrier::new(2));
    let attempted = Arc::new(Barrier::new(2));
    let outsider = {
        let store = Arc::clone(&store);
        let reopened = Arc::clone(&reopened);
        let attempted = Arc::clone(&attempted);
        thread::spawn(move || {
            reopened.wait();
            let added = store.add(vertex(99, 47.5, 8.5));
            let removed = store.remove(Identifier(1)).is_ok();
            attempted.wait();
            (added, removed)
        })
    };

    let added = store.post_commit(|vertices| {
        reopened.wait();
        attempted.wait();
        Ok(vertices.add(vertex(2, 47.1, 8.1)))
    })?;
    let (outsider_added, outsider_removed) = outsider
        .join()
        .map_err(|_| RoadGraphError::Invalid("outsider panicked"))?;

    assert!(added);
    assert!(!outsider_added, "another thread added to a committed store");
    assert!(!outsider_removed, "another thread removed from a committed store");
    assert_eq!(store.size(), 2);
    assert!(!store.contains(Identifier(99)));
    assert!(store.contains(Identifier(1)));
    assert!(store.is_committed());
    assert!(!store.add(vertex(3, 47.2, 8.2)));
    Ok(())
}

#[test]
fn edge_links_are_refused_outside_the_reopening_thread() -> Result<()> {
    let store = ElementStore::<Edge>::new("edge-store", GraphContext::new(), StoreOptions::new());
    assert!(store.add(edge(9_000_001, Direction::TwoWay)));
    store.commit()?;
    let index = store.retrieve_index(Identifier(9_000_001))?;
    assert!(matches!(
        store.link_relation(index, Identifier(5)),
        Err(RoadGraphError::Committed(_))
    ));

    let reopened = Arc::new(Barrier::new(2));
    let attempted = Arc::new(Barrier::new(2));
    let outsider = {
        let store = Arc::clone(&store);
        let reopened = Arc::clone(&reopened);
        let attempted = Arc::clone(&attempted);
        thread::spawn(move || {
            reopened.wait();
            let linked = store.link_relation(index, Identifier(6)).is_ok();
            attempted.wait();
            linked
        })
    };
    store.post_commit(|edges| {
        reopened.wait();
        attempted.wait();
        edges.link_relation(index, Identifier(7))
    })?;
    let outsider_linked = outsider
        .join()
        .map_err(|_| RoadGraphError::Invalid("outsider panicked"))?;

    assert!(!outsider_linked);
    assert_eq!(store.record(index)?.relations, vec![Identifier(7)]);
    Ok(())
}

#[test]
fn empty_store_validates_with_a_warning() -> Result<()> {
    let store = ElementStore::<Vertex>::new("vertex-store", GraphContext::new(), StoreOptions::new());
    let report = store.validator()?;
    assert!(report.is_consistent());
    assert_eq!(report.with_severity(Severity::Warning).count(), 1);
    Ok(())
}
