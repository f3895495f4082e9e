#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use roadgraph::graph::{Graph, EDGE_STORE, GRAPH_OWNER, PLACE_STORE};
use roadgraph::storage::kinds::{Direction, EdgeSpec, Member, MemberKind, PlaceSpec, PlaceType, RelationSpec, VertexSpec};
use roadgraph::storage::{Archive, ArchiveVersion, CommonAttributes, CounterMetrics, StoreOptions};
use roadgraph::types::{ElementIndex, Identifier, Location, Result, RoadGraphError};
use tempfile::tempdir;

fn sample_graph(options: StoreOptions) -> Result<Graph> {
    let graph = Graph::new("sample", options);
    graph.set_source("sample.osm.pbf");

    let a = Location::degrees(45.50, 9.10);
    let b = Location::degrees(45.51, 9.12);
    let c = Location::degrees(45.52, 9.13);
    for (id, location) in [(1, a), (2, b), (3, c)] {
        assert!(graph.vertices().add(VertexSpec::new(CommonAttributes::new(id), location)));
    }

    let mut first = EdgeSpec::new(
        CommonAttributes::new(40_000_001)
            .with_tags(vec![("highway".into(), "primary".into()), ("name".into(), "Via Roma".into())]),
        (Identifier(1), a),
        (Identifier(2), b),
    );
    first.name = Some("Via Roma".to_string());
    first.speed_limit = Some(50);
    first.traffic_identifiers = vec!["+25431".to_string()];
    assert!(graph.edges().add(first));

    let mut second = EdgeSpec::new(
        CommonAttributes::new(40_000_002),
        (Identifier(2), b),
        (Identifier(3), c),
    )
    .with_polyline(vec![b, Location::degrees(45.515, 9.125), c]);
    second.direction = Direction::OneWay;
    assert!(graph.edges().add(second));

    assert!(graph.relations().add(RelationSpec {
        common: CommonAttributes::new(900).with_tags(vec![("type".into(), "route".into())]),
        relation_type: Some("route".to_string()),
        members: vec![Member {
            identifier: Identifier(40),
            kind: MemberKind::Way,
            role: "forward".to_string(),
        }],
        route_name: Some("SS 36".to_string()),
    }));

    assert!(graph.places().add(PlaceSpec {
        common: CommonAttributes::new(77).with_tags(vec![("place".into(), "city".into())]),
        location: a,
        place_type: PlaceType::City,
        population: Some(1_350_000),
        name: Some("Milano".to_string()),
    }));
    graph.commit()?;
    graph.mark_built()?;
    Ok(graph)
}

#[test]
fn saved_graph_reopens_with_every_attribute() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.rga");
    let graph = sample_graph(StoreOptions::new())?;
    let archive = graph.save(&path, ArchiveVersion(3))?;
    assert_eq!(archive.version(), ArchiveVersion(3));
    assert!(archive.contains(GRAPH_OWNER, "graph_metadata"));

    let reopened = Graph::open(&path, StoreOptions::new())?;
    let metadata = reopened.metadata();
    assert_eq!(metadata.name, "sample");
    assert_eq!(metadata.source.as_deref(), Some("sample.osm.pbf"));
    assert!(metadata.built_at.is_some());
    assert_eq!(metadata.counts, graph.counts()?);
    assert_eq!(reopened.counts()?, graph.counts()?);

    for identifier in [Identifier(40_000_001), Identifier(40_000_002)] {
        assert_eq!(reopened.edges().record_of(identifier)?, graph.edges().record_of(identifier)?);
    }
    let edge = reopened.edges().record_of(Identifier(40_000_001))?;
    assert_eq!(edge.common.tag("name"), Some("Via Roma"));
    assert_eq!(edge.traffic_identifiers, vec!["+25431".to_string()]);
    assert_eq!(edge.speed_limit, Some(50));

    let relation = reopened.relations().record_of(Identifier(900))?;
    assert_eq!(relation.route_name.as_deref(), Some("SS 36"));
    assert_eq!(relation.members[0].role, "forward");

    let place = reopened.places().record_of(Identifier(77))?;
    assert_eq!(place.population, Some(1_350_000));
    assert!(reopened.edges().is_committed());
    Ok(())
}

#[test]
fn columns_load_lazily_after_open() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("lazy.rga");
    sample_graph(StoreOptions::new())?.save(&path, ArchiveVersion(1))?;

    let metrics = Arc::new(CounterMetrics::default());
    let reopened = Graph::open(&path, StoreOptions::new().metrics(metrics.clone()))?;
    let before = reopened.places().loaded_fields();
    assert!(!before.contains(&"population"));

    reopened.places().load_field("population")?;
    assert!(reopened.places().loaded_fields().contains(&"population"));
    assert!(reopened.places().load_field("no_such_field").is_err());

    reopened.load_all()?;
    reopened.unload()?;
    assert!(reopened.places().loaded_fields().is_empty());
    assert_eq!(reopened.places().record_of(Identifier(77))?.name.as_deref(), Some("Milano"));
    assert!(metrics.column_loads_archived.load(std::sync::atomic::Ordering::Relaxed) > 0);
    Ok(())
}

#[test]
fn saving_one_owner_keeps_the_others() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("owners.rga");
    let graph = sample_graph(StoreOptions::new())?;
    graph.save(&path, ArchiveVersion(1))?;

    let archive = Archive::open(&path)?;
    let edge_fields = archive.fields_of(EDGE_STORE);
    assert!(!edge_fields.is_empty());
    graph.places().save(&Arc::new(Archive::open(&path)?), ArchiveVersion(2))?;

    let archive = Archive::open(&path)?;
    assert_eq!(archive.version(), ArchiveVersion(2));
    assert_eq!(archive.fields_of(EDGE_STORE), edge_fields);
    assert!(archive.owners().iter().any(|owner| owner == PLACE_STORE));
    let reopened = Graph::open(&path, StoreOptions::new())?;
    assert_eq!(
        reopened.edges().retrieve_index(Identifier(-40_000_001))?,
        ElementIndex(1)
    );
    Ok(())
}

#[test]
fn damaged_payloads_are_reported_on_load() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("damaged.rga");
    sample_graph(StoreOptions::new())?.save(&path, ArchiveVersion(1))?;
    let reopened = Graph::open(&path, StoreOptions::new())?;
    drop(reopened);

    // Header is 16 bytes; flip a byte inside the first payload.
    let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
    file.seek(SeekFrom::Start(20))?;
    file.write_all(&[0xA5, 0x5A, 0xA5, 0x5A])?;
    file.sync_all()?;

    let outcome = Graph::open(&path, StoreOptions::new()).and_then(|graph| graph.load_all());
    assert!(matches!(outcome, Err(RoadGraphError::Corruption(_))));
    Ok(())
}

#[test]
fn truncated_archive_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("short.rga");
    sample_graph(StoreOptions::new())?.save(&path, ArchiveVersion(1))?;
    let bytes = fs::read(&path)?;
    fs::write(&path, &bytes[..bytes.len() / 2])?;
    assert!(matches!(Archive::open(&path), Err(RoadGraphError::Corruption(_))));
    Ok(())
}
