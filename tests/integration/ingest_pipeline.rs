#![allow(missing_docs)]

use std::sync::{Arc, Once};

use roadgraph::graph::Graph;
use roadgraph::ingest::source::tags;
use roadgraph::ingest::{
    GraphLoader, IngestStatistics, LoaderConfig, LoaderOptions, MemorySource, OsmElement, OsmWay,
    PolygonBorder, StreamMetadata, SyntheticIds, SYNTHETIC_BASE,
};
use roadgraph::storage::kinds::{Direction, Member, MemberKind, PlaceType, RoadType};
use roadgraph::storage::{ArchiveVersion, StoreOptions};
use roadgraph::types::{ElementIndex, Identifier, Location, Rectangle, Result, RoadGraphError};
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("roadgraph::ingest=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn street_nodes(source: MemorySource) -> MemorySource {
    (1..=5).fold(source, |source, id| {
        source.node(id, 50.0, 8.0 + (id - 1) as f64 * 0.001, Vec::new())
    })
}

fn town_bounds() -> Rectangle {
    Rectangle::from_corners(Location::degrees(49.9, 7.9), Location::degrees(50.1, 8.1))
}

/// Nodes 1-5 along one street, a side road through node 3, a road far
/// outside the bounds, a building, a town node and three relations.
fn town() -> MemorySource {
    street_nodes(MemorySource::new("town.osm.pbf"))
        .node(6, 50.001, 8.002, Vec::new())
        .node(7, 49.999, 8.002, Vec::new())
        .node(8, 10.0, 10.0, Vec::new())
        .node(9, 10.0, 10.001, Vec::new())
        .node(
            100,
            50.0005,
            8.0015,
            tags(&[("place", "town"), ("name", "Musterstadt"), ("population", "1.200")]),
        )
        .node(101, 50.0, 8.05, Vec::new())
        .way(10, &[1, 2, 3, 4, 5], tags(&[("highway", "residential"), ("name", "Hauptstraße")]))
        .way(20, &[6, 3, 7], tags(&[("highway", "service"), ("oneway", "yes")]))
        .way(30, &[8, 9], tags(&[("highway", "primary")]))
        .way(40, &[1, 2], tags(&[("building", "yes")]))
        .relation(
            500,
            vec![
                Member {
                    identifier: Identifier(10),
                    kind: MemberKind::Way,
                    role: String::new(),
                },
                Member {
                    identifier: Identifier(99),
                    kind: MemberKind::Way,
                    role: String::new(),
                },
                Member {
                    identifier: Identifier(100),
                    kind: MemberKind::Node,
                    role: "stop".to_string(),
                },
            ],
            tags(&[("type", "route"), ("route", "bus"), ("network", "VRN"), ("ref", "27")]),
        )
        .relation(
            501,
            Vec::new(),
            tags(&[("type", "boundary"), ("boundary", "administrative")]),
        )
        .relation(502, Vec::new(), tags(&[("type", "site")]))
}

fn load(options: LoaderOptions, source: &mut MemorySource) -> Result<(Graph, IngestStatistics)> {
    init_tracing();
    GraphLoader::new(options).load(source)
}

#[test]
fn five_node_way_becomes_one_unclipped_edge() -> Result<()> {
    let mut source = street_nodes(MemorySource::new("street"))
        .way(10, &[1, 2, 3, 4, 5], tags(&[("highway", "residential")]));
    let (graph, statistics) = load(LoaderOptions::new().name("street"), &mut source)?;

    assert_eq!(graph.edges().size(), 1);
    let edge = graph.edges().record_of(Identifier(10_000_001))?;
    assert_eq!(edge.from_node, Identifier(1));
    assert_eq!(edge.to_node, Identifier(5));
    assert_eq!(edge.polyline().len(), 5);
    assert!(!edge.from_clipped && !edge.to_clipped);
    assert_eq!(edge.road_type, RoadType::Residential);
    assert_eq!(edge.direction, Direction::TwoWay);
    assert!((280_000..292_000).contains(&edge.length_mm));

    assert_eq!(graph.vertices().size(), 2);
    assert_eq!(edge.from_vertex, graph.vertices().retrieve_index(Identifier(1))?);
    assert_eq!(edge.to_vertex, graph.vertices().retrieve_index(Identifier(5))?);
    assert_eq!(graph.counts()?.edges, 2);

    assert_eq!(statistics.nodes.accepted, 5);
    assert_eq!(statistics.ways.accepted, 1);
    assert_eq!(statistics.edges, 1);
    assert!(statistics.is_conserved());
    assert!(graph.metadata().built_at.is_some());
    assert!(graph.edges().is_committed() && graph.vertices().is_committed());
    Ok(())
}

#[test]
fn town_fixture_is_sectioned_filtered_and_conserved() -> Result<()> {
    let options = LoaderOptions::new().name("town").bounds(town_bounds());
    let (graph, statistics) = load(options, &mut town())?;

    let mut edges: Vec<Identifier> = graph
        .edges()
        .iter()
        .map(|edge| edge.map(|edge| edge.common.identifier))
        .collect::<Result<_>>()?;
    edges.sort();
    assert_eq!(
        edges,
        vec![
            Identifier(10_000_001),
            Identifier(10_000_002),
            Identifier(20_000_001),
            Identifier(20_000_002),
        ]
    );
    let first = graph.edges().record_of(Identifier(10_000_001))?;
    assert_eq!((first.from_node, first.to_node), (Identifier(1), Identifier(3)));
    assert_eq!(first.name.as_deref(), Some("Hauptstraße"));
    let side = graph.edges().record_of(Identifier(20_000_002))?;
    assert_eq!(side.direction, Direction::OneWay);
    assert_eq!(side.from_vertex, graph.vertices().retrieve_index(Identifier(3))?);

    let junction = graph.vertices().record_of(Identifier(3))?;
    assert_eq!(junction.index, ElementIndex(2));
    assert_eq!(graph.vertices().size(), 5);
    assert!(!graph.edges().contains(Identifier(30_000_001)));
    assert!(!graph.vertices().contains(Identifier(2)));

    assert_eq!(statistics.ways.seen, 4);
    assert_eq!(statistics.ways.accepted, 2);
    assert_eq!(statistics.ways.filtered_out, 2);
    assert_eq!(statistics.nodes.seen, 11);
    assert_eq!(statistics.nodes.filtered_out, 1);
    assert!(statistics.is_conserved());

    let place = graph.places().record_of(Identifier(100))?;
    assert_eq!(place.place_type, PlaceType::Town);
    assert_eq!(place.population, Some(1_200));
    assert_eq!(statistics.places, 1);
    assert_eq!(graph.metadata().source.as_deref(), Some("town.osm.pbf"));
    Ok(())
}

#[test]
fn relations_link_into_member_way_edges() -> Result<()> {
    let options = LoaderOptions::new().bounds(town_bounds());
    let (graph, statistics) = load(options, &mut town())?;

    assert_eq!(statistics.relations.seen, 3);
    assert_eq!(statistics.relations.accepted, 1);
    assert_eq!(statistics.relations.filtered_out, 2);
    assert_eq!(statistics.relation_links, 2);
    assert_eq!(statistics.dangling_members, 1);

    let route = graph.relations().record_of(Identifier(500))?;
    assert_eq!(route.route_name.as_deref(), Some("VRN 27"));
    assert_eq!(route.relation_type.as_deref(), Some("route"));
    assert_eq!(route.members.len(), 3);
    for identifier in [Identifier(10_000_001), Identifier(10_000_002)] {
        assert_eq!(graph.edges().record_of(identifier)?.relations, vec![Identifier(500)]);
    }
    assert!(graph.edges().record_of(Identifier(20_000_001))?.relations.is_empty());
    assert!(!graph.relations().contains(Identifier(501)));
    assert!(graph.edges().is_committed());
    Ok(())
}

#[test]
fn cut_border_creates_synthetic_clipped_vertices() -> Result<()> {
    let border = PolygonBorder::rectangle(Rectangle::from_corners(
        Location::degrees(49.95, 7.95),
        Location::degrees(50.05, 8.0025),
    ));
    let mut source = street_nodes(MemorySource::new("street"))
        .way(10, &[1, 2, 3, 4, 5], tags(&[("highway", "secondary")]));
    let options = LoaderOptions::new().cut_border(Arc::new(border));
    let (graph, statistics) = load(options, &mut source)?;

    assert_eq!(statistics.ways_cut, 1);
    assert_eq!(statistics.synthetic_nodes, 1);
    let inside = graph.edges().record_of(Identifier(10_000_001))?;
    let outside = graph.edges().record_of(Identifier(10_000_002))?;
    assert!(!inside.from_clipped && inside.to_clipped);
    assert!(outside.from_clipped && !outside.to_clipped);
    assert_eq!(inside.to_node, outside.from_node);
    assert_eq!(inside.to_node, Identifier(SYNTHETIC_BASE));
    assert_eq!(inside.to_location, Location::degrees(50.0, 8.0025));

    let synthetic = graph.vertices().record_of(Identifier(SYNTHETIC_BASE))?;
    assert!(synthetic.synthetic && synthetic.clipped);
    assert!(SyntheticIds::is_synthetic(synthetic.common.identifier));
    assert_eq!(graph.vertices().size(), 3);
    assert_eq!(inside.to_vertex, synthetic.index);
    assert_eq!(outside.from_vertex, synthetic.index);
    Ok(())
}

#[test]
fn ways_outside_the_bounds_are_filtered_out() -> Result<()> {
    let mut source = MemorySource::new("far")
        .node(8, 10.0, 10.0, Vec::new())
        .node(9, 10.0, 10.001, Vec::new())
        .way(30, &[8, 9], tags(&[("highway", "primary")]));
    let (graph, statistics) = load(LoaderOptions::new().bounds(town_bounds()), &mut source)?;
    assert_eq!(graph.edges().size(), 0);
    assert_eq!(statistics.ways.filtered_out, 1);
    assert_eq!(statistics.ways.accepted, 0);
    assert!(statistics.is_conserved());
    Ok(())
}

#[test]
fn streams_without_a_header_fail() {
    let mut source = town().with_metadata(None);
    let outcome = load(LoaderOptions::new(), &mut source);
    assert!(matches!(outcome, Err(RoadGraphError::MissingMetadata)));
}

#[test]
fn nodes_after_ways_are_rejected() {
    let mut source = street_nodes(MemorySource::new("shuffled"))
        .way(10, &[1, 2, 3], tags(&[("highway", "residential")]))
        .node(11, 50.0, 8.01, Vec::new());
    let outcome = load(LoaderOptions::new(), &mut source);
    assert!(matches!(outcome, Err(RoadGraphError::Input(_))));
}

#[test]
fn embedded_way_locations_need_no_nodes() -> Result<()> {
    let metadata = StreamMetadata {
        optional_features: vec!["LocationsOnWays".to_string()],
        ..StreamMetadata::default()
    };
    let mut source = MemorySource::new("inline")
        .with_metadata(Some(metadata))
        .push(OsmElement::Way(OsmWay {
            id: 70,
            refs: vec![1, 2, 3],
            locations: vec![
                Location::degrees(48.0, 11.0),
                Location::degrees(48.001, 11.0),
                Location::degrees(48.002, 11.0),
            ],
            tags: tags(&[("highway", "tertiary")]),
            info: Default::default(),
        }));
    let (graph, statistics) = load(LoaderOptions::new(), &mut source)?;
    assert_eq!(statistics.node_locations, 0);
    assert_eq!(graph.edges().record_of(Identifier(70_000_001))?.polyline().len(), 3);
    Ok(())
}

#[test]
fn configured_loads_survive_a_save_and_reopen() -> Result<()> {
    let config = LoaderConfig::from_toml_str(
        r#"
name = "configured"
section_at_intersections = false

[bounds]
south = 49.9
west = 7.9
north = 50.1
east = 8.1

[[regions]]
code = "DE"
ring = [[47.0, 5.0], [47.0, 15.0], [55.0, 15.0], [55.0, 5.0]]
"#,
    )?;
    let (graph, statistics) = load(config.into_options()?, &mut town())?;
    assert_eq!(graph.edges().size(), 2);
    assert_eq!(
        graph.edges().record_of(Identifier(10_000_001))?.country.as_deref(),
        Some("DE")
    );

    let dir = tempdir()?;
    let path = dir.path().join("configured.rga");
    graph.save(&path, ArchiveVersion(1))?;
    let reopened = Graph::open(&path, StoreOptions::new())?;
    assert_eq!(reopened.metadata().name, "configured");
    assert_eq!(reopened.counts()?, graph.counts()?);
    assert_eq!(reopened.edges().size(), statistics.edges);
    assert_eq!(
        reopened.edges().record_of(Identifier(10_000_001))?,
        graph.edges().record_of(Identifier(10_000_001))?
    );
    Ok(())
}
