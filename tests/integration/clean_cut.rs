#![allow(missing_docs)]

use std::sync::Arc;

use proptest::prelude::*;
use roadgraph::ingest::{clean_cut, Border, Containment, PolygonBorder, RegionClassifier, SyntheticIds, WayNode};
use roadgraph::types::{Identifier, Location, Rectangle, Result};

fn square(south: f64, west: f64, north: f64, east: f64) -> PolygonBorder {
    PolygonBorder::rectangle(Rectangle::from_corners(
        Location::degrees(south, west),
        Location::degrees(north, east),
    ))
}

fn way(points: &[(f64, f64)]) -> Vec<WayNode> {
    points
        .iter()
        .enumerate()
        .map(|(n, (lat, lon))| WayNode::new(100 + n as i64, Location::degrees(*lat, *lon)))
        .collect()
}

fn real_nodes(chunks: &[roadgraph::ingest::Chunk]) -> Vec<Identifier> {
    let mut identifiers: Vec<Identifier> = chunks
        .iter()
        .flat_map(|chunk| chunk.nodes.iter())
        .filter(|node| !node.synthetic)
        .map(|node| node.identifier)
        .collect();
    identifiers.dedup();
    identifiers
}

#[test]
fn a_way_through_the_region_is_cut_twice() {
    let border = square(0.0, 0.0, 2.0, 2.0);
    let ids = SyntheticIds::new();
    let nodes = way(&[(1.0, -1.0), (1.0, -0.5), (1.0, 1.0), (1.0, 2.5), (1.0, 3.0)]);
    let chunks = clean_cut(&nodes, &border, &ids);

    assert_eq!(chunks.len(), 3);
    assert_eq!(ids.issued(), 2);
    let sides: Vec<Containment> = chunks.iter().map(|chunk| chunk.side).collect();
    assert_eq!(
        sides,
        vec![Containment::Outside, Containment::Inside, Containment::Outside]
    );

    let middle = &chunks[1];
    assert!(middle.from_clipped && middle.to_clipped);
    assert_eq!(middle.nodes.first().map(|node| node.location), Some(Location::degrees(1.0, 0.0)));
    assert_eq!(middle.nodes.last().map(|node| node.location), Some(Location::degrees(1.0, 2.0)));
    assert!(!chunks[0].from_clipped && !chunks[2].to_clipped);
    assert_eq!(real_nodes(&chunks), nodes.iter().map(|node| node.identifier).collect::<Vec<_>>());
}

#[test]
fn cutting_is_reproducible() {
    let border = square(0.0, 0.0, 1.0, 1.0);
    let nodes = way(&[(0.5, 0.5), (1.5, 0.5), (1.5, 1.5), (0.5, 1.5), (0.5, 0.9)]);
    let first = clean_cut(&nodes, &border, &SyntheticIds::new());
    let second = clean_cut(&nodes, &border, &SyntheticIds::new());
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    for chunk in &first {
        for node in chunk.nodes.iter().filter(|node| node.synthetic) {
            assert!(SyntheticIds::is_synthetic(node.identifier));
        }
    }
}

#[test]
fn a_way_along_the_border_is_one_on_border_chunk() {
    let border = square(0.0, 0.0, 1.0, 1.0);
    let nodes = way(&[(0.0, 0.2), (0.0, 0.5), (0.0, 0.8)]);
    let chunks = clean_cut(&nodes, &border, &SyntheticIds::new());
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].side, Containment::OnBorder);
    assert!(chunks[0].from_clipped && chunks[0].to_clipped);
}

#[test]
fn triangular_borders_cut_diagonal_ways() -> Result<()> {
    let border = PolygonBorder::from_ring(&[
        Location::degrees(0.0, 0.0),
        Location::degrees(0.0, 4.0),
        Location::degrees(4.0, 0.0),
        Location::degrees(0.0, 0.0),
    ])?;
    let nodes = way(&[(1.0, 1.0), (3.0, 3.0)]);
    let chunks = clean_cut(&nodes, &border, &SyntheticIds::new());
    assert_eq!(chunks.len(), 2);
    let crossing = chunks[0].nodes[1];
    assert!(crossing.synthetic);
    assert_eq!(crossing.location, Location::degrees(2.0, 2.0));
    assert_eq!(border.containment(crossing.location), Containment::OnBorder);
    Ok(())
}

#[test]
fn regions_classify_by_midpoint() {
    let regions = RegionClassifier::new()
        .with_region("AT", Arc::new(square(46.0, 9.5, 49.0, 17.0)))
        .with_region("DE", Arc::new(square(47.0, 6.0, 55.0, 15.0)));
    assert_eq!(regions.len(), 2);
    assert_eq!(
        regions.country(Location::degrees(48.0, 16.0), Location::degrees(48.2, 16.4)),
        Some("AT")
    );
    assert_eq!(
        regions.country(Location::degrees(52.5, 13.3), Location::degrees(52.6, 13.4)),
        Some("DE")
    );
    assert_eq!(regions.country_at(Location::degrees(40.0, 3.0)), None);
}

fn grid_point() -> impl Strategy<Value = (f64, f64)> {
    (-30i32..=30, -30i32..=30).prop_map(|(lat, lon)| (f64::from(lat) * 0.1, f64::from(lon) * 0.1))
}

proptest! {
    #[test]
    fn chunks_cover_the_way_in_order(points in prop::collection::vec(grid_point(), 2..12)) {
        let mut points = points;
        points.dedup();
        prop_assume!(points.len() >= 2);
        let border = square(-1.0, -1.0, 1.0, 1.0);
        let nodes = way(&points);
        let chunks = clean_cut(&nodes, &border, &SyntheticIds::new());

        prop_assert!(!chunks.is_empty());
        for chunk in &chunks {
            prop_assert!(chunk.nodes.len() >= 2);
        }
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[0].nodes.last(), pair[1].nodes.first());
            prop_assert!(pair[0].to_clipped && pair[1].from_clipped);
        }
        for node in chunks.iter().flat_map(|chunk| chunk.nodes.iter()).filter(|node| node.synthetic) {
            prop_assert_eq!(border.containment(node.location), Containment::OnBorder);
        }
        let expected: Vec<Identifier> = nodes.iter().map(|node| node.identifier).collect();
        prop_assert_eq!(real_nodes(&chunks), expected);
    }
}
