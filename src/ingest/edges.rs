//! Turning chunks into edge specs.

use rustc_hash::FxHashMap;

use super::chunker::{Chunk, WayNode};
use super::extract;
use crate::storage::kinds::{Direction, EdgeSpec, RoadState, RoadSubType, RoadSurface, RoadType};
use crate::storage::{CommonAttributes, Tag};
use crate::types::{Identifier, Result, RoadGraphError};

/// Edge identifiers reserved per way.
pub const SECTIONS_PER_WAY: i64 = 1_000_000;

/// Hands out `way_id * 1_000_000 + n` for the edges of one way.
#[derive(Debug)]
pub struct EdgeIdentifiers {
    base: i64,
    issued: i64,
}

impl EdgeIdentifiers {
    /// Identifiers for the edges of `way_id`.
    pub fn new(way_id: i64) -> Result<Self> {
        if way_id <= 0 {
            return Err(RoadGraphError::Invalid("way id must be positive"));
        }
        let base = way_id
            .checked_mul(SECTIONS_PER_WAY)
            .ok_or(RoadGraphError::Invalid("way id too large for edge identifiers"))?;
        Ok(Self { base, issued: 0 })
    }

    /// Next edge identifier of the way.
    pub fn next(&mut self) -> Result<Identifier> {
        if self.issued + 1 >= SECTIONS_PER_WAY {
            return Err(RoadGraphError::Invalid("too many edges for one way"));
        }
        self.issued += 1;
        Ok(Identifier(self.base + self.issued))
    }

    /// Identifiers handed out so far.
    pub fn issued(&self) -> u32 {
        self.issued as u32
    }

    /// The way an edge identifier was derived from.
    pub fn way_of(edge: Identifier) -> i64 {
        edge.normalized().0 / SECTIONS_PER_WAY
    }
}

/// Number of ways referencing each node, from the scan pass.
pub type NodeRefCounts = FxHashMap<i64, u32>;

/// A piece of a chunk that becomes one edge.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    /// Nodes, at least two.
    pub nodes: Vec<WayNode>,
    /// Border flag of the first node.
    pub from_clipped: bool,
    /// Border flag of the last node.
    pub to_clipped: bool,
}

/// Splits a chunk at interior nodes shared with other ways and whenever a
/// section reaches `max_points` nodes. Only the first section keeps the
/// chunk's `from_clipped`, only the last keeps `to_clipped`.
pub fn sections(chunk: &Chunk, refcounts: Option<&NodeRefCounts>, max_points: usize) -> Vec<Section> {
    let max_points = max_points.max(2);
    let last = chunk.nodes.len().saturating_sub(1);
    let mut out: Vec<Section> = Vec::new();
    let mut current: Vec<WayNode> = Vec::new();
    for (position, node) in chunk.nodes.iter().enumerate() {
        current.push(*node);
        if position == 0 || position == last {
            continue;
        }
        let shared = !node.synthetic
            && refcounts
                .and_then(|counts| counts.get(&node.identifier.0))
                .is_some_and(|count| *count >= 2);
        if shared || current.len() >= max_points {
            out.push(Section {
                nodes: std::mem::replace(&mut current, vec![*node]),
                from_clipped: false,
                to_clipped: false,
            });
        }
    }
    if current.len() >= 2 {
        out.push(Section {
            nodes: current,
            from_clipped: false,
            to_clipped: false,
        });
    }
    if let Some(first) = out.first_mut() {
        first.from_clipped = chunk.from_clipped;
    }
    if let Some(last) = out.last_mut() {
        last.to_clipped = chunk.to_clipped;
    }
    out
}

/// Attributes shared by every edge of one way.
#[derive(Clone, Debug, PartialEq)]
pub struct WayAttributes {
    /// Road class.
    pub road_type: RoadType,
    /// Road class refinement.
    pub road_sub_type: RoadSubType,
    /// Lifecycle state.
    pub road_state: RoadState,
    /// Surface.
    pub road_surface: RoadSurface,
    /// Speed limit in km/h.
    pub speed_limit: Option<u16>,
    /// Lanes.
    pub lane_count: Option<u8>,
    /// Name or ref.
    pub name: Option<String>,
    /// Travel direction.
    pub direction: Direction,
    /// Whether the node order was reversed for `oneway=-1`.
    pub reversed: bool,
    /// Vertical level of the way.
    pub grade_separation: u8,
    /// Traffic location codes.
    pub traffic_identifiers: Vec<String>,
}

impl WayAttributes {
    /// Extracts the attributes; `None` when the tags name no road class.
    pub fn from_tags(tags: &[Tag]) -> Option<Self> {
        let oneway = extract::oneway(tags);
        Some(Self {
            road_type: extract::road_type(tags)?,
            road_sub_type: extract::road_sub_type(tags),
            road_state: extract::road_state(tags),
            road_surface: extract::road_surface(tags),
            speed_limit: extract::speed_limit(tags),
            lane_count: extract::lane_count(tags),
            name: extract::name(tags),
            direction: oneway.direction,
            reversed: oneway.reversed,
            grade_separation: extract::grade_separation(tags),
            traffic_identifiers: extract::traffic_identifiers(tags),
        })
    }

    /// Whether ways with these attributes may be cut at a border.
    pub fn is_cut_eligible(&self) -> bool {
        extract::is_cut_eligible(self.road_type)
    }

    /// Edge spec for one section. Two-point sections carry no shape.
    pub fn edge(&self, common: CommonAttributes, section: &Section, country: Option<&str>) -> Option<EdgeSpec> {
        let first = section.nodes.first()?;
        let last = section.nodes.last()?;
        let mut spec = EdgeSpec::new(
            common,
            (first.identifier, first.location),
            (last.identifier, last.location),
        );
        if section.nodes.len() > 2 {
            spec = spec.with_polyline(section.nodes.iter().map(|node| node.location).collect());
        }
        spec.road_type = self.road_type;
        spec.road_sub_type = self.road_sub_type;
        spec.road_state = self.road_state;
        spec.road_surface = self.road_surface;
        spec.speed_limit = self.speed_limit;
        spec.lane_count = self.lane_count;
        spec.name = self.name.clone();
        spec.country = country.map(str::to_string);
        spec.direction = self.direction;
        spec.from_clipped = section.from_clipped;
        spec.to_clipped = section.to_clipped;
        spec.from_grade_separation = self.grade_separation;
        spec.to_grade_separation = self.grade_separation;
        spec.traffic_identifiers = self.traffic_identifiers.clone();
        Some(spec)
    }
}
