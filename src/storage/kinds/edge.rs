#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};

use geo::{HaversineLength, LineString};

use crate::storage::codec::{coded_column, Coded, Shape};
use crate::storage::column::{AttributeColumn, Column, ColumnSet};
use crate::storage::element::{validate_common, CommonAttributes, ElementKind, Rejection};
use crate::storage::store::ElementStore;
use crate::types::{ElementIndex, ElementKindTag, Identifier, Location, Result};

/// Directed road segments.
#[derive(Debug)]
pub enum Edge {}

/// Functional road class.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum RoadType {
    /// Not a recognised road.
    #[default]
    Unknown,
    /// `highway=motorway`.
    Motorway,
    /// `highway=trunk`.
    Trunk,
    /// `highway=primary`.
    Primary,
    /// `highway=secondary`.
    Secondary,
    /// `highway=tertiary`.
    Tertiary,
    /// `highway=unclassified`.
    Unclassified,
    /// `highway=residential`.
    Residential,
    /// `highway=living_street`.
    LivingStreet,
    /// `highway=service`.
    Service,
    /// `highway=track`.
    Track,
    /// `highway=path`, `footway`, `cycleway`, `bridleway`, `steps`.
    Path,
    /// `highway=pedestrian`.
    Pedestrian,
    /// `route=ferry`.
    Ferry,
}

impl Coded for RoadType {
    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => RoadType::Unknown,
            1 => RoadType::Motorway,
            2 => RoadType::Trunk,
            3 => RoadType::Primary,
            4 => RoadType::Secondary,
            5 => RoadType::Tertiary,
            6 => RoadType::Unclassified,
            7 => RoadType::Residential,
            8 => RoadType::LivingStreet,
            9 => RoadType::Service,
            10 => RoadType::Track,
            11 => RoadType::Path,
            12 => RoadType::Pedestrian,
            13 => RoadType::Ferry,
            _ => return None,
        })
    }
}

coded_column!(RoadType);

/// Refinement of [`RoadType`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum RoadSubType {
    /// Plain carriageway.
    #[default]
    Normal,
    /// `*_link` ramps.
    Link,
    /// `junction=roundabout`.
    Roundabout,
    /// Parking aisles, driveways and similar service roads.
    Access,
}

impl Coded for RoadSubType {
    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => RoadSubType::Normal,
            1 => RoadSubType::Link,
            2 => RoadSubType::Roundabout,
            3 => RoadSubType::Access,
            _ => return None,
        })
    }
}

coded_column!(RoadSubType);

/// Lifecycle state. `Unknown` is the null marker and never valid on a spec.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum RoadState {
    /// Null marker.
    #[default]
    Unknown,
    /// In use.
    Open,
    /// Under construction.
    Construction,
    /// Planned.
    Proposed,
    /// Physically present but closed to traffic.
    Closed,
}

impl Coded for RoadState {
    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => RoadState::Unknown,
            1 => RoadState::Open,
            2 => RoadState::Construction,
            3 => RoadState::Proposed,
            4 => RoadState::Closed,
            _ => return None,
        })
    }
}

coded_column!(RoadState);

/// Surface class.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum RoadSurface {
    /// Not tagged.
    #[default]
    Unknown,
    /// Asphalt, concrete, paving stones.
    Paved,
    /// Gravel, dirt, grass.
    Unpaved,
}

impl Coded for RoadSurface {
    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => RoadSurface::Unknown,
            1 => RoadSurface::Paved,
            2 => RoadSurface::Unpaved,
            _ => return None,
        })
    }
}

coded_column!(RoadSurface);

/// Travel direction relative to the shape order.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Direction {
    /// Both directions; the reverse row is implied by the negated identifier.
    #[default]
    TwoWay,
    /// Only from `from_node` to `to_node`.
    OneWay,
}

impl Coded for Direction {
    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Direction::TwoWay,
            1 => Direction::OneWay,
            _ => return None,
        })
    }
}

coded_column!(Direction);

/// An edge before it is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeSpec {
    /// Common attributes; the identifier derives from the source way.
    pub common: CommonAttributes,
    /// First node of the edge.
    pub from_node: Identifier,
    /// Last node of the edge.
    pub to_node: Identifier,
    /// Position of `from_node`.
    pub from_location: Location,
    /// Position of `to_node`.
    pub to_location: Location,
    /// Full polyline including both endpoints; `None` for two-point edges.
    pub shape: Shape,
    /// Road class.
    pub road_type: RoadType,
    /// Road class refinement.
    pub road_sub_type: RoadSubType,
    /// Lifecycle state.
    pub road_state: RoadState,
    /// Surface class.
    pub road_surface: RoadSurface,
    /// Speed limit in km/h.
    pub speed_limit: Option<u16>,
    /// Lane count.
    pub lane_count: Option<u8>,
    /// Road name.
    pub name: Option<String>,
    /// ISO country code of the region containing the edge.
    pub country: Option<String>,
    /// Travel direction.
    pub direction: Direction,
    /// Whether `from_node` lies on a cut border.
    pub from_clipped: bool,
    /// Whether `to_node` lies on a cut border.
    pub to_clipped: bool,
    /// Vertical level at `from_node`.
    pub from_grade_separation: u8,
    /// Vertical level at `to_node`.
    pub to_grade_separation: u8,
    /// External traffic location codes.
    pub traffic_identifiers: Vec<String>,
    /// Length in millimetres; derived from the geometry when absent.
    pub length_mm: Option<u32>,
}

impl EdgeSpec {
    /// A two-point, two-way, open edge of unknown class.
    pub fn new(
        common: CommonAttributes,
        from: (Identifier, Location),
        to: (Identifier, Location),
    ) -> Self {
        Self {
            common,
            from_node: from.0,
            to_node: to.0,
            from_location: from.1,
            to_location: to.1,
            shape: Shape(None),
            road_type: RoadType::Unknown,
            road_sub_type: RoadSubType::Normal,
            road_state: RoadState::Open,
            road_surface: RoadSurface::Unknown,
            speed_limit: None,
            lane_count: None,
            name: None,
            country: None,
            direction: Direction::TwoWay,
            from_clipped: false,
            to_clipped: false,
            from_grade_separation: 0,
            to_grade_separation: 0,
            traffic_identifiers: Vec::new(),
            length_mm: None,
        }
    }

    /// Sets the full polyline; endpoints are taken from it.
    pub fn with_polyline(mut self, points: Vec<Location>) -> Self {
        if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
            self.from_location = first;
            self.to_location = last;
        }
        self.shape = if points.len() > 2 {
            Shape(Some(points))
        } else {
            Shape(None)
        };
        self
    }

    /// Polyline of the edge including both endpoints.
    pub fn polyline(&self) -> Vec<Location> {
        polyline(&self.shape, self.from_location, self.to_location)
    }
}

fn polyline(shape: &Shape, from: Location, to: Location) -> Vec<Location> {
    match &shape.0 {
        Some(points) => points.clone(),
        None => vec![from, to],
    }
}

/// Great-circle length of a polyline in millimetres.
pub fn length_mm(points: &[Location]) -> u32 {
    let line: LineString<f64> = points.iter().map(|location| location.coord()).collect();
    let metres = line.haversine_length();
    (metres * 1000.0).round().min(u32::MAX as f64) as u32
}

/// A stored edge.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeRecord {
    /// Dense index.
    pub index: ElementIndex,
    /// Common attributes.
    pub common: CommonAttributes,
    /// First node.
    pub from_node: Identifier,
    /// Last node.
    pub to_node: Identifier,
    /// Position of the first node.
    pub from_location: Location,
    /// Position of the last node.
    pub to_location: Location,
    /// Intermediate geometry.
    pub shape: Shape,
    /// Road class.
    pub road_type: RoadType,
    /// Road class refinement.
    pub road_sub_type: RoadSubType,
    /// Lifecycle state.
    pub road_state: RoadState,
    /// Surface class.
    pub road_surface: RoadSurface,
    /// Speed limit in km/h.
    pub speed_limit: Option<u16>,
    /// Lane count.
    pub lane_count: Option<u8>,
    /// Road name.
    pub name: Option<String>,
    /// ISO country code.
    pub country: Option<String>,
    /// Travel direction.
    pub direction: Direction,
    /// Border flag of the first node.
    pub from_clipped: bool,
    /// Border flag of the last node.
    pub to_clipped: bool,
    /// Vertical level at the first node.
    pub from_grade_separation: u8,
    /// Vertical level at the last node.
    pub to_grade_separation: u8,
    /// External traffic location codes.
    pub traffic_identifiers: Vec<String>,
    /// Length in millimetres.
    pub length_mm: u32,
    /// Relations linked to this edge through routes.
    pub relations: Vec<Identifier>,
    /// Vertex index of the first node, once resolved.
    pub from_vertex: ElementIndex,
    /// Vertex index of the last node, once resolved.
    pub to_vertex: ElementIndex,
}

impl EdgeRecord {
    /// Polyline of the edge including both endpoints.
    pub fn polyline(&self) -> Vec<Location> {
        polyline(&self.shape, self.from_location, self.to_location)
    }

    /// Returns true when travel in both directions is allowed.
    pub fn is_two_way(&self) -> bool {
        self.direction == Direction::TwoWay
    }
}

/// Edge-specific columns.
pub struct EdgeColumns {
    /// First node.
    pub from_node: AttributeColumn<Identifier>,
    /// Last node.
    pub to_node: AttributeColumn<Identifier>,
    /// First node position.
    pub from_location: AttributeColumn<Location>,
    /// Last node position.
    pub to_location: AttributeColumn<Location>,
    /// Intermediate geometry.
    pub shape: AttributeColumn<Shape>,
    /// Road class.
    pub road_type: AttributeColumn<RoadType>,
    /// Road class refinement.
    pub road_sub_type: AttributeColumn<RoadSubType>,
    /// Lifecycle state.
    pub road_state: AttributeColumn<RoadState>,
    /// Surface class.
    pub road_surface: AttributeColumn<RoadSurface>,
    /// Speed limit, 0 when unknown.
    pub speed_limit: AttributeColumn<u16>,
    /// Lane count, 0 when unknown.
    pub lane_count: AttributeColumn<u8>,
    /// Road name, empty when unknown.
    pub name: AttributeColumn<String>,
    /// Country code, empty when unknown.
    pub country: AttributeColumn<String>,
    /// Travel direction.
    pub direction: AttributeColumn<Direction>,
    /// Border flag of the first node.
    pub from_clipped: AttributeColumn<bool>,
    /// Border flag of the last node.
    pub to_clipped: AttributeColumn<bool>,
    /// Vertical level at the first node.
    pub from_grade_separation: AttributeColumn<u8>,
    /// Vertical level at the last node.
    pub to_grade_separation: AttributeColumn<u8>,
    /// Traffic location codes.
    pub traffic_identifiers: AttributeColumn<Vec<String>>,
    /// Length in millimetres.
    pub length_mm: AttributeColumn<u32>,
    /// Linked relations.
    pub relations: AttributeColumn<Vec<Identifier>>,
    /// Resolved vertex of the first node.
    pub from_vertex: AttributeColumn<ElementIndex>,
    /// Resolved vertex of the last node.
    pub to_vertex: AttributeColumn<ElementIndex>,
    two_way_added: AtomicU64,
}

impl EdgeColumns {
    /// Two-way edges accepted since the store was created or opened.
    pub fn two_way_added(&self) -> u64 {
        self.two_way_added.load(Ordering::Relaxed)
    }
}

impl ColumnSet for EdgeColumns {
    fn columns(&self) -> Vec<&dyn Column> {
        vec![
            &self.from_node,
            &self.to_node,
            &self.from_location,
            &self.to_location,
            &self.shape,
            &self.road_type,
            &self.road_sub_type,
            &self.road_state,
            &self.road_surface,
            &self.speed_limit,
            &self.lane_count,
            &self.name,
            &self.country,
            &self.direction,
            &self.from_clipped,
            &self.to_clipped,
            &self.from_grade_separation,
            &self.to_grade_separation,
            &self.traffic_identifiers,
            &self.length_mm,
            &self.relations,
            &self.from_vertex,
            &self.to_vertex,
        ]
    }
}

impl ElementKind for Edge {
    const TAG: ElementKindTag = ElementKindTag::Edge;
    type Spec = EdgeSpec;
    type Record = EdgeRecord;
    type Columns = EdgeColumns;

    fn columns(owner: &str, estimate: usize) -> EdgeColumns {
        EdgeColumns {
            from_node: AttributeColumn::new(owner, "from_node", estimate),
            to_node: AttributeColumn::new(owner, "to_node", estimate),
            from_location: AttributeColumn::new(owner, "from_location", estimate),
            to_location: AttributeColumn::new(owner, "to_location", estimate),
            shape: AttributeColumn::new(owner, "shape", estimate),
            road_type: AttributeColumn::new(owner, "road_type", estimate),
            road_sub_type: AttributeColumn::new(owner, "road_sub_type", estimate),
            road_state: AttributeColumn::new(owner, "road_state", estimate),
            road_surface: AttributeColumn::new(owner, "road_surface", 0),
            speed_limit: AttributeColumn::new(owner, "speed_limit", 0),
            lane_count: AttributeColumn::new(owner, "lane_count", 0),
            name: AttributeColumn::new(owner, "name", 0),
            country: AttributeColumn::new(owner, "country", 0),
            direction: AttributeColumn::new(owner, "direction", estimate),
            from_clipped: AttributeColumn::new(owner, "from_clipped", 0),
            to_clipped: AttributeColumn::new(owner, "to_clipped", 0),
            from_grade_separation: AttributeColumn::new(owner, "from_grade_separation", 0),
            to_grade_separation: AttributeColumn::new(owner, "to_grade_separation", 0),
            traffic_identifiers: AttributeColumn::new(owner, "traffic_identifiers", 0),
            length_mm: AttributeColumn::new(owner, "length_mm", estimate),
            relations: AttributeColumn::new(owner, "relations", 0),
            from_vertex: AttributeColumn::new(owner, "from_vertex", 0),
            to_vertex: AttributeColumn::new(owner, "to_vertex", 0),
            two_way_added: AtomicU64::new(0),
        }
    }

    fn common(spec: &EdgeSpec) -> &CommonAttributes {
        &spec.common
    }

    fn validate(spec: &EdgeSpec) -> std::result::Result<(), Rejection> {
        validate_common(&spec.common)?;
        if spec.common.identifier.is_reverse() {
            return Err(Rejection("reverse edges are implied, not stored"));
        }
        if !spec.from_node.is_valid() || !spec.to_node.is_valid() {
            return Err(Rejection("missing endpoint node"));
        }
        if !spec.from_location.is_valid() || !spec.to_location.is_valid() {
            return Err(Rejection("missing geometry"));
        }
        if let Some(points) = &spec.shape.0 {
            if points.len() < 2 {
                return Err(Rejection("degenerate shape"));
            }
            if points.first() != Some(&spec.from_location)
                || points.last() != Some(&spec.to_location)
            {
                return Err(Rejection("shape does not match endpoints"));
            }
        }
        if spec.road_state == RoadState::Unknown {
            return Err(Rejection("invalid road state"));
        }
        Ok(())
    }

    fn write(columns: &EdgeColumns, index: ElementIndex, spec: &EdgeSpec) -> Result<()> {
        columns.from_node.set(index, spec.from_node)?;
        columns.to_node.set(index, spec.to_node)?;
        columns.from_location.set(index, spec.from_location)?;
        columns.to_location.set(index, spec.to_location)?;
        if spec.shape.0.is_some() {
            columns.shape.set(index, spec.shape.clone())?;
        }
        columns.road_type.set(index, spec.road_type)?;
        columns.road_sub_type.set(index, spec.road_sub_type)?;
        columns.road_state.set(index, spec.road_state)?;
        if spec.road_surface != RoadSurface::Unknown {
            columns.road_surface.set(index, spec.road_surface)?;
        }
        if let Some(speed) = spec.speed_limit {
            columns.speed_limit.set(index, speed)?;
        }
        if let Some(lanes) = spec.lane_count {
            columns.lane_count.set(index, lanes)?;
        }
        if let Some(name) = &spec.name {
            columns.name.set(index, name.clone())?;
        }
        if let Some(country) = &spec.country {
            columns.country.set(index, country.clone())?;
        }
        columns.direction.set(index, spec.direction)?;
        if spec.from_clipped {
            columns.from_clipped.set(index, true)?;
        }
        if spec.to_clipped {
            columns.to_clipped.set(index, true)?;
        }
        if spec.from_grade_separation != 0 {
            columns
                .from_grade_separation
                .set(index, spec.from_grade_separation)?;
        }
        if spec.to_grade_separation != 0 {
            columns
                .to_grade_separation
                .set(index, spec.to_grade_separation)?;
        }
        if !spec.traffic_identifiers.is_empty() {
            columns
                .traffic_identifiers
                .set(index, spec.traffic_identifiers.clone())?;
        }
        if let Some(length) = spec.length_mm {
            columns.length_mm.set(index, length)?;
        }
        Ok(())
    }

    fn read(columns: &EdgeColumns, index: ElementIndex, common: CommonAttributes) -> Result<EdgeRecord> {
        let speed_limit = columns.speed_limit.get(index)?;
        let lane_count = columns.lane_count.get(index)?;
        let name = columns.name.get(index)?;
        let country = columns.country.get(index)?;
        Ok(EdgeRecord {
            index,
            common,
            from_node: columns.from_node.get(index)?,
            to_node: columns.to_node.get(index)?,
            from_location: columns.from_location.get(index)?,
            to_location: columns.to_location.get(index)?,
            shape: columns.shape.get(index)?,
            road_type: columns.road_type.get(index)?,
            road_sub_type: columns.road_sub_type.get(index)?,
            road_state: columns.road_state.get(index)?,
            road_surface: columns.road_surface.get(index)?,
            speed_limit: (speed_limit != 0).then_some(speed_limit),
            lane_count: (lane_count != 0).then_some(lane_count),
            name: (!name.is_empty()).then_some(name),
            country: (!country.is_empty()).then_some(country),
            direction: columns.direction.get(index)?,
            from_clipped: columns.from_clipped.get(index)?,
            to_clipped: columns.to_clipped.get(index)?,
            from_grade_separation: columns.from_grade_separation.get(index)?,
            to_grade_separation: columns.to_grade_separation.get(index)?,
            traffic_identifiers: columns.traffic_identifiers.get(index)?,
            length_mm: columns.length_mm.get(index)?,
            relations: columns.relations.get(index)?,
            from_vertex: columns.from_vertex.get(index)?,
            to_vertex: columns.to_vertex.get(index)?,
        })
    }

    fn on_add(columns: &EdgeColumns, index: ElementIndex, spec: &EdgeSpec) -> Result<()> {
        if spec.length_mm.is_none() {
            columns.length_mm.set(index, length_mm(&spec.polyline()))?;
        }
        Ok(())
    }

    fn on_added(columns: &EdgeColumns, _index: ElementIndex, spec: &EdgeSpec) -> Result<()> {
        if spec.direction == Direction::TwoWay {
            columns.two_way_added.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn implied_rows(columns: &EdgeColumns, live: &[ElementIndex]) -> Result<u64> {
        columns.direction.with_values(|directions| {
            live.iter()
                .filter(|index| {
                    directions.get(index.slot()).copied().unwrap_or_default() == Direction::TwoWay
                })
                .count() as u64
        })
    }
}

impl ElementStore<Edge> {
    /// Reads the edge at `index`.
    pub fn edge(&self, index: ElementIndex) -> Result<EdgeRecord> {
        self.record(index)
    }

    /// Reads an edge by signed identifier; a negative identifier yields the
    /// reverse of a two-way edge with endpoints, flags and shape swapped.
    pub fn directed_edge(&self, identifier: Identifier) -> Result<EdgeRecord> {
        let record = self.record(self.retrieve_index(identifier)?)?;
        if !identifier.is_reverse() {
            return Ok(record);
        }
        if !record.is_two_way() {
            return Err(crate::types::RoadGraphError::NoIndex(identifier));
        }
        let shape = Shape(record.shape.0.as_ref().map(|points| {
            let mut reversed = points.clone();
            reversed.reverse();
            reversed
        }));
        Ok(EdgeRecord {
            common: CommonAttributes {
                identifier,
                ..record.common
            },
            from_node: record.to_node,
            to_node: record.from_node,
            from_location: record.to_location,
            to_location: record.from_location,
            shape,
            from_clipped: record.to_clipped,
            to_clipped: record.from_clipped,
            from_grade_separation: record.to_grade_separation,
            to_grade_separation: record.from_grade_separation,
            from_vertex: record.to_vertex,
            to_vertex: record.from_vertex,
            ..record
        })
    }

    /// Links relation `relation` into the edge at `index`. Idempotent.
    pub fn link_relation(&self, index: ElementIndex, relation: Identifier) -> Result<()> {
        self.ensure_writable()?;
        let columns = self.kind_columns();
        let mut relations = columns.relations.get(index)?;
        if !relations.contains(&relation) {
            relations.push(relation);
            columns.relations.set(index, relations)?;
        }
        Ok(())
    }

    /// Records the resolved endpoint vertices of the edge at `index`.
    pub fn set_vertices(&self, index: ElementIndex, from: ElementIndex, to: ElementIndex) -> Result<()> {
        self.ensure_writable()?;
        let columns = self.kind_columns();
        columns.from_vertex.set(index, from)?;
        columns.to_vertex.set(index, to)
    }
}
