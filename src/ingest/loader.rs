//! The ingestion pipeline: one optional scan pass and one main pass over
//! an [`OsmSource`], producing a committed [`Graph`].

use tracing::{debug, error, info, warn};

use super::border::Containment;
use super::chunker::{clean_cut, single_chunk, Chunk, SyntheticIds, WayNode};
use super::driver::{PassHandler, PhaseDriver, Progress};
use super::edges::{sections, EdgeIdentifiers, NodeRefCounts, WayAttributes};
use super::extract;
use super::locations::NodeLocationMap;
use super::options::{LoaderOptions, NodeLocationPolicy};
use super::relations::{RelationLinker, RouteIndex};
use super::source::{OsmElement, OsmNode, OsmRelation, OsmSource, OsmWay};
use super::stats::IngestStatistics;
use super::vertices::{resolve_edge_vertices, EndpointCollector};
use crate::graph::Graph;
use crate::storage::kinds::{PlaceSpec, RelationSpec};
use crate::storage::{tag_value, CommonAttributes};
use crate::types::{Identifier, Location, Result, RoadGraphError};

/// Identifier offset of places derived from ways, above any OSM node id.
pub const WAY_PLACE_BASE: i64 = 1 << 56;

/// Builds graphs from OSM element streams.
#[derive(Debug, Clone, Default)]
pub struct GraphLoader {
    options: LoaderOptions,
}

impl GraphLoader {
    /// A loader with `options`.
    pub fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// The options.
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Runs the pipeline. Fails without a graph when the stream has no
    /// header or cannot be read; bad individual elements are only counted.
    pub fn load(&self, source: &mut dyn OsmSource) -> Result<(Graph, IngestStatistics)> {
        let described = source.describe();
        let Some(metadata) = source.metadata()? else {
            error!(source = %described, severity = "problem", "ingest.missing_metadata");
            return Err(RoadGraphError::MissingMetadata);
        };
        let locations_on_ways = metadata.locations_on_ways();
        info!(
            source = %described,
            locations_on_ways,
            scan = self.options.needs_scan(),
            cut = self.options.cut_border.is_some(),
            "ingest.start"
        );

        let progress = Progress::new(self.options.progress, &self.options.name);
        let refcounts = if self.options.needs_scan() {
            progress.message("scanning way nodes");
            Some(self.scan(source)?)
        } else {
            None
        };

        let graph = Graph::new(self.options.name.clone(), self.options.store.clone());
        graph.set_source(described.clone());
        if let Some(bounds) = self.options.bounds.or(metadata.bounds) {
            graph.set_bounds(bounds);
        }

        let mut run = LoadRun::new(&self.options, &graph, refcounts, locations_on_ways);
        {
            let mut driver = PhaseDriver::new(&mut run, &progress);
            source.stream(&mut |element| driver.feed(element))?;
            let elements = driver.finish()?;
            debug!(source = %described, elements, "ingest.stream_done");
        }
        let statistics = run.statistics;
        graph.commit()?;
        graph.mark_built()?;
        progress.finish();
        info!(
            source = %described,
            conserved = statistics.is_conserved(),
            summary = %statistics.summary(),
            "ingest.done"
        );
        Ok((graph, statistics))
    }

    fn scan(&self, source: &mut dyn OsmSource) -> Result<NodeRefCounts> {
        let mut counts = NodeRefCounts::default();
        source.stream(&mut |element| {
            if let OsmElement::Way(way) = element {
                if way.refs.len() < 2 || !self.options.way_filter.accepts(&way.tags) {
                    return Ok(());
                }
                let closed = way.refs.first() == way.refs.last();
                let refs = if closed {
                    &way.refs[..way.refs.len() - 1]
                } else {
                    &way.refs[..]
                };
                let mut previous = None;
                for id in refs {
                    if previous == Some(*id) {
                        continue;
                    }
                    previous = Some(*id);
                    *counts.entry(*id).or_insert(0) += 1;
                }
            }
            Ok(())
        })?;
        let shared = counts.values().filter(|count| **count >= 2).count();
        info!(way_nodes = counts.len(), shared, "ingest.scan");
        Ok(counts)
    }
}

struct LoadRun<'a> {
    options: &'a LoaderOptions,
    graph: &'a Graph,
    refcounts: Option<NodeRefCounts>,
    locations_on_ways: bool,
    locations: NodeLocationMap,
    synthetic: SyntheticIds,
    endpoints: EndpointCollector,
    routes: RouteIndex,
    linker: RelationLinker,
    statistics: IngestStatistics,
}

impl<'a> LoadRun<'a> {
    fn new(
        options: &'a LoaderOptions,
        graph: &'a Graph,
        refcounts: Option<NodeRefCounts>,
        locations_on_ways: bool,
    ) -> Self {
        Self {
            options,
            graph,
            refcounts,
            locations_on_ways,
            locations: NodeLocationMap::new(),
            synthetic: SyntheticIds::new(),
            endpoints: EndpointCollector::new(),
            routes: RouteIndex::new(),
            linker: RelationLinker::new(),
            statistics: IngestStatistics::default(),
        }
    }

    fn keeps_location(&self, id: i64) -> bool {
        if self.locations_on_ways {
            return false;
        }
        match self.options.node_locations {
            NodeLocationPolicy::AllNodes => true,
            NodeLocationPolicy::WayNodes => self
                .refcounts
                .as_ref()
                .is_some_and(|counts| counts.contains_key(&id)),
        }
    }

    fn within_bounds(&self, location: Location) -> bool {
        self.options
            .bounds
            .map_or(true, |bounds| bounds.contains(location))
    }

    fn add_place(&self, location: Location, common: CommonAttributes) -> Option<bool> {
        let place_type = extract::place_type(&common.tags)?;
        let spec = PlaceSpec {
            location,
            place_type,
            population: extract::population(&common.tags),
            name: extract::name(&common.tags),
            common,
        };
        Some(self.graph.places().add(spec))
    }

    fn resolve(&self, way: &OsmWay) -> Option<Vec<WayNode>> {
        let mut nodes: Vec<WayNode> = if self.locations_on_ways && way.locations.len() == way.refs.len() {
            way.refs
                .iter()
                .zip(&way.locations)
                .map(|(id, location)| WayNode::new(*id, *location))
                .collect()
        } else {
            way.refs
                .iter()
                .map(|id| self.locations.get(*id).map(|location| WayNode::new(*id, location)))
                .collect::<Option<Vec<_>>>()?
        };
        nodes.dedup_by_key(|node| node.identifier);
        if nodes.iter().any(|node| !node.location.is_valid()) {
            return None;
        }
        (nodes.len() >= 2).then_some(nodes)
    }

    fn way_place(&mut self, way: OsmWay) {
        let Some(nodes) = self.resolve(&way) else {
            self.statistics.ways.discard();
            return;
        };
        let count = nodes.len() as i64;
        let latitude = nodes.iter().map(|node| node.location.latitude_dm7 as i64).sum::<i64>() / count;
        let longitude = nodes.iter().map(|node| node.location.longitude_dm7 as i64).sum::<i64>() / count;
        let centre = Location::dm7(latitude as i32, longitude as i32);
        if !self.within_bounds(centre) {
            self.statistics.ways.filter_out();
            return;
        }
        let Some(identifier) = WAY_PLACE_BASE.checked_add(way.id) else {
            self.statistics.ways.discard();
            return;
        };
        let common = way
            .info
            .apply(CommonAttributes::new(identifier).with_tags(way.tags));
        match self.add_place(centre, common) {
            Some(true) => {
                self.statistics.places += 1;
                self.statistics.ways.accept();
            }
            _ => self.statistics.ways.discard(),
        }
    }

    fn chunks(&self, nodes: Vec<WayNode>, attributes: &WayAttributes) -> Vec<Chunk> {
        match &self.options.cut_border {
            Some(border) if attributes.is_cut_eligible() => {
                clean_cut(&nodes, border.as_ref(), &self.synthetic)
            }
            _ => vec![single_chunk(nodes)],
        }
    }
}

impl PassHandler for LoadRun<'_> {
    fn on_node(&mut self, node: OsmNode) -> Result<()> {
        self.statistics.nodes.seen += 1;
        if node.id <= 0 || !node.location.is_valid() {
            self.statistics.nodes.discard();
            return Ok(());
        }
        let mut produced = false;
        if self.keeps_location(node.id) {
            self.locations.insert(node.id, node.location)?;
            self.statistics.node_locations += 1;
            produced = true;
        }
        if tag_value(&node.tags, "place").is_some() && self.within_bounds(node.location) {
            let common = node
                .info
                .apply(CommonAttributes::new(node.id).with_tags(node.tags));
            match self.add_place(node.location, common) {
                Some(true) => {
                    self.statistics.places += 1;
                    produced = true;
                }
                Some(false) if !produced => {
                    self.statistics.nodes.discard();
                    return Ok(());
                }
                _ => {}
            }
        }
        if produced {
            self.statistics.nodes.accept();
        } else {
            self.statistics.nodes.filter_out();
        }
        Ok(())
    }

    fn on_end_nodes(&mut self) -> Result<()> {
        let nodes = self.locations.freeze();
        info!(
            nodes = self.statistics.nodes.seen,
            locations = nodes,
            places = self.statistics.places,
            "ingest.end_nodes"
        );
        Ok(())
    }

    fn on_way(&mut self, way: OsmWay) -> Result<()> {
        self.statistics.ways.seen += 1;
        if way.id <= 0 || way.refs.len() < 2 {
            self.statistics.ways.discard();
            return Ok(());
        }
        if extract::place_type(&way.tags).is_some() {
            self.way_place(way);
            return Ok(());
        }
        if !self.options.way_filter.accepts(&way.tags) {
            self.statistics.ways.filter_out();
            return Ok(());
        }
        let Some(attributes) = WayAttributes::from_tags(&way.tags) else {
            self.statistics.ways.filter_out();
            return Ok(());
        };
        let Some(mut nodes) = self.resolve(&way) else {
            debug!(way = way.id, "ingest.way_missing_geometry");
            self.statistics.ways.discard();
            return Ok(());
        };
        if let (Some(bounds), Some(first), Some(last)) = (self.options.bounds, nodes.first(), nodes.last()) {
            if !bounds.contains(first.location) && !bounds.contains(last.location) {
                self.statistics.ways.filter_out();
                return Ok(());
            }
        }
        let mut identifiers = match EdgeIdentifiers::new(way.id) {
            Ok(identifiers) => identifiers,
            Err(err) => {
                warn!(way = way.id, error = %err, "ingest.way_identifier");
                self.statistics.ways.discard();
                return Ok(());
            }
        };
        if attributes.reversed {
            nodes.reverse();
        }

        let chunks = self.chunks(nodes, &attributes);
        if chunks.len() > 1 {
            self.statistics.ways_cut += 1;
        }
        let refcounts = if self.options.section_at_intersections {
            self.refcounts.as_ref()
        } else {
            None
        };
        let mut stored = 0u32;
        'chunks: for chunk in &chunks {
            for section in sections(chunk, refcounts, self.options.max_section_points) {
                let identifier = match identifiers.next() {
                    Ok(identifier) => identifier,
                    Err(err) => {
                        warn!(way = way.id, error = %err, "ingest.way_sections");
                        break 'chunks;
                    }
                };
                let (Some(first), Some(last)) = (section.nodes.first(), section.nodes.last()) else {
                    continue;
                };
                let country = self.options.regions.country(first.location, last.location);
                let common = way
                    .info
                    .apply(CommonAttributes::new(identifier).with_tags(way.tags.clone()));
                let Some(spec) = attributes.edge(common, &section, country) else {
                    continue;
                };
                if self.graph.edges().add(spec) {
                    stored += 1;
                    self.endpoints
                        .record(first, section.from_clipped, attributes.grade_separation);
                    self.endpoints
                        .record(last, section.to_clipped, attributes.grade_separation);
                } else {
                    self.statistics.edges_discarded += 1;
                }
            }
        }
        if chunks.iter().any(|chunk| chunk.side == Containment::Outside) {
            debug!(way = way.id, chunks = chunks.len(), "ingest.way_crosses_border");
        }
        self.routes.record(way.id, identifiers.issued());
        if stored > 0 {
            self.statistics.ways.accept();
        } else {
            self.statistics.ways.discard();
        }
        Ok(())
    }

    fn on_end_ways(&mut self) -> Result<()> {
        let edges = self.graph.edges();
        let vertices = self.graph.vertices();
        edges.commit()?;
        let endpoints = std::mem::take(&mut self.endpoints);
        endpoints.materialize(vertices);
        vertices.commit()?;
        let resolved = resolve_edge_vertices(edges, vertices)?;
        info!(
            ways = self.statistics.ways.seen,
            edges = edges.size(),
            vertices = vertices.size(),
            resolved,
            synthetic = self.synthetic.issued(),
            "ingest.end_ways"
        );
        Ok(())
    }

    fn on_relation(&mut self, relation: OsmRelation) -> Result<()> {
        self.statistics.relations.seen += 1;
        if extract::is_admin_boundary(&relation.tags)
            || !self.options.relation_filter.accepts(&relation.tags)
        {
            self.statistics.relations.filter_out();
            return Ok(());
        }
        let identifier = Identifier(relation.id);
        let relation_type = tag_value(&relation.tags, "type").map(str::to_string);
        let route_name = match relation_type.as_deref() {
            Some("route") => extract::route_name(&relation.tags),
            _ => None,
        };
        let members = relation.members;
        let spec = RelationSpec {
            common: relation
                .info
                .apply(CommonAttributes::new(identifier).with_tags(relation.tags)),
            relation_type,
            members: members.clone(),
            route_name,
        };
        if !self.graph.relations().add(spec) {
            self.statistics.relations.discard();
            return Ok(());
        }
        self.statistics.relations.accept();
        self.linker
            .collect(&self.routes, self.graph.edges(), identifier, &members);
        Ok(())
    }

    fn on_end_relations(&mut self) -> Result<()> {
        let linker = std::mem::take(&mut self.linker);
        self.statistics.dangling_members = linker.dangling();
        self.statistics.relation_links = linker.apply(self.graph.edges())?;
        self.statistics.edges = self.graph.edges().size();
        self.statistics.vertices = self.graph.vertices().size();
        self.statistics.synthetic_nodes = self.synthetic.issued();
        info!(
            relations = self.statistics.relations.accepted,
            links = self.statistics.relation_links,
            dangling = self.statistics.dangling_members,
            "ingest.end_relations"
        );
        Ok(())
    }
}
