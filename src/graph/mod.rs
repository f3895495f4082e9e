//! The road graph: four element stores sharing one context and one archive.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use crate::storage::kinds::{Edge, Place, Relation, Vertex};
use crate::storage::{
    default_metrics, Archive, ArchiveVersion, ElementStore, FieldPayload, GraphContext,
    StoreMetrics, StoreOptions, TagCodec, ValidationReport, TAG_STRINGS_FIELD,
};
use crate::types::{Rectangle, Result, RoadGraphError};

/// Archive owner of the graph-level fields.
pub const GRAPH_OWNER: &str = "graph";
/// Archive field holding [`GraphMetadata`].
pub const GRAPH_METADATA_FIELD: &str = "graph_metadata";
/// Owner name of the vertex store.
pub const VERTEX_STORE: &str = "vertex-store";
/// Owner name of the edge store.
pub const EDGE_STORE: &str = "edge-store";
/// Owner name of the relation store.
pub const RELATION_STORE: &str = "relation-store";
/// Owner name of the place store.
pub const PLACE_STORE: &str = "place-store";

/// Logical element counts per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    /// Vertices.
    pub vertices: u64,
    /// Edges, reverse directions of two-way edges included.
    pub edges: u64,
    /// Relations.
    pub relations: u64,
    /// Places.
    pub places: u64,
}

/// Descriptive metadata persisted with the graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Graph name.
    pub name: String,
    /// RFC 3339 build time.
    pub built_at: Option<String>,
    /// Input the graph was built from.
    pub source: Option<String>,
    /// Load bounds as `[south, west, north, east]` in DM7.
    pub bounds: Option<[i32; 4]>,
    /// Counts at the last save.
    pub counts: GraphCounts,
    /// Crate version that wrote the graph.
    pub writer_version: String,
}

/// Vertices, edges, relations and places of one road network.
pub struct Graph {
    context: Arc<GraphContext>,
    vertices: Arc<ElementStore<Vertex>>,
    edges: Arc<ElementStore<Edge>>,
    relations: Arc<ElementStore<Relation>>,
    places: Arc<ElementStore<Place>>,
    metadata: RwLock<GraphMetadata>,
    archive: RwLock<Option<Arc<Archive>>>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.metadata.read().name)
            .field("vertices", &self.vertices.size())
            .field("edges", &self.edges.size())
            .field("relations", &self.relations.size())
            .field("places", &self.places.size())
            .finish()
    }
}

impl Graph {
    /// Creates an empty graph reporting to the metrics in `options`, or to
    /// no-op metrics when none are set.
    pub fn new(name: impl Into<String>, options: StoreOptions) -> Self {
        let metrics = options.metrics.clone().unwrap_or_else(default_metrics);
        Self::with_metrics(name, options, metrics)
    }

    /// Creates an empty graph reporting to `metrics`.
    pub fn with_metrics(
        name: impl Into<String>,
        options: StoreOptions,
        metrics: Arc<dyn StoreMetrics>,
    ) -> Self {
        let context = Arc::new(GraphContext::with_parts(TagCodec::new(), metrics));
        let metadata = GraphMetadata {
            name: name.into(),
            writer_version: env!("CARGO_PKG_VERSION").to_string(),
            ..GraphMetadata::default()
        };
        Self::assemble(
            Arc::clone(&context),
            ElementStore::new(VERTEX_STORE, Arc::clone(&context), options.clone()),
            ElementStore::new(EDGE_STORE, Arc::clone(&context), options.clone()),
            ElementStore::new(RELATION_STORE, Arc::clone(&context), options.clone()),
            ElementStore::new(PLACE_STORE, context, options),
            metadata,
            None,
        )
    }

    fn assemble(
        context: Arc<GraphContext>,
        vertices: Arc<ElementStore<Vertex>>,
        edges: Arc<ElementStore<Edge>>,
        relations: Arc<ElementStore<Relation>>,
        places: Arc<ElementStore<Place>>,
        metadata: GraphMetadata,
        archive: Option<Arc<Archive>>,
    ) -> Self {
        context.register(&vertices);
        context.register(&edges);
        context.register(&relations);
        context.register(&places);
        Self {
            context,
            vertices,
            edges,
            relations,
            places,
            metadata: RwLock::new(metadata),
            archive: RwLock::new(archive),
        }
    }

    /// Opens a graph saved with [`Graph::save`]. Columns load lazily.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let archive = Arc::new(Archive::open(path.as_ref())?);
        let metadata: GraphMetadata = archive
            .load_value(GRAPH_OWNER, GRAPH_METADATA_FIELD)?
            .ok_or(RoadGraphError::Corruption("graph metadata missing"))?;
        let strings: Vec<String> = archive
            .load_column(GRAPH_OWNER, TAG_STRINGS_FIELD)?
            .unwrap_or_default();
        let metrics = options.metrics.clone().unwrap_or_else(default_metrics);
        let context = Arc::new(GraphContext::with_parts(TagCodec::restore(strings)?, metrics));
        let graph = Self::assemble(
            Arc::clone(&context),
            ElementStore::open(VERTEX_STORE, Arc::clone(&context), options.clone(), Arc::clone(&archive))?,
            ElementStore::open(EDGE_STORE, Arc::clone(&context), options.clone(), Arc::clone(&archive))?,
            ElementStore::open(RELATION_STORE, Arc::clone(&context), options.clone(), Arc::clone(&archive))?,
            ElementStore::open(PLACE_STORE, context, options, Arc::clone(&archive))?,
            metadata,
            Some(Arc::clone(&archive)),
        );
        info!(
            graph = %graph.metadata.read().name,
            archive = %archive.path().display(),
            version = %archive.version(),
            "graph.open"
        );
        Ok(graph)
    }

    /// The shared context.
    pub fn context(&self) -> &Arc<GraphContext> {
        &self.context
    }

    /// Vertex store.
    pub fn vertices(&self) -> &Arc<ElementStore<Vertex>> {
        &self.vertices
    }

    /// Edge store.
    pub fn edges(&self) -> &Arc<ElementStore<Edge>> {
        &self.edges
    }

    /// Relation store.
    pub fn relations(&self) -> &Arc<ElementStore<Relation>> {
        &self.relations
    }

    /// Place store.
    pub fn places(&self) -> &Arc<ElementStore<Place>> {
        &self.places
    }

    /// Copy of the metadata.
    pub fn metadata(&self) -> GraphMetadata {
        self.metadata.read().clone()
    }

    /// Records the input the graph was built from.
    pub fn set_source(&self, source: impl Into<String>) {
        self.metadata.write().source = Some(source.into());
    }

    /// Records the load bounds.
    pub fn set_bounds(&self, bounds: Rectangle) {
        self.metadata.write().bounds = Some([
            bounds.bottom_left.latitude_dm7,
            bounds.bottom_left.longitude_dm7,
            bounds.top_right.latitude_dm7,
            bounds.top_right.longitude_dm7,
        ]);
    }

    /// Stamps the build time.
    pub fn mark_built(&self) -> Result<()> {
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| RoadGraphError::Serialization(err.to_string()))?;
        self.metadata.write().built_at = Some(now);
        Ok(())
    }

    /// Logical counts per kind.
    pub fn counts(&self) -> Result<GraphCounts> {
        Ok(GraphCounts {
            vertices: self.vertices.count()?,
            edges: self.edges.count()?,
            relations: self.relations.count()?,
            places: self.places.count()?,
        })
    }

    /// Commits every store.
    pub fn commit(&self) -> Result<()> {
        self.vertices.commit()?;
        self.edges.commit()?;
        self.relations.commit()?;
        self.places.commit()
    }

    /// Loads every column of every store.
    pub fn load_all(&self) -> Result<()> {
        self.vertices.load_all()?;
        self.edges.load_all()?;
        self.relations.load_all()?;
        self.places.load_all()
    }

    /// Unloads every store. Fails when any store has unsaved changes.
    pub fn unload(&self) -> Result<()> {
        self.vertices.unload()?;
        self.edges.unload()?;
        self.relations.unload()?;
        self.places.unload()
    }

    /// Validates every store.
    pub fn validate(&self) -> Result<Vec<ValidationReport>> {
        Ok(vec![
            self.vertices.validator()?,
            self.edges.validator()?,
            self.relations.validator()?,
            self.places.validator()?,
        ])
    }

    /// Saves all stores, the tag dictionary and the metadata to `path`,
    /// reusing the archive the graph is already backed by when the path
    /// matches.
    pub fn save(&self, path: impl AsRef<Path>, version: ArchiveVersion) -> Result<Arc<Archive>> {
        let path = path.as_ref();
        let current = self.archive.read().clone();
        let archive = match current {
            Some(archive) if archive.path() == path => archive,
            _ if path.exists() => Arc::new(Archive::open(path)?),
            _ => Arc::new(Archive::create(path, version)?),
        };
        self.vertices.save(&archive, version)?;
        self.edges.save(&archive, version)?;
        self.relations.save(&archive, version)?;
        self.places.save(&archive, version)?;

        let counts = self.counts()?;
        self.metadata.write().counts = counts;
        let fields = vec![
            FieldPayload::json(GRAPH_METADATA_FIELD, &*self.metadata.read())?,
            self.context.tags().payload(),
        ];
        archive.save_payloads(GRAPH_OWNER, fields, version)?;
        *self.archive.write() = Some(Arc::clone(&archive));
        info!(
            graph = %self.metadata.read().name,
            path = %path.display(),
            %version,
            vertices = counts.vertices,
            edges = counts.edges,
            relations = counts.relations,
            places = counts.places,
            "graph.save"
        );
        Ok(archive)
    }
}
