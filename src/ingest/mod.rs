//! OSM ingestion.
//!
//! A [`GraphLoader`] reads an [`OsmSource`] in a node phase, a way phase and
//! a relation phase. Node positions are collected first and frozen before
//! any way is processed; ways become edges, optionally clean-cut at a
//! border; vertices are materialized from edge endpoints when the way phase
//! ends; relations are linked into the edges of their member ways last.

pub mod border;
pub mod chunker;
pub mod driver;
pub mod edges;
pub mod extract;
pub mod filter;
pub mod locations;
pub mod options;
pub mod pbf;
pub mod relations;
pub mod source;
pub mod stats;
pub mod vertices;

mod loader;

pub use border::{Border, Containment, PolygonBorder, RegionClassifier};
pub use chunker::{clean_cut, single_chunk, Chunk, SyntheticIds, WayNode, SYNTHETIC_BASE};
pub use driver::{PassHandler, Phase, PhaseDriver, Progress};
pub use filter::{RelationFilter, WayFilter};
pub use loader::{GraphLoader, WAY_PLACE_BASE};
pub use locations::NodeLocationMap;
pub use options::{ConfigError, LoaderConfig, LoaderOptions, NodeLocationPolicy};
pub use pbf::PbfSource;
pub use source::{
    ElementInfo, MemorySource, OsmElement, OsmNode, OsmRelation, OsmSource, OsmWay,
    StreamMetadata,
};
pub use stats::{IngestStatistics, KindStatistics};
