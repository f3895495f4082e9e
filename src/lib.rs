//! Road network graphs built from OpenStreetMap extracts.
//!
//! Elements live in per-kind columnar stores ([`storage::ElementStore`])
//! whose attribute columns load lazily from a single-file archive. The
//! [`ingest`] pipeline turns an OSM PBF stream into a committed [`Graph`].

#![warn(missing_docs)]

pub mod graph;
pub mod ingest;
pub mod primitives;
pub mod storage;
pub mod types;

pub use graph::{Graph, GraphCounts, GraphMetadata};
pub use ingest::{GraphLoader, IngestStatistics, LoaderConfig, LoaderOptions, MemorySource, PbfSource};
pub use storage::{Archive, ArchiveVersion, ElementStore, GraphContext, StoreOptions};
pub use types::{ElementIndex, Identifier, Location, Rectangle, Result, RoadGraphError};
