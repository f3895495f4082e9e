//! Columnar element storage.
//!
//! Implements per-kind element stores built from lazily loaded attribute
//! columns, the identifier index that maps element identifiers to dense
//! indices, and the single-file archive the columns persist into.

/// Single-file column archive.
///
/// Fields are keyed by `(owner, field)` and can be loaded one at a time.
pub mod archive;

/// Versioned column encodings.
pub mod codec;

/// The four element kinds and their columns.
pub mod kinds;

mod batch;
mod column;
mod context;
mod element;
mod identifier_index;
mod metrics;
mod options;
mod store;
mod tags;
mod validate;

/// Archive types.
pub use archive::{Archive, ArchiveOwner, ArchiveVersion, ArchivedField, FieldPayload};

/// Producer handles.
pub use batch::{Adder, BatchAdder};

/// Column encodings.
pub use codec::{ColumnCodec, ColumnKind, Coded, Shape};

/// Attribute columns.
pub use column::{AttributeColumn, Column, ColumnSet};

/// Shared graph services.
pub use context::GraphContext;

/// Element model.
pub use element::{
    tag_value, validate_common, CommonAttributes, CommonColumns, ElementKind, Rejection,
};

/// Identifier to index mapping.
pub use identifier_index::{IdentifierIndex, IndexMode};

/// Metrics.
pub use metrics::{default_metrics, CounterMetrics, KindCounters, NoopMetrics, StoreMetrics};

/// Store configuration.
pub use options::StoreOptions;

/// The generic element store.
pub use store::{ElementStore, Indices, StoreMetadata, STORE_METADATA_FIELD};

/// Tag dictionary.
pub use tags::{Tag, TagCodec, TagCodecMetricsSnapshot, TagList, TAG_STRINGS_FIELD};

/// Validation reports.
pub use validate::{Finding, Severity, ValidationCounts, ValidationReport};
