#![forbid(unsafe_code)]

use crate::storage::column::{AttributeColumn, Column, ColumnSet};
use crate::storage::element::{validate_common, CommonAttributes, ElementKind, Rejection};
use crate::storage::store::ElementStore;
use crate::types::{ElementIndex, ElementKindTag, Location, Result};

/// Road junctions and way endpoints.
#[derive(Debug)]
pub enum Vertex {}

/// A vertex before it is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexSpec {
    /// Common attributes; the identifier is the OSM node id or a synthetic id.
    pub common: CommonAttributes,
    /// Position.
    pub location: Location,
    /// Whether the vertex lies on a cut border.
    pub clipped: bool,
    /// Vertical level (bridge/tunnel layers meet at different levels).
    pub grade_separation: u8,
    /// Whether the vertex was created by clean-cutting.
    pub synthetic: bool,
}

impl VertexSpec {
    /// An unclipped, level-zero vertex.
    pub fn new(common: CommonAttributes, location: Location) -> Self {
        Self {
            common,
            location,
            clipped: false,
            grade_separation: 0,
            synthetic: false,
        }
    }
}

/// A stored vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexRecord {
    /// Dense index.
    pub index: ElementIndex,
    /// Common attributes.
    pub common: CommonAttributes,
    /// Position.
    pub location: Location,
    /// Whether the vertex lies on a cut border.
    pub clipped: bool,
    /// Vertical level.
    pub grade_separation: u8,
    /// Whether the vertex was created by clean-cutting.
    pub synthetic: bool,
}

/// Vertex-specific columns.
pub struct VertexColumns {
    /// Position.
    pub location: AttributeColumn<Location>,
    /// Border flag.
    pub clipped: AttributeColumn<bool>,
    /// Vertical level.
    pub grade_separation: AttributeColumn<u8>,
    /// Synthetic flag.
    pub synthetic: AttributeColumn<bool>,
}

impl ColumnSet for VertexColumns {
    fn columns(&self) -> Vec<&dyn Column> {
        vec![
            &self.location,
            &self.clipped,
            &self.grade_separation,
            &self.synthetic,
        ]
    }
}

impl ElementKind for Vertex {
    const TAG: ElementKindTag = ElementKindTag::Vertex;
    type Spec = VertexSpec;
    type Record = VertexRecord;
    type Columns = VertexColumns;

    fn columns(owner: &str, estimate: usize) -> VertexColumns {
        VertexColumns {
            location: AttributeColumn::new(owner, "location", estimate),
            clipped: AttributeColumn::new(owner, "clipped", 0),
            grade_separation: AttributeColumn::new(owner, "grade_separation", 0),
            synthetic: AttributeColumn::new(owner, "synthetic", 0),
        }
    }

    fn common(spec: &VertexSpec) -> &CommonAttributes {
        &spec.common
    }

    fn validate(spec: &VertexSpec) -> std::result::Result<(), Rejection> {
        validate_common(&spec.common)?;
        if spec.common.identifier.is_reverse() {
            return Err(Rejection("negative vertex identifier"));
        }
        if !spec.location.is_valid() {
            return Err(Rejection("vertex location out of range"));
        }
        Ok(())
    }

    fn write(columns: &VertexColumns, index: ElementIndex, spec: &VertexSpec) -> Result<()> {
        columns.location.set(index, spec.location)?;
        if spec.clipped {
            columns.clipped.set(index, true)?;
        }
        if spec.grade_separation != 0 {
            columns.grade_separation.set(index, spec.grade_separation)?;
        }
        if spec.synthetic {
            columns.synthetic.set(index, true)?;
        }
        Ok(())
    }

    fn read(
        columns: &VertexColumns,
        index: ElementIndex,
        common: CommonAttributes,
    ) -> Result<VertexRecord> {
        Ok(VertexRecord {
            index,
            common,
            location: columns.location.get(index)?,
            clipped: columns.clipped.get(index)?,
            grade_separation: columns.grade_separation.get(index)?,
            synthetic: columns.synthetic.get(index)?,
        })
    }
}

impl ElementStore<Vertex> {
    /// Reads the vertex at `index`.
    pub fn vertex(&self, index: ElementIndex) -> Result<VertexRecord> {
        self.record(index)
    }
}
