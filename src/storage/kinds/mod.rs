//! The four element kinds.

mod edge;
mod place;
mod relation;
mod vertex;

pub use edge::{
    length_mm, Direction, Edge, EdgeColumns, EdgeRecord, EdgeSpec, RoadState, RoadSubType,
    RoadSurface, RoadType,
};
pub use place::{Place, PlaceColumns, PlaceRecord, PlaceSpec, PlaceType};
pub use relation::{
    Member, MemberKind, Members, Relation, RelationColumns, RelationRecord, RelationSpec,
};
pub use vertex::{Vertex, VertexColumns, VertexRecord, VertexSpec};
