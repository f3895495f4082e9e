//! Vertices materialized from the endpoints of stored edges.

use rustc_hash::FxHashMap;
use tracing::info;

use super::chunker::WayNode;
use crate::storage::kinds::{Edge, Vertex, VertexSpec};
use crate::storage::{CommonAttributes, ElementStore};
use crate::types::{ElementIndex, Location, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct VertexDraft {
    location: Location,
    clipped: bool,
    grade_separation: u8,
    synthetic: bool,
}

/// Endpoints of the edges stored so far, merged per node.
#[derive(Debug, Default)]
pub struct EndpointCollector {
    drafts: FxHashMap<i64, VertexDraft>,
}

impl EndpointCollector {
    /// No endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one edge endpoint. A node is clipped when any edge ends on
    /// the border there and sits on the highest level any edge gives it.
    pub fn record(&mut self, node: &WayNode, clipped: bool, grade_separation: u8) {
        self.drafts
            .entry(node.identifier.0)
            .and_modify(|draft| {
                draft.clipped |= clipped;
                draft.grade_separation = draft.grade_separation.max(grade_separation);
            })
            .or_insert(VertexDraft {
                location: node.location,
                clipped,
                grade_separation,
                synthetic: node.synthetic,
            });
    }

    /// Distinct endpoint nodes.
    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    /// True when no endpoint was recorded.
    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// Adds one vertex per endpoint in node id order. Returns the number
    /// stored.
    pub fn materialize(self, vertices: &ElementStore<Vertex>) -> u64 {
        let mut drafts: Vec<(i64, VertexDraft)> = self.drafts.into_iter().collect();
        drafts.sort_unstable_by_key(|(id, _)| *id);
        let mut stored = 0;
        for (id, draft) in drafts {
            let spec = VertexSpec {
                common: CommonAttributes::new(id),
                location: draft.location,
                clipped: draft.clipped,
                grade_separation: draft.grade_separation,
                synthetic: draft.synthetic,
            };
            if vertices.add(spec) {
                stored += 1;
            }
        }
        info!(vertices = stored, "ingest.vertices");
        stored
    }
}

/// Writes the vertex index of both endpoints into every edge. Endpoints
/// without a vertex keep [`ElementIndex::NONE`]. Returns the edges updated.
pub fn resolve_edge_vertices(edges: &ElementStore<Edge>, vertices: &ElementStore<Vertex>) -> Result<u64> {
    edges.post_commit(|store| {
        let indices: Vec<ElementIndex> = store.indices().collect();
        let columns = store.kind_columns();
        for index in &indices {
            let from = columns.from_node.get(*index)?;
            let to = columns.to_node.get(*index)?;
            store.set_vertices(
                *index,
                vertices.retrieve_index(from).unwrap_or(ElementIndex::NONE),
                vertices.retrieve_index(to).unwrap_or(ElementIndex::NONE),
            )?;
        }
        Ok(indices.len() as u64)
    })
}
