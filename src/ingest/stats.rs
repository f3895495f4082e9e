//! Per-run ingestion counters.

use serde::{Deserialize, Serialize};

/// Outcome counters for one input element kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStatistics {
    /// Elements read.
    pub seen: u64,
    /// Elements that produced stored output.
    pub accepted: u64,
    /// Elements rejected as invalid.
    pub discarded: u64,
    /// Elements skipped by a filter or the load bounds.
    pub filtered_out: u64,
}

impl KindStatistics {
    /// Every seen element was accepted, discarded or filtered out exactly once.
    pub fn is_conserved(&self) -> bool {
        self.accepted + self.discarded + self.filtered_out == self.seen
    }

    pub(crate) fn accept(&mut self) {
        self.accepted += 1;
    }

    pub(crate) fn discard(&mut self) {
        self.discarded += 1;
    }

    pub(crate) fn filter_out(&mut self) {
        self.filtered_out += 1;
    }
}

/// Counters of one ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatistics {
    /// Input nodes.
    pub nodes: KindStatistics,
    /// Input ways.
    pub ways: KindStatistics,
    /// Input relations.
    pub relations: KindStatistics,
    /// Node positions kept for way geometry.
    pub node_locations: u64,
    /// Places stored from nodes and ways.
    pub places: u64,
    /// Edges stored.
    pub edges: u64,
    /// Edges rejected by the edge store.
    pub edges_discarded: u64,
    /// Vertices stored.
    pub vertices: u64,
    /// Border nodes created by clean-cutting.
    pub synthetic_nodes: u64,
    /// Ways split into more than one chunk at the cut border.
    pub ways_cut: u64,
    /// Relation-to-edge links written.
    pub relation_links: u64,
    /// Relation members naming a way without edges.
    pub dangling_members: u64,
}

impl IngestStatistics {
    /// Conservation holds for nodes, ways and relations.
    pub fn is_conserved(&self) -> bool {
        self.nodes.is_conserved() && self.ways.is_conserved() && self.relations.is_conserved()
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let kind = |label: &str, stats: &KindStatistics| {
            format!(
                "{label} {}/{} accepted, {} discarded, {} filtered",
                stats.accepted, stats.seen, stats.discarded, stats.filtered_out
            )
        };
        format!(
            "{}; {}; {}; {} edges, {} vertices, {} places, {} synthetic nodes, {} dangling members",
            kind("nodes", &self.nodes),
            kind("ways", &self.ways),
            kind("relations", &self.relations),
            self.edges,
            self.vertices,
            self.places,
            self.synthetic_nodes,
            self.dangling_members,
        )
    }
}
