//! Way chunking: splitting a way's node sequence at a cut border.

use std::sync::atomic::{AtomicI64, Ordering};

use tracing::trace;

use super::border::{Border, Containment};
use crate::types::{Identifier, Location};

/// One node of a way with its resolved position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WayNode {
    /// OSM node id, or a synthetic id.
    pub identifier: Identifier,
    /// Position.
    pub location: Location,
    /// Whether the node was created at a border crossing.
    pub synthetic: bool,
}

impl WayNode {
    /// A real input node.
    pub fn new(identifier: impl Into<Identifier>, location: Location) -> Self {
        Self {
            identifier: identifier.into(),
            location,
            synthetic: false,
        }
    }
}

/// A run of consecutive way nodes on one side of the cut border.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// Nodes, at least two.
    pub nodes: Vec<WayNode>,
    /// Whether the first node lies on the border.
    pub from_clipped: bool,
    /// Whether the last node lies on the border.
    pub to_clipped: bool,
    /// Side of the chunk; `OnBorder` when every node lies on the border.
    pub side: Containment,
}

/// First synthetic identifier, far above any OSM node id.
pub const SYNTHETIC_BASE: i64 = 1 << 60;

/// Issues identifiers for synthetic border nodes.
#[derive(Debug)]
pub struct SyntheticIds {
    start: i64,
    next: AtomicI64,
}

impl Default for SyntheticIds {
    fn default() -> Self {
        Self::starting_at(SYNTHETIC_BASE)
    }
}

impl SyntheticIds {
    /// Identifiers starting at [`SYNTHETIC_BASE`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers starting at `start`.
    pub fn starting_at(start: i64) -> Self {
        Self {
            start,
            next: AtomicI64::new(start),
        }
    }

    /// Next unused identifier.
    pub fn next(&self) -> Identifier {
        Identifier(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Identifiers handed out so far.
    pub fn issued(&self) -> u64 {
        (self.next.load(Ordering::Relaxed) - self.start) as u64
    }

    /// Whether `identifier` lies in the synthetic range.
    pub fn is_synthetic(identifier: Identifier) -> bool {
        identifier.0 >= SYNTHETIC_BASE
    }
}

/// The whole way as one chunk with no border flags.
pub fn single_chunk(nodes: Vec<WayNode>) -> Chunk {
    Chunk {
        nodes,
        from_clipped: false,
        to_clipped: false,
        side: Containment::Inside,
    }
}

struct Builder {
    chunks: Vec<Chunk>,
    nodes: Vec<WayNode>,
    from_clipped: bool,
    side: Option<Containment>,
}

impl Builder {
    fn close(&mut self, to_clipped: bool, restart: Vec<WayNode>) {
        let nodes = std::mem::replace(&mut self.nodes, restart);
        if nodes.len() >= 2 {
            self.chunks.push(Chunk {
                nodes,
                from_clipped: self.from_clipped,
                to_clipped,
                side: self.side.unwrap_or(Containment::OnBorder),
            });
        }
        self.from_clipped = true;
        self.side = None;
    }
}

/// Splits `nodes` wherever the way crosses `border`.
///
/// An inside/outside flip between two nodes inserts a synthetic node at the
/// crossing that ends one chunk and starts the next. Nodes already on the
/// border are kept and split the way when the side differs before and after
/// them. Chunk endpoints on the border are flagged clipped.
pub fn clean_cut(nodes: &[WayNode], border: &dyn Border, ids: &SyntheticIds) -> Vec<Chunk> {
    let Some(first) = nodes.first() else {
        return Vec::new();
    };
    let states: Vec<Containment> = nodes
        .iter()
        .map(|node| border.containment(node.location))
        .collect();
    let mut builder = Builder {
        chunks: Vec::new(),
        nodes: vec![*first],
        from_clipped: states[0] == Containment::OnBorder,
        side: (states[0] != Containment::OnBorder).then_some(states[0]),
    };

    for position in 1..nodes.len() {
        let previous = nodes[position - 1];
        let node = nodes[position];
        match (states[position - 1], states[position]) {
            (Containment::Inside, Containment::Outside)
            | (Containment::Outside, Containment::Inside) => {
                match border.intersection(previous.location, node.location) {
                    Some(point) if point != previous.location && point != node.location => {
                        let synthetic = WayNode {
                            identifier: ids.next(),
                            location: point,
                            synthetic: true,
                        };
                        trace!(
                            from = %previous.identifier,
                            to = %node.identifier,
                            synthetic = %synthetic.identifier,
                            "chunker.crossing"
                        );
                        builder.nodes.push(synthetic);
                        builder.close(true, vec![synthetic, node]);
                    }
                    _ => builder.nodes.push(node),
                }
                builder.side = Some(states[position]);
            }
            (Containment::OnBorder, side) if side != Containment::OnBorder => {
                if builder.side.is_some_and(|current| current != side) {
                    builder.close(true, vec![previous, node]);
                } else {
                    builder.nodes.push(node);
                }
                builder.side = Some(side);
            }
            (_, state) => {
                builder.nodes.push(node);
                if builder.side.is_none() && state != Containment::OnBorder {
                    builder.side = Some(state);
                }
            }
        }
    }

    let to_clipped = states.last() == Some(&Containment::OnBorder);
    builder.close(to_clipped, Vec::new());
    builder.chunks
}
