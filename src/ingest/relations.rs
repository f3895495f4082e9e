//! Linking relations into the edges of their member ways.

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use super::edges::SECTIONS_PER_WAY;
use crate::storage::kinds::{Edge, Member, MemberKind};
use crate::storage::ElementStore;
use crate::types::{ElementIndex, Identifier, Result};

/// Edge identifiers issued per way during the way phase.
#[derive(Debug, Default)]
pub struct RouteIndex {
    way_edges: FxHashMap<i64, u32>,
}

impl RouteIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `way_id` issued edge identifiers `1..=issued`.
    pub fn record(&mut self, way_id: i64, issued: u32) {
        if issued > 0 {
            self.way_edges.insert(way_id, issued);
        }
    }

    /// Ways with at least one edge.
    pub fn len(&self) -> usize {
        self.way_edges.len()
    }

    /// True when no way produced edges.
    pub fn is_empty(&self) -> bool {
        self.way_edges.is_empty()
    }

    /// Edge identifiers of `way_id` in way order; `None` for unknown ways.
    pub fn edges_of(&self, way_id: i64) -> Option<impl Iterator<Item = Identifier>> {
        let issued = *self.way_edges.get(&way_id)?;
        let base = way_id.checked_mul(SECTIONS_PER_WAY)?;
        Some((1..=i64::from(issued)).map(move |n| Identifier(base + n)))
    }
}

/// Relation links gathered during the relation phase and written in one
/// pass once the relation phase ends.
#[derive(Debug, Default)]
pub struct RelationLinker {
    links: Vec<(ElementIndex, Identifier)>,
    dangling: u64,
}

impl RelationLinker {
    /// No pending links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues links from `relation` to every stored edge of its way members.
    /// Returns the number of links queued.
    pub fn collect(
        &mut self,
        routes: &RouteIndex,
        edges: &ElementStore<Edge>,
        relation: Identifier,
        members: &[Member],
    ) -> usize {
        let before = self.links.len();
        for member in members.iter().filter(|member| member.kind == MemberKind::Way) {
            let Some(identifiers) = routes.edges_of(member.identifier.0) else {
                self.dangling += 1;
                debug!(
                    %relation,
                    way = %member.identifier,
                    "ingest.dangling_member"
                );
                continue;
            };
            for identifier in identifiers {
                if let Ok(index) = edges.retrieve_index(identifier) {
                    self.links.push((index, relation));
                }
            }
        }
        self.links.len() - before
    }

    /// Way members that named a way without edges.
    pub fn dangling(&self) -> u64 {
        self.dangling
    }

    /// Links queued so far.
    pub fn pending(&self) -> usize {
        self.links.len()
    }

    /// Writes every queued link, re-opening the committed edge store once.
    pub fn apply(self, edges: &ElementStore<Edge>) -> Result<u64> {
        if self.links.is_empty() {
            return Ok(0);
        }
        let count = self.links.len() as u64;
        edges.post_commit(|store| {
            for (index, relation) in &self.links {
                store.link_relation(*index, *relation)?;
            }
            Ok(())
        })?;
        info!(links = count, dangling = self.dangling, "ingest.relation_links");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kinds::EdgeSpec;
    use crate::storage::{CommonAttributes, GraphContext, StoreOptions};
    use crate::types::Location;

    fn edge(id: i64) -> EdgeSpec {
        EdgeSpec::new(
            CommonAttributes::new(id),
            (Identifier(1), Location::degrees(10.0, 10.0)),
            (Identifier(2), Location::degrees(10.001, 10.0)),
        )
    }

    fn way_member(id: i64) -> Member {
        Member {
            identifier: Identifier(id),
            kind: MemberKind::Way,
            role: String::new(),
        }
    }

    #[test]
    fn links_cover_every_edge_of_a_member_way() -> Result<()> {
        let edges = ElementStore::<Edge>::new("edge-store", GraphContext::new(), StoreOptions::new());
        assert!(edges.add(edge(7_000_001)));
        assert!(edges.add(edge(7_000_002)));
        edges.commit()?;

        let mut routes = RouteIndex::new();
        routes.record(7, 2);
        routes.record(8, 0);
        assert_eq!(routes.len(), 1);

        let mut linker = RelationLinker::new();
        let members = vec![
            way_member(7),
            way_member(8),
            Member {
                identifier: Identifier(5),
                kind: MemberKind::Node,
                role: "stop".into(),
            },
        ];
        assert_eq!(linker.collect(&routes, &edges, Identifier(900), &members), 2);
        assert_eq!(linker.dangling(), 1);
        assert_eq!(linker.apply(&edges)?, 2);

        assert!(edges.is_committed());
        let second = edges.record_of(Identifier(7_000_002))?;
        assert_eq!(second.relations, vec![Identifier(900)]);
        Ok(())
    }
}
