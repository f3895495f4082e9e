//! The phase state machine that drives one pass over an element stream.

use std::fmt;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use super::source::{OsmElement, OsmNode, OsmRelation, OsmWay};
use crate::types::{Result, RoadGraphError};

const PROGRESS_EVERY: u64 = 50_000;

/// Stream phase. Phases only move forward.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Phase {
    /// Reading nodes.
    Nodes,
    /// Reading ways; node positions are final.
    Ways,
    /// Reading relations; edges and vertices are final.
    Relations,
    /// All barriers passed.
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Nodes => "nodes",
            Phase::Ways => "ways",
            Phase::Relations => "relations",
            Phase::Done => "done",
        })
    }
}

/// Callbacks of one pass. The end-of-phase barriers run exactly once, in
/// order, even when a phase has no elements.
pub trait PassHandler {
    /// One node.
    fn on_node(&mut self, node: OsmNode) -> Result<()>;
    /// Barrier after the last node.
    fn on_end_nodes(&mut self) -> Result<()>;
    /// One way.
    fn on_way(&mut self, way: OsmWay) -> Result<()>;
    /// Barrier after the last way.
    fn on_end_ways(&mut self) -> Result<()>;
    /// One relation.
    fn on_relation(&mut self, relation: OsmRelation) -> Result<()>;
    /// Barrier after the last relation.
    fn on_end_relations(&mut self) -> Result<()>;
}

/// Optional stderr spinner.
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    /// A spinner labelled `label`, or a silent handle when `enabled` is false.
    pub fn new(enabled: bool, label: &str) -> Self {
        let bar = enabled.then(|| {
            let style = ProgressStyle::with_template("{prefix} {spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
            let bar = ProgressBar::new_spinner();
            bar.set_style(style);
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        Self { bar }
    }

    /// Updates the message.
    pub fn message(&self, message: impl Into<String>) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.into());
        }
    }

    /// Clears the spinner.
    pub fn finish(self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Routes elements to a [`PassHandler`] and fires the barriers on phase
/// changes. An element of an earlier phase is an input error.
pub struct PhaseDriver<'a, H: PassHandler> {
    handler: &'a mut H,
    phase: Phase,
    elements: u64,
    progress: &'a Progress,
}

impl<'a, H: PassHandler> PhaseDriver<'a, H> {
    /// A driver in the node phase.
    pub fn new(handler: &'a mut H, progress: &'a Progress) -> Self {
        Self {
            handler,
            phase: Phase::Nodes,
            elements: 0,
            progress,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Elements fed so far.
    pub fn elements(&self) -> u64 {
        self.elements
    }

    fn advance(&mut self, target: Phase) -> Result<()> {
        if target < self.phase {
            return Err(RoadGraphError::Input(format!(
                "{target} element during the {} phase",
                self.phase
            )));
        }
        while self.phase < target {
            match self.phase {
                Phase::Nodes => self.handler.on_end_nodes()?,
                Phase::Ways => self.handler.on_end_ways()?,
                Phase::Relations => self.handler.on_end_relations()?,
                Phase::Done => break,
            }
            self.phase = match self.phase {
                Phase::Nodes => Phase::Ways,
                Phase::Ways => Phase::Relations,
                Phase::Relations | Phase::Done => Phase::Done,
            };
            debug!(phase = %self.phase, elements = self.elements, "ingest.phase");
            self.progress.message(format!("{} ({} elements)", self.phase, self.elements));
        }
        Ok(())
    }

    /// Routes one element.
    pub fn feed(&mut self, element: OsmElement) -> Result<()> {
        self.elements += 1;
        if self.elements % PROGRESS_EVERY == 0 {
            self.progress.message(format!("{} ({} elements)", self.phase, self.elements));
        }
        match element {
            OsmElement::Node(node) => {
                self.advance(Phase::Nodes)?;
                self.handler.on_node(node)
            }
            OsmElement::Way(way) => {
                self.advance(Phase::Ways)?;
                self.handler.on_way(way)
            }
            OsmElement::Relation(relation) => {
                self.advance(Phase::Relations)?;
                self.handler.on_relation(relation)
            }
        }
    }

    /// Passes every remaining barrier.
    pub fn finish(mut self) -> Result<u64> {
        self.advance(Phase::Done)?;
        Ok(self.elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::source::{ElementInfo, OsmNode, OsmWay};
    use crate::types::Location;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl PassHandler for Recorder {
        fn on_node(&mut self, node: OsmNode) -> Result<()> {
            self.events.push(format!("node {}", node.id));
            Ok(())
        }
        fn on_end_nodes(&mut self) -> Result<()> {
            self.events.push("end nodes".into());
            Ok(())
        }
        fn on_way(&mut self, way: OsmWay) -> Result<()> {
            self.events.push(format!("way {}", way.id));
            Ok(())
        }
        fn on_end_ways(&mut self) -> Result<()> {
            self.events.push("end ways".into());
            Ok(())
        }
        fn on_relation(&mut self, relation: OsmRelation) -> Result<()> {
            self.events.push(format!("relation {}", relation.id));
            Ok(())
        }
        fn on_end_relations(&mut self) -> Result<()> {
            self.events.push("end relations".into());
            Ok(())
        }
    }

    fn node(id: i64) -> OsmElement {
        OsmElement::Node(OsmNode {
            id,
            location: Location::degrees(0.0, 0.0),
            tags: Vec::new(),
            info: ElementInfo::default(),
        })
    }

    fn way(id: i64) -> OsmElement {
        OsmElement::Way(OsmWay {
            id,
            refs: vec![1, 2],
            locations: Vec::new(),
            tags: Vec::new(),
            info: ElementInfo::default(),
        })
    }

    #[test]
    fn barriers_fire_once_in_order() {
        let mut recorder = Recorder::default();
        let progress = Progress::new(false, "test");
        let mut driver = PhaseDriver::new(&mut recorder, &progress);
        driver.feed(node(1)).unwrap();
        driver.feed(way(10)).unwrap();
        driver.feed(way(11)).unwrap();
        assert_eq!(driver.phase(), Phase::Ways);
        assert_eq!(driver.finish().unwrap(), 3);
        assert_eq!(
            recorder.events,
            vec!["node 1", "end nodes", "way 10", "way 11", "end ways", "end relations"]
        );
    }

    #[test]
    fn empty_stream_still_passes_every_barrier() {
        let mut recorder = Recorder::default();
        let progress = Progress::new(false, "test");
        PhaseDriver::new(&mut recorder, &progress).finish().unwrap();
        assert_eq!(recorder.events, vec!["end nodes", "end ways", "end relations"]);
    }

    #[test]
    fn node_after_ways_is_an_input_error() {
        let mut recorder = Recorder::default();
        let progress = Progress::new(false, "test");
        let mut driver = PhaseDriver::new(&mut recorder, &progress);
        driver.feed(way(10)).unwrap();
        assert!(matches!(driver.feed(node(1)), Err(RoadGraphError::Input(_))));
    }
}
