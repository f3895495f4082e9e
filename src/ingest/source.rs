//! Element streams consumed by the loader.

use crate::storage::kinds::Member;
use crate::storage::{CommonAttributes, Tag};
use crate::types::{Location, Rectangle, Result};

/// Optional OSM metadata attached to an element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementInfo {
    /// Object version.
    pub version: Option<u32>,
    /// Changeset that last touched the object.
    pub changeset: Option<i64>,
    /// Id of the last editor.
    pub uid: Option<i64>,
    /// Name of the last editor.
    pub user: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: Option<i64>,
}

impl ElementInfo {
    /// Copies the metadata into `common`.
    pub fn apply(&self, mut common: CommonAttributes) -> CommonAttributes {
        common.revision = self.version;
        common.change_set = self.changeset;
        common.editor_user_id = self.uid;
        common.editor_user_name = self.user.clone();
        common.last_modified = self.timestamp_ms;
        common
    }
}

/// A node as read from the input.
#[derive(Clone, Debug, PartialEq)]
pub struct OsmNode {
    /// OSM node id.
    pub id: i64,
    /// Position.
    pub location: Location,
    /// Tags in source order.
    pub tags: Vec<Tag>,
    /// Metadata.
    pub info: ElementInfo,
}

/// A way as read from the input.
#[derive(Clone, Debug, PartialEq)]
pub struct OsmWay {
    /// OSM way id.
    pub id: i64,
    /// Node references in order.
    pub refs: Vec<i64>,
    /// Embedded node positions; empty unless the stream carries
    /// `LocationsOnWays`.
    pub locations: Vec<Location>,
    /// Tags in source order.
    pub tags: Vec<Tag>,
    /// Metadata.
    pub info: ElementInfo,
}

/// A relation as read from the input.
#[derive(Clone, Debug, PartialEq)]
pub struct OsmRelation {
    /// OSM relation id.
    pub id: i64,
    /// Members in order.
    pub members: Vec<Member>,
    /// Tags in source order.
    pub tags: Vec<Tag>,
    /// Metadata.
    pub info: ElementInfo,
}

/// One element of the input stream.
#[derive(Clone, Debug, PartialEq)]
pub enum OsmElement {
    /// A node.
    Node(OsmNode),
    /// A way.
    Way(OsmWay),
    /// A relation.
    Relation(OsmRelation),
}

impl OsmElement {
    /// OSM id of the element.
    pub fn id(&self) -> i64 {
        match self {
            OsmElement::Node(node) => node.id,
            OsmElement::Way(way) => way.id,
            OsmElement::Relation(relation) => relation.id,
        }
    }
}

/// Header block of an input stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamMetadata {
    /// Features a reader must support.
    pub required_features: Vec<String>,
    /// Features a reader may use.
    pub optional_features: Vec<String>,
    /// Declared extent of the data.
    pub bounds: Option<Rectangle>,
}

impl StreamMetadata {
    /// Whether ways carry their node positions inline.
    pub fn locations_on_ways(&self) -> bool {
        self.required_features
            .iter()
            .chain(&self.optional_features)
            .any(|feature| feature == "LocationsOnWays")
    }
}

/// A re-readable stream of OSM elements in node, way, relation order.
pub trait OsmSource: Send {
    /// Short description for logs and graph metadata.
    fn describe(&self) -> String;

    /// Reads the header block. `None` when the stream has none.
    fn metadata(&mut self) -> Result<Option<StreamMetadata>>;

    /// Runs one full pass over the elements. Each call starts over.
    fn stream(&mut self, visit: &mut dyn FnMut(OsmElement) -> Result<()>) -> Result<()>;
}

/// Builds a tag list from string pairs.
pub fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect()
}

/// An in-memory source, mostly for tests and small fixtures.
#[derive(Clone, Debug)]
pub struct MemorySource {
    name: String,
    metadata: Option<StreamMetadata>,
    elements: Vec<OsmElement>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemorySource {
    /// An empty source with a default header.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Some(StreamMetadata::default()),
            elements: Vec::new(),
        }
    }

    /// Replaces the header; `None` simulates a stream without one.
    pub fn with_metadata(mut self, metadata: Option<StreamMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Appends a node.
    pub fn node(mut self, id: i64, latitude: f64, longitude: f64, tags: Vec<Tag>) -> Self {
        self.elements.push(OsmElement::Node(OsmNode {
            id,
            location: Location::degrees(latitude, longitude),
            tags,
            info: ElementInfo::default(),
        }));
        self
    }

    /// Appends a way without embedded locations.
    pub fn way(mut self, id: i64, refs: &[i64], tags: Vec<Tag>) -> Self {
        self.elements.push(OsmElement::Way(OsmWay {
            id,
            refs: refs.to_vec(),
            locations: Vec::new(),
            tags,
            info: ElementInfo::default(),
        }));
        self
    }

    /// Appends a relation.
    pub fn relation(mut self, id: i64, members: Vec<Member>, tags: Vec<Tag>) -> Self {
        self.elements.push(OsmElement::Relation(OsmRelation {
            id,
            members,
            tags,
            info: ElementInfo::default(),
        }));
        self
    }

    /// Appends any element.
    pub fn push(mut self, element: OsmElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the source holds no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl OsmSource for MemorySource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn metadata(&mut self) -> Result<Option<StreamMetadata>> {
        Ok(self.metadata.clone())
    }

    fn stream(&mut self, visit: &mut dyn FnMut(OsmElement) -> Result<()>) -> Result<()> {
        for element in &self.elements {
            visit(element.clone())?;
        }
        Ok(())
    }
}
