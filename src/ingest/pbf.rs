//! OSM PBF input through the `osmpbf` crate.

use std::path::{Path, PathBuf};

use osmpbf::{BlobDecode, BlobReader, Element, ElementReader, RelMemberType};
use tracing::debug;

use super::source::{ElementInfo, OsmElement, OsmNode, OsmRelation, OsmSource, OsmWay, StreamMetadata};
use crate::storage::kinds::{Member, MemberKind};
use crate::storage::Tag;
use crate::types::{Identifier, Location, Rectangle, Result, RoadGraphError};

/// A PBF file read from disk. Every pass reopens the file.
#[derive(Clone, Debug)]
pub struct PbfSource {
    path: PathBuf,
}

impl PbfSource {
    /// Source over the file at `path`. The file is not opened yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn input_error(err: osmpbf::Error) -> RoadGraphError {
    RoadGraphError::Input(err.to_string())
}

impl OsmSource for PbfSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn metadata(&mut self) -> Result<Option<StreamMetadata>> {
        let mut reader = BlobReader::from_path(&self.path).map_err(input_error)?;
        let Some(blob) = reader.next() else {
            return Ok(None);
        };
        let blob = blob.map_err(input_error)?;
        match blob.decode().map_err(input_error)? {
            BlobDecode::OsmHeader(header) => {
                let bounds = header.bbox().map(|bbox| {
                    Rectangle::from_corners(
                        Location::degrees(bbox.bottom, bbox.left),
                        Location::degrees(bbox.top, bbox.right),
                    )
                });
                let metadata = StreamMetadata {
                    required_features: header.required_features().to_vec(),
                    optional_features: header.optional_features().to_vec(),
                    bounds,
                };
                debug!(
                    path = %self.path.display(),
                    locations_on_ways = metadata.locations_on_ways(),
                    "pbf.header"
                );
                Ok(Some(metadata))
            }
            _ => Ok(None),
        }
    }

    fn stream(&mut self, visit: &mut dyn FnMut(OsmElement) -> Result<()>) -> Result<()> {
        let reader = ElementReader::from_path(&self.path).map_err(input_error)?;
        let mut failure: Option<RoadGraphError> = None;
        reader
            .for_each(|element| {
                if failure.is_some() {
                    return;
                }
                if let Err(err) = convert(element).and_then(|element| visit(element)) {
                    failure = Some(err);
                }
            })
            .map_err(input_error)?;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn collect_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> Vec<Tag> {
    tags.map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn info_of(info: &osmpbf::Info<'_>) -> ElementInfo {
    ElementInfo {
        version: info.version().and_then(|version| u32::try_from(version).ok()),
        changeset: info.changeset(),
        uid: info.uid().map(i64::from),
        user: info
            .user()
            .and_then(|user| user.ok())
            .map(str::to_string),
        timestamp_ms: info.milli_timestamp(),
    }
}

fn convert(element: Element<'_>) -> Result<OsmElement> {
    Ok(match element {
        Element::Node(node) => OsmElement::Node(OsmNode {
            id: node.id(),
            location: Location::dm7(node.decimicro_lat(), node.decimicro_lon()),
            tags: collect_tags(node.tags()),
            info: info_of(&node.info()),
        }),
        Element::DenseNode(node) => OsmElement::Node(OsmNode {
            id: node.id(),
            location: Location::dm7(node.decimicro_lat(), node.decimicro_lon()),
            tags: collect_tags(node.tags()),
            info: node
                .info()
                .map(|info| ElementInfo {
                    version: u32::try_from(info.version()).ok(),
                    changeset: Some(info.changeset()),
                    uid: Some(i64::from(info.uid())),
                    user: info.user().ok().map(str::to_string),
                    timestamp_ms: Some(info.milli_timestamp()),
                })
                .unwrap_or_default(),
        }),
        Element::Way(way) => OsmElement::Way(OsmWay {
            id: way.id(),
            refs: way.refs().collect(),
            locations: way
                .node_locations()
                .map(|location| Location::dm7(location.decimicro_lat(), location.decimicro_lon()))
                .collect(),
            tags: collect_tags(way.tags()),
            info: info_of(&way.info()),
        }),
        Element::Relation(relation) => {
            let mut members = Vec::new();
            for member in relation.members() {
                let role = member.role().map_err(input_error)?;
                members.push(Member {
                    identifier: Identifier(member.member_id),
                    kind: match member.member_type {
                        RelMemberType::Node => MemberKind::Node,
                        RelMemberType::Way => MemberKind::Way,
                        RelMemberType::Relation => MemberKind::Relation,
                    },
                    role: role.to_string(),
                });
            }
            OsmElement::Relation(OsmRelation {
                id: relation.id(),
                members,
                tags: collect_tags(relation.tags()),
                info: info_of(&relation.info()),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_an_input_error() {
        let dir = tempdir().unwrap();
        let mut source = PbfSource::new(dir.path().join("absent.osm.pbf"));
        assert!(matches!(source.metadata(), Err(RoadGraphError::Input(_))));
        let mut visited = 0;
        let outcome = source.stream(&mut |_| {
            visited += 1;
            Ok(())
        });
        assert!(matches!(outcome, Err(RoadGraphError::Input(_))));
        assert_eq!(visited, 0);
    }

    #[test]
    fn describe_names_the_file() {
        let source = PbfSource::new("/data/city.osm.pbf");
        assert_eq!(source.describe(), "/data/city.osm.pbf");
    }
}
