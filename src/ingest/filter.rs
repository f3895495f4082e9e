//! Which ways and relations the loader keeps.

use std::collections::BTreeSet;

use super::extract;
use crate::storage::{tag_value, Tag};

const DEFAULT_HIGHWAYS: &[&str] = &[
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
    "unclassified",
    "road",
    "residential",
    "living_street",
    "service",
    "track",
    "path",
    "footway",
    "cycleway",
    "bridleway",
    "steps",
    "pedestrian",
    "construction",
    "proposed",
];

const DEFAULT_RELATION_TYPES: &[&str] = &["route", "restriction", "multipolygon", "boundary"];

/// Accepted `highway` values; ferries are accepted separately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WayFilter {
    highways: BTreeSet<String>,
    ferries: bool,
}

impl Default for WayFilter {
    fn default() -> Self {
        Self::with_highways(DEFAULT_HIGHWAYS.iter().copied())
    }
}

impl WayFilter {
    /// A filter accepting exactly `highways` plus ferries.
    pub fn with_highways<I, S>(highways: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            highways: highways.into_iter().map(Into::into).collect(),
            ferries: true,
        }
    }

    /// Toggles `route=ferry` ways.
    pub fn ferries(mut self, accept: bool) -> Self {
        self.ferries = accept;
        self
    }

    /// Whether a way with `tags` becomes edges.
    pub fn accepts(&self, tags: &[Tag]) -> bool {
        if tag_value(tags, "area") == Some("yes") {
            return false;
        }
        if tag_value(tags, "route") == Some("ferry") {
            return self.ferries;
        }
        tag_value(tags, "highway").is_some_and(|highway| self.highways.contains(highway))
            && extract::road_type(tags).is_some()
    }
}

/// Accepted relation `type` values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationFilter {
    types: BTreeSet<String>,
}

impl Default for RelationFilter {
    fn default() -> Self {
        Self::with_types(DEFAULT_RELATION_TYPES.iter().copied())
    }
}

impl RelationFilter {
    /// A filter accepting exactly `types`.
    pub fn with_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a relation with `tags` is stored. Administrative boundaries
    /// never are.
    pub fn accepts(&self, tags: &[Tag]) -> bool {
        !extract::is_admin_boundary(tags)
            && tag_value(tags, "type").is_some_and(|kind| self.types.contains(kind))
    }
}
