//! Loader configuration: the builder and its TOML form.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::border::{Border, PolygonBorder, RegionClassifier};
use super::filter::{RelationFilter, WayFilter};
use crate::storage::StoreOptions;
use crate::types::{Location, Rectangle, RoadGraphError};

/// Which node positions the node phase keeps.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeLocationPolicy {
    /// Every node.
    AllNodes,
    /// Nodes referenced by an accepted way; needs the scan pass.
    #[default]
    WayNodes,
}

/// Options of a [`super::GraphLoader`] run.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Graph name.
    pub name: String,
    /// Ways with both endpoints outside are skipped.
    pub bounds: Option<Rectangle>,
    /// Border to clean-cut eligible ways at.
    pub cut_border: Option<Arc<dyn Border>>,
    /// Country classification of edges.
    pub regions: RegionClassifier,
    /// Ways turned into edges.
    pub way_filter: WayFilter,
    /// Relations stored.
    pub relation_filter: RelationFilter,
    /// Upper bound of nodes per edge.
    pub max_section_points: usize,
    /// Split ways at nodes they share with other ways.
    pub section_at_intersections: bool,
    /// Node positions kept for way geometry.
    pub node_locations: NodeLocationPolicy,
    /// Options of the four stores.
    pub store: StoreOptions,
    /// Show a spinner on stderr.
    pub progress: bool,
}

impl std::fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("name", &self.name)
            .field("bounds", &self.bounds)
            .field("cut_border", &self.cut_border.is_some())
            .field("regions", &self.regions)
            .field("max_section_points", &self.max_section_points)
            .field("section_at_intersections", &self.section_at_intersections)
            .field("node_locations", &self.node_locations)
            .field("progress", &self.progress)
            .finish()
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            name: "roadgraph".to_string(),
            bounds: None,
            cut_border: None,
            regions: RegionClassifier::new(),
            way_filter: WayFilter::default(),
            relation_filter: RelationFilter::default(),
            max_section_points: 500,
            section_at_intersections: true,
            node_locations: NodeLocationPolicy::default(),
            store: StoreOptions::default(),
            progress: false,
        }
    }
}

impl LoaderOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the graph name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the load bounds.
    pub fn bounds(mut self, bounds: Rectangle) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Sets the cut border.
    pub fn cut_border(mut self, border: Arc<dyn Border>) -> Self {
        self.cut_border = Some(border);
        self
    }

    /// Sets the region classifier.
    pub fn regions(mut self, regions: RegionClassifier) -> Self {
        self.regions = regions;
        self
    }

    /// Sets the way filter.
    pub fn way_filter(mut self, filter: WayFilter) -> Self {
        self.way_filter = filter;
        self
    }

    /// Sets the relation filter.
    pub fn relation_filter(mut self, filter: RelationFilter) -> Self {
        self.relation_filter = filter;
        self
    }

    /// Sets the node limit per edge; values below 2 act as 2.
    pub fn max_section_points(mut self, points: usize) -> Self {
        self.max_section_points = points;
        self
    }

    /// Toggles splitting at shared nodes.
    pub fn section_at_intersections(mut self, enabled: bool) -> Self {
        self.section_at_intersections = enabled;
        self
    }

    /// Sets the node location policy.
    pub fn node_locations(mut self, policy: NodeLocationPolicy) -> Self {
        self.node_locations = policy;
        self
    }

    /// Sets the store options.
    pub fn store(mut self, store: StoreOptions) -> Self {
        self.store = store;
        self
    }

    /// Toggles the progress spinner.
    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Whether the loader runs the way-node scan pass first.
    pub fn needs_scan(&self) -> bool {
        self.section_at_intersections || self.node_locations == NodeLocationPolicy::WayNodes
    }
}

/// Failures reading or applying a [`LoaderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read loader config {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse loader config: {source}")]
    Parse {
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A ring has fewer than three distinct points.
    #[error("ring of '{name}' needs at least three distinct points")]
    InvalidRing {
        /// Section or region the ring belongs to.
        name: String,
    },
    /// A coordinate lies outside the WGS84 ranges.
    #[error("coordinate {latitude},{longitude} in '{name}' is out of range")]
    InvalidCoordinate {
        /// Section or region the coordinate belongs to.
        name: String,
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },
}

impl From<ConfigError> for RoadGraphError {
    fn from(err: ConfigError) -> Self {
        RoadGraphError::Config(err.to_string())
    }
}

/// Load bounds in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundsSection {
    /// Southern latitude.
    pub south: f64,
    /// Western longitude.
    pub west: f64,
    /// Northern latitude.
    pub north: f64,
    /// Eastern longitude.
    pub east: f64,
}

/// A polygon ring as `[latitude, longitude]` pairs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RingSection {
    /// Ring points.
    pub ring: Vec<[f64; 2]>,
}

/// A country region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionSection {
    /// ISO country code.
    pub code: String,
    /// Ring points as `[latitude, longitude]`.
    pub ring: Vec<[f64; 2]>,
}

/// Serialized loader settings.
///
/// ```toml
/// name = "berlin"
/// max_section_points = 200
/// node_locations = "way-nodes"
///
/// [bounds]
/// south = 52.3
/// west = 13.0
/// north = 52.7
/// east = 13.8
///
/// [[regions]]
/// code = "DE"
/// ring = [[52.3, 13.0], [52.3, 13.8], [52.7, 13.8], [52.7, 13.0]]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Graph name.
    pub name: Option<String>,
    /// Load bounds.
    pub bounds: Option<BoundsSection>,
    /// Cut border.
    pub cut: Option<RingSection>,
    /// Country regions, first match wins.
    pub regions: Vec<RegionSection>,
    /// Accepted highway values; the defaults when absent.
    pub highways: Option<Vec<String>>,
    /// Whether ferries become edges.
    pub ferries: Option<bool>,
    /// Accepted relation types; the defaults when absent.
    pub relation_types: Option<Vec<String>>,
    /// Node limit per edge.
    pub max_section_points: Option<usize>,
    /// Split ways at shared nodes.
    pub section_at_intersections: Option<bool>,
    /// Node location policy.
    pub node_locations: Option<NodeLocationPolicy>,
    /// Expected elements per store.
    pub estimate: Option<usize>,
    /// Queued batch adders.
    pub batching: Option<bool>,
    /// Batch queue capacity.
    pub queue_capacity: Option<usize>,
    /// Progress spinner.
    pub progress: Option<bool>,
}

fn location(name: &str, latitude: f64, longitude: f64) -> Result<Location, ConfigError> {
    let location = Location::degrees(latitude, longitude);
    if !latitude.is_finite() || !longitude.is_finite() || !location.is_valid() {
        return Err(ConfigError::InvalidCoordinate {
            name: name.to_string(),
            latitude,
            longitude,
        });
    }
    Ok(location)
}

fn ring(name: &str, points: &[[f64; 2]]) -> Result<PolygonBorder, ConfigError> {
    let locations = points
        .iter()
        .map(|[latitude, longitude]| location(name, *latitude, *longitude))
        .collect::<Result<Vec<_>, _>>()?;
    PolygonBorder::from_ring(&locations).map_err(|_| ConfigError::InvalidRing {
        name: name.to_string(),
    })
}

impl LoaderConfig {
    /// Reads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse { source })
    }

    /// Applies the settings on top of [`LoaderOptions::default`].
    pub fn into_options(self) -> Result<LoaderOptions, ConfigError> {
        let mut options = LoaderOptions::default();
        if let Some(name) = self.name {
            options.name = name;
        }
        if let Some(bounds) = self.bounds {
            options.bounds = Some(Rectangle::from_corners(
                location("bounds", bounds.south, bounds.west)?,
                location("bounds", bounds.north, bounds.east)?,
            ));
        }
        if let Some(cut) = self.cut {
            options.cut_border = Some(Arc::new(ring("cut", &cut.ring)?));
        }
        for region in self.regions {
            let border = ring(&region.code, &region.ring)?;
            options.regions = options.regions.with_region(region.code, Arc::new(border));
        }
        if let Some(highways) = self.highways {
            options.way_filter = WayFilter::with_highways(highways);
        }
        if let Some(ferries) = self.ferries {
            options.way_filter = options.way_filter.ferries(ferries);
        }
        if let Some(types) = self.relation_types {
            options.relation_filter = RelationFilter::with_types(types);
        }
        if let Some(points) = self.max_section_points {
            options.max_section_points = points;
        }
        if let Some(enabled) = self.section_at_intersections {
            options.section_at_intersections = enabled;
        }
        if let Some(policy) = self.node_locations {
            options.node_locations = policy;
        }
        if let Some(estimate) = self.estimate {
            options.store = options.store.estimate(estimate);
        }
        if let Some(batching) = self.batching {
            options.store = options.store.batching(batching);
        }
        if let Some(capacity) = self.queue_capacity {
            options.store = options.store.queue_capacity(capacity);
        }
        if let Some(progress) = self.progress {
            options.progress = progress;
        }
        Ok(options)
    }
}
