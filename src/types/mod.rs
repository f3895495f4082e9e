#![forbid(unsafe_code)]
//! Identifiers, locations and the crate error type.

use std::fmt;

/// CRC-32 helpers used by the archive.
pub mod checksum;

pub use checksum::{entry_crc32, Checksum, Crc32Fast};

/// Stable 64-bit identifier of a graph element.
///
/// Negative values encode the reverse direction of a two-way edge; zero and
/// `i64::MIN` are never valid.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Identifier(pub i64);

/// Dense 1-based position of an element inside its store. Zero means "no element".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ElementIndex(pub u32);

impl Identifier {
    /// The null marker written into vacated identifier slots.
    pub const NULL: Identifier = Identifier(0);

    /// Returns true when the identifier may be stored.
    pub fn is_valid(self) -> bool {
        self.0 != 0 && self.0 != i64::MIN
    }

    /// Returns the identifier with its direction sign removed.
    pub fn normalized(self) -> Identifier {
        Identifier(self.0.wrapping_abs())
    }

    /// Returns true for reverse-edge identifiers.
    pub fn is_reverse(self) -> bool {
        self.0 < 0
    }

    /// Returns the identifier of the opposite direction.
    pub fn reversed(self) -> Identifier {
        Identifier(-self.0)
    }
}

impl ElementIndex {
    /// Index value reserved for "no element".
    pub const NONE: ElementIndex = ElementIndex(0);

    /// Returns true for indices that refer to a real slot.
    pub fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Returns the slot offset into a column vector.
    pub fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ElementIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Identifier(value)
    }
}

/// The four kinds of graph element.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ElementKindTag {
    /// Road junctions and way endpoints.
    Vertex,
    /// Directed road segments.
    Edge,
    /// OSM relations such as routes and restrictions.
    Relation,
    /// Named settlements.
    Place,
}

impl ElementKindTag {
    /// Lowercase name used in logs and archive owner names.
    pub const fn name(self) -> &'static str {
        match self {
            ElementKindTag::Vertex => "vertex",
            ElementKindTag::Edge => "edge",
            ElementKindTag::Relation => "relation",
            ElementKindTag::Place => "place",
        }
    }
}

impl fmt::Display for ElementKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const DM7_PER_DEGREE: f64 = 10_000_000.0;

/// A WGS84 location stored as fixed-point degrees with seven decimals (DM7).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Location {
    /// Latitude in 1e-7 degrees.
    pub latitude_dm7: i32,
    /// Longitude in 1e-7 degrees.
    pub longitude_dm7: i32,
}

impl Location {
    /// Builds a location from DM7 components.
    pub const fn dm7(latitude_dm7: i32, longitude_dm7: i32) -> Self {
        Self {
            latitude_dm7,
            longitude_dm7,
        }
    }

    /// Builds a location from decimal degrees, rounding to the DM7 grid.
    pub fn degrees(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude_dm7: (latitude * DM7_PER_DEGREE).round() as i32,
            longitude_dm7: (longitude * DM7_PER_DEGREE).round() as i32,
        }
    }

    /// Latitude in decimal degrees.
    pub fn latitude(self) -> f64 {
        self.latitude_dm7 as f64 / DM7_PER_DEGREE
    }

    /// Longitude in decimal degrees.
    pub fn longitude(self) -> f64 {
        self.longitude_dm7 as f64 / DM7_PER_DEGREE
    }

    /// Returns true when both components lie in their WGS84 ranges.
    pub fn is_valid(self) -> bool {
        (-900_000_000..=900_000_000).contains(&self.latitude_dm7)
            && (-1_800_000_000..=1_800_000_000).contains(&self.longitude_dm7)
    }

    /// Packs the location into one `u64` (latitude in the high half).
    pub fn packed(self) -> u64 {
        ((self.latitude_dm7 as u32 as u64) << 32) | (self.longitude_dm7 as u32 as u64)
    }

    /// Inverse of [`Location::packed`].
    pub fn from_packed(packed: u64) -> Self {
        Self {
            latitude_dm7: (packed >> 32) as u32 as i32,
            longitude_dm7: packed as u32 as i32,
        }
    }

    /// Planar coordinate with x = longitude, y = latitude (degrees).
    pub fn coord(self) -> geo::Coord<f64> {
        geo::Coord {
            x: self.longitude(),
            y: self.latitude(),
        }
    }

    /// Inverse of [`Location::coord`].
    pub fn from_coord(coord: geo::Coord<f64>) -> Self {
        Self::degrees(coord.y, coord.x)
    }

    /// Midpoint on the DM7 grid.
    pub fn midpoint(self, other: Location) -> Location {
        Location {
            latitude_dm7: ((self.latitude_dm7 as i64 + other.latitude_dm7 as i64) / 2) as i32,
            longitude_dm7: ((self.longitude_dm7 as i64 + other.longitude_dm7 as i64) / 2) as i32,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.7},{:.7}", self.latitude(), self.longitude())
    }
}

/// Axis-aligned bounds used as the ingestion load constraint.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Rectangle {
    /// South-west corner.
    pub bottom_left: Location,
    /// North-east corner.
    pub top_right: Location,
}

impl Rectangle {
    /// Creates the rectangle spanning two corners in any order.
    pub fn from_corners(a: Location, b: Location) -> Self {
        Self {
            bottom_left: Location::dm7(
                a.latitude_dm7.min(b.latitude_dm7),
                a.longitude_dm7.min(b.longitude_dm7),
            ),
            top_right: Location::dm7(
                a.latitude_dm7.max(b.latitude_dm7),
                a.longitude_dm7.max(b.longitude_dm7),
            ),
        }
    }

    /// Returns true if `location` lies inside or on the rectangle.
    pub fn contains(&self, location: Location) -> bool {
        (self.bottom_left.latitude_dm7..=self.top_right.latitude_dm7)
            .contains(&location.latitude_dm7)
            && (self.bottom_left.longitude_dm7..=self.top_right.longitude_dm7)
                .contains(&location.longitude_dm7)
    }

    /// Grows the rectangle to include `location`.
    pub fn include(&mut self, location: Location) {
        self.bottom_left.latitude_dm7 = self.bottom_left.latitude_dm7.min(location.latitude_dm7);
        self.bottom_left.longitude_dm7 =
            self.bottom_left.longitude_dm7.min(location.longitude_dm7);
        self.top_right.latitude_dm7 = self.top_right.latitude_dm7.max(location.latitude_dm7);
        self.top_right.longitude_dm7 = self.top_right.longitude_dm7.max(location.longitude_dm7);
    }
}

/// Errors produced by the store, the archive and the ingestion pipeline.
#[derive(thiserror::Error, Debug)]
pub enum RoadGraphError {
    /// Underlying I/O failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Persisted data failed a format or checksum check.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Caller supplied an argument outside the contract.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// GET-mode identifier lookup found no mapping.
    #[error("identifier {0} not found")]
    NotFound(Identifier),
    /// Store-level index lookup failed.
    #[error("no index for identifier {0}")]
    NoIndex(Identifier),
    /// Write attempted on a committed store.
    #[error("store '{0}' is committed")]
    Committed(String),
    /// Write attempted on a frozen column.
    #[error("column '{0}' is frozen")]
    Frozen(String),
    /// The input stream carries no header block.
    #[error("input stream has no metadata header")]
    MissingMetadata,
    /// The input stream could not be decoded.
    #[error("input: {0}")]
    Input(String),
    /// Configuration could not be read or applied.
    #[error("config: {0}")]
    Config(String),
    /// JSON metadata failed to (de)serialize.
    #[error("serialization: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RoadGraphError {
    fn from(err: serde_json::Error) -> Self {
        RoadGraphError::Serialization(err.to_string())
    }
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, RoadGraphError>;
