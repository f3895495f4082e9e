//! Borders used for clean-cutting and country classification.

use std::sync::Arc;

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Contains, Coord, EuclideanDistance, Line, LineString, Point, Polygon};

use crate::types::{Location, Rectangle, Result, RoadGraphError};

/// Position of a location relative to a border.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Containment {
    /// Strictly inside.
    Inside,
    /// Strictly outside.
    Outside,
    /// Within the border tolerance.
    OnBorder,
}

/// A closed region boundary.
pub trait Border: Send + Sync {
    /// Classifies `location`.
    fn containment(&self, location: Location) -> Containment;

    /// Crossing of the segment `from`→`to` with the border closest to
    /// `from`, or `None` when the segment does not reach the border.
    fn intersection(&self, from: Location, to: Location) -> Option<Location>;
}

/// One DM7 unit in degrees.
pub const DEFAULT_TOLERANCE: f64 = 1e-7;

/// A border given by a polygon in degrees (x = longitude, y = latitude).
#[derive(Clone, Debug)]
pub struct PolygonBorder {
    polygon: Polygon<f64>,
    tolerance: f64,
}

impl PolygonBorder {
    /// Border around `polygon`.
    pub fn new(polygon: Polygon<f64>) -> Self {
        Self {
            polygon,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Border along a closed or open ring of locations.
    pub fn from_ring(ring: &[Location]) -> Result<Self> {
        let mut coords: Vec<Coord<f64>> = ring.iter().map(|location| location.coord()).collect();
        coords.dedup();
        if coords.first() == coords.last() {
            coords.pop();
        }
        if coords.len() < 3 {
            return Err(RoadGraphError::Invalid("border ring needs three distinct points"));
        }
        Ok(Self::new(Polygon::new(LineString::from(coords), Vec::new())))
    }

    /// Border along the edges of `rectangle`.
    pub fn rectangle(rectangle: Rectangle) -> Self {
        let south = rectangle.bottom_left.latitude();
        let west = rectangle.bottom_left.longitude();
        let north = rectangle.top_right.latitude();
        let east = rectangle.top_right.longitude();
        let ring = LineString::from(vec![
            (west, south),
            (east, south),
            (east, north),
            (west, north),
            (west, south),
        ]);
        Self::new(Polygon::new(ring, Vec::new()))
    }

    /// Distance in degrees under which a location counts as on the border.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// The polygon.
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    fn rings(&self) -> impl Iterator<Item = &LineString<f64>> {
        std::iter::once(self.polygon.exterior()).chain(self.polygon.interiors())
    }

    fn distance_to_border(&self, point: Point<f64>) -> f64 {
        self.rings()
            .flat_map(|ring| ring.lines())
            .map(|line| point.euclidean_distance(&line))
            .fold(f64::INFINITY, f64::min)
    }
}

fn squared_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

impl Border for PolygonBorder {
    fn containment(&self, location: Location) -> Containment {
        let point = Point::from(location.coord());
        if self.distance_to_border(point) <= self.tolerance {
            Containment::OnBorder
        } else if self.polygon.contains(&point) {
            Containment::Inside
        } else {
            Containment::Outside
        }
    }

    fn intersection(&self, from: Location, to: Location) -> Option<Location> {
        let origin = from.coord();
        let segment = Line::new(origin, to.coord());
        self.rings()
            .flat_map(|ring| ring.lines())
            .filter_map(|edge| match line_intersection(segment, edge)? {
                LineIntersection::SinglePoint { intersection, .. } => Some(intersection),
                LineIntersection::Collinear { intersection } => {
                    let (start, end) = (intersection.start, intersection.end);
                    if squared_distance(origin, start) <= squared_distance(origin, end) {
                        Some(start)
                    } else {
                        Some(end)
                    }
                }
            })
            .min_by(|a, b| squared_distance(origin, *a).total_cmp(&squared_distance(origin, *b)))
            .map(Location::from_coord)
    }
}

/// Assigns country codes to edges from a list of region borders.
#[derive(Clone, Default)]
pub struct RegionClassifier {
    regions: Vec<(String, Arc<dyn Border>)>,
}

impl std::fmt::Debug for RegionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.regions.iter().map(|(code, _)| code))
            .finish()
    }
}

impl RegionClassifier {
    /// A classifier without regions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region. Earlier regions win where regions overlap.
    pub fn with_region(mut self, code: impl Into<String>, border: Arc<dyn Border>) -> Self {
        self.regions.push((code.into(), border));
        self
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True when no region is configured.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Code of the first region containing `location`, border included.
    pub fn country_at(&self, location: Location) -> Option<&str> {
        self.regions
            .iter()
            .find(|(_, border)| border.containment(location) != Containment::Outside)
            .map(|(code, _)| code.as_str())
    }

    /// Country of an edge, judged at the midpoint of its endpoints.
    pub fn country(&self, from: Location, to: Location) -> Option<&str> {
        self.country_at(from.midpoint(to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> PolygonBorder {
        PolygonBorder::rectangle(Rectangle::from_corners(
            Location::degrees(0.0, 0.0),
            Location::degrees(1.0, 1.0),
        ))
    }

    #[test]
    fn containment_distinguishes_the_three_sides() {
        let border = square();
        assert_eq!(border.containment(Location::degrees(0.5, 0.5)), Containment::Inside);
        assert_eq!(border.containment(Location::degrees(0.5, 1.5)), Containment::Outside);
        assert_eq!(border.containment(Location::degrees(0.5, 1.0)), Containment::OnBorder);
        assert_eq!(border.containment(Location::degrees(1.0, 1.0)), Containment::OnBorder);
    }

    #[test]
    fn intersection_lands_on_the_border() {
        let border = square();
        let crossing = border
            .intersection(Location::degrees(0.3, 0.5), Location::degrees(0.7, 1.5))
            .unwrap();
        assert_eq!(crossing, Location::degrees(0.5, 1.0));
        assert_eq!(border.containment(crossing), Containment::OnBorder);
        assert!(border
            .intersection(Location::degrees(0.2, 0.2), Location::degrees(0.4, 0.4))
            .is_none());
    }

    #[test]
    fn intersection_prefers_the_crossing_nearest_the_start() {
        let border = square();
        let crossing = border
            .intersection(Location::degrees(0.5, -0.5), Location::degrees(0.5, 1.5))
            .unwrap();
        assert_eq!(crossing, Location::degrees(0.5, 0.0));
    }

    #[test]
    fn degenerate_rings_are_rejected() {
        let ring = [Location::degrees(0.0, 0.0), Location::degrees(1.0, 1.0), Location::degrees(0.0, 0.0)];
        assert!(PolygonBorder::from_ring(&ring).is_err());
    }

    #[test]
    fn classifier_uses_the_midpoint() {
        let classifier = RegionClassifier::new().with_region("AA", Arc::new(square()));
        assert_eq!(
            classifier.country(Location::degrees(0.5, 0.9), Location::degrees(0.5, 1.05)),
            Some("AA")
        );
        assert_eq!(
            classifier.country(Location::degrees(0.5, 0.9), Location::degrees(0.5, 1.3)),
            None
        );
    }
}
