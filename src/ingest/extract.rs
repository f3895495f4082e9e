//! Tag extraction. Every function is pure; unusable values yield `None`.

use crate::storage::kinds::{
    Direction, PlaceType, RoadState, RoadSubType, RoadSurface, RoadType,
};
use crate::storage::{tag_value, Tag};

const KMH_PER_MPH: f64 = 1.609_344;

fn road_type_of(value: &str) -> Option<RoadType> {
    let base = value.strip_suffix("_link").unwrap_or(value);
    Some(match base {
        "motorway" => RoadType::Motorway,
        "trunk" => RoadType::Trunk,
        "primary" => RoadType::Primary,
        "secondary" => RoadType::Secondary,
        "tertiary" => RoadType::Tertiary,
        "unclassified" | "road" => RoadType::Unclassified,
        "residential" => RoadType::Residential,
        "living_street" => RoadType::LivingStreet,
        "service" => RoadType::Service,
        "track" => RoadType::Track,
        "path" | "footway" | "cycleway" | "bridleway" | "steps" => RoadType::Path,
        "pedestrian" => RoadType::Pedestrian,
        _ => return None,
    })
}

/// Road class from `highway`, or from `construction`/`proposed` for roads
/// that are not built yet, or `Ferry` for `route=ferry`.
pub fn road_type(tags: &[Tag]) -> Option<RoadType> {
    if tag_value(tags, "route") == Some("ferry") {
        return Some(RoadType::Ferry);
    }
    match tag_value(tags, "highway")? {
        "construction" => tag_value(tags, "construction").and_then(road_type_of),
        "proposed" => tag_value(tags, "proposed").and_then(road_type_of),
        value => road_type_of(value),
    }
}

/// Link ramps, roundabouts and access roads.
pub fn road_sub_type(tags: &[Tag]) -> RoadSubType {
    let highway = tag_value(tags, "highway").unwrap_or_default();
    if tag_value(tags, "junction") == Some("roundabout") {
        RoadSubType::Roundabout
    } else if highway.ends_with("_link") {
        RoadSubType::Link
    } else if highway == "service"
        && matches!(
            tag_value(tags, "service"),
            Some("parking_aisle" | "driveway" | "drive-through")
        )
    {
        RoadSubType::Access
    } else {
        RoadSubType::Normal
    }
}

/// Lifecycle state. Never `Unknown`.
pub fn road_state(tags: &[Tag]) -> RoadState {
    match tag_value(tags, "highway") {
        Some("construction") => RoadState::Construction,
        Some("proposed") => RoadState::Proposed,
        _ if matches!(tag_value(tags, "access"), Some("no")) => RoadState::Closed,
        _ => RoadState::Open,
    }
}

/// Surface class from `surface`.
pub fn road_surface(tags: &[Tag]) -> RoadSurface {
    match tag_value(tags, "surface") {
        Some(
            "paved" | "asphalt" | "concrete" | "concrete:plates" | "paving_stones" | "sett"
            | "cobblestone" | "metal" | "wood",
        ) => RoadSurface::Paved,
        Some(
            "unpaved" | "gravel" | "fine_gravel" | "compacted" | "dirt" | "earth" | "grass"
            | "ground" | "mud" | "sand" | "pebblestone",
        ) => RoadSurface::Unpaved,
        _ => RoadSurface::Unknown,
    }
}

/// `maxspeed` in km/h. Accepts plain numbers, `km/h` and `mph` suffixes
/// and `walk`.
pub fn speed_limit(tags: &[Tag]) -> Option<u16> {
    parse_speed(tag_value(tags, "maxspeed")?)
}

fn parse_speed(raw: &str) -> Option<u16> {
    let value = raw.trim();
    if value == "walk" {
        return Some(5);
    }
    let (number, factor) = if let Some(number) = value.strip_suffix("mph") {
        (number, KMH_PER_MPH)
    } else if let Some(number) = value.strip_suffix("km/h") {
        (number, 1.0)
    } else {
        (value, 1.0)
    };
    let speed: f64 = number.trim().parse().ok()?;
    if !speed.is_finite() || speed <= 0.0 {
        return None;
    }
    let kmh = (speed * factor).round();
    (kmh <= u16::MAX as f64).then_some(kmh as u16)
}

/// Total lane count from `lanes`.
pub fn lane_count(tags: &[Tag]) -> Option<u8> {
    tag_value(tags, "lanes")?
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|lanes| *lanes > 0)
}

/// `name`, falling back to `ref`.
pub fn name(tags: &[Tag]) -> Option<String> {
    tag_value(tags, "name")
        .or_else(|| tag_value(tags, "ref"))
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
}

/// Highest vertical level.
pub const MAX_GRADE: u8 = 9;

/// Vertical level from `layer`, clamped to `0..=9`. Bridges without a
/// layer sit on level 1.
pub fn grade_separation(tags: &[Tag]) -> u8 {
    if let Some(layer) = tag_value(tags, "layer").and_then(|layer| layer.trim().parse::<i32>().ok()) {
        return layer.clamp(0, MAX_GRADE as i32) as u8;
    }
    match tag_value(tags, "bridge") {
        Some("no") | None => 0,
        Some(_) => 1,
    }
}

/// Traffic location codes from `tmc` and `tmc:*` tags, in tag order.
pub fn traffic_identifiers(tags: &[Tag]) -> Vec<String> {
    tags.iter()
        .filter(|(key, _)| key == "tmc" || key.starts_with("tmc:"))
        .flat_map(|(_, value)| value.split(';'))
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether ways of this class may be cut at a border.
pub fn is_cut_eligible(road_type: RoadType) -> bool {
    road_type != RoadType::Ferry
}

/// Travel direction of a way.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Oneway {
    /// Direction relative to the stored node order.
    pub direction: Direction,
    /// Whether the node order must be reversed first (`oneway=-1`).
    pub reversed: bool,
}

/// Direction from `oneway`, implied for motorways and roundabouts.
pub fn oneway(tags: &[Tag]) -> Oneway {
    let one_way = Oneway {
        direction: Direction::OneWay,
        reversed: false,
    };
    let two_way = Oneway {
        direction: Direction::TwoWay,
        reversed: false,
    };
    match tag_value(tags, "oneway") {
        Some("yes" | "true" | "1") => one_way,
        Some("-1" | "reverse") => Oneway {
            reversed: true,
            ..one_way
        },
        Some("no" | "false" | "0") => two_way,
        _ if tag_value(tags, "junction") == Some("roundabout") => one_way,
        _ if tag_value(tags, "highway") == Some("motorway") => one_way,
        _ => two_way,
    }
}

/// Settlement class from `place`.
pub fn place_type(tags: &[Tag]) -> Option<PlaceType> {
    Some(match tag_value(tags, "place")? {
        "city" => PlaceType::City,
        "town" => PlaceType::Town,
        "village" => PlaceType::Village,
        "hamlet" => PlaceType::Hamlet,
        "suburb" => PlaceType::Suburb,
        "neighbourhood" | "quarter" => PlaceType::Neighbourhood,
        "locality" => PlaceType::Locality,
        "isolated_dwelling" => PlaceType::IsolatedDwelling,
        _ => return None,
    })
}

/// `population`, ignoring digit group separators.
pub fn population(tags: &[Tag]) -> Option<u32> {
    let digits: String = tag_value(tags, "population")?
        .chars()
        .filter(|c| !matches!(c, ' ' | ',' | '.' | '\''))
        .collect();
    digits.parse().ok()
}

/// Route name: `network` and `ref` joined, either alone, or `name`.
pub fn route_name(tags: &[Tag]) -> Option<String> {
    let non_empty = |key| tag_value(tags, key).filter(|value: &&str| !value.trim().is_empty());
    match (non_empty("network"), non_empty("ref")) {
        (Some(network), Some(reference)) => Some(format!("{network} {reference}")),
        (None, Some(reference)) => Some(reference.to_string()),
        (Some(network), None) => Some(network.to_string()),
        (None, None) => non_empty("name").map(str::to_string),
    }
}

/// Whether a relation describes an administrative boundary.
pub fn is_admin_boundary(tags: &[Tag]) -> bool {
    tag_value(tags, "boundary") == Some("administrative")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::source::tags;

    #[test]
    fn road_types_cover_links_ferries_and_construction() {
        assert_eq!(road_type(&tags(&[("highway", "primary_link")])), Some(RoadType::Primary));
        assert_eq!(road_type(&tags(&[("route", "ferry")])), Some(RoadType::Ferry));
        assert_eq!(
            road_type(&tags(&[("highway", "construction"), ("construction", "secondary")])),
            Some(RoadType::Secondary)
        );
        assert_eq!(road_type(&tags(&[("highway", "bus_stop")])), None);
        assert_eq!(road_type(&tags(&[("building", "yes")])), None);
    }

    #[test]
    fn sub_type_and_state() {
        assert_eq!(road_sub_type(&tags(&[("highway", "trunk_link")])), RoadSubType::Link);
        assert_eq!(
            road_sub_type(&tags(&[("highway", "primary"), ("junction", "roundabout")])),
            RoadSubType::Roundabout
        );
        assert_eq!(
            road_sub_type(&tags(&[("highway", "service"), ("service", "driveway")])),
            RoadSubType::Access
        );
        assert_eq!(road_state(&tags(&[("highway", "proposed")])), RoadState::Proposed);
        assert_eq!(road_state(&tags(&[("highway", "track"), ("access", "no")])), RoadState::Closed);
        assert_eq!(road_state(&tags(&[("highway", "track")])), RoadState::Open);
    }

    #[test]
    fn speed_limits_parse_units() {
        assert_eq!(speed_limit(&tags(&[("maxspeed", "50")])), Some(50));
        assert_eq!(speed_limit(&tags(&[("maxspeed", "30 mph")])), Some(48));
        assert_eq!(speed_limit(&tags(&[("maxspeed", "80 km/h")])), Some(80));
        assert_eq!(speed_limit(&tags(&[("maxspeed", "walk")])), Some(5));
        assert_eq!(speed_limit(&tags(&[("maxspeed", "none")])), None);
        assert_eq!(speed_limit(&tags(&[("maxspeed", "-10")])), None);
    }

    #[test]
    fn grade_separation_clamps_layers() {
        assert_eq!(grade_separation(&tags(&[("layer", "2")])), 2);
        assert_eq!(grade_separation(&tags(&[("layer", "-1")])), 0);
        assert_eq!(grade_separation(&tags(&[("layer", "14")])), MAX_GRADE);
        assert_eq!(grade_separation(&tags(&[("bridge", "yes")])), 1);
        assert_eq!(grade_separation(&tags(&[("bridge", "no")])), 0);
    }

    #[test]
    fn oneway_variants() {
        assert_eq!(oneway(&tags(&[("oneway", "yes")])).direction, Direction::OneWay);
        let reversed = oneway(&tags(&[("oneway", "-1")]));
        assert!(reversed.reversed);
        assert_eq!(reversed.direction, Direction::OneWay);
        assert_eq!(oneway(&tags(&[("highway", "motorway")])).direction, Direction::OneWay);
        assert_eq!(
            oneway(&tags(&[("highway", "motorway"), ("oneway", "no")])).direction,
            Direction::TwoWay
        );
        assert_eq!(oneway(&tags(&[])).direction, Direction::TwoWay);
    }

    #[test]
    fn places_and_routes() {
        assert_eq!(place_type(&tags(&[("place", "quarter")])), Some(PlaceType::Neighbourhood));
        assert_eq!(population(&tags(&[("population", "1,204,000")])), Some(1_204_000));
        assert_eq!(population(&tags(&[("population", "many")])), None);
        assert_eq!(
            route_name(&tags(&[("network", "BAB"), ("ref", "A 9")])).as_deref(),
            Some("BAB A 9")
        );
        assert_eq!(route_name(&tags(&[("ref", "E45")])).as_deref(), Some("E45"));
        assert_eq!(route_name(&tags(&[("type", "route")])), None);
        assert!(is_admin_boundary(&tags(&[("type", "boundary"), ("boundary", "administrative")])));
    }

    #[test]
    fn traffic_identifiers_split_lists() {
        let codes = traffic_identifiers(&tags(&[
            ("tmc", "DE:12345"),
            ("highway", "primary"),
            ("tmc:cid_58:tabcd_1:Class", "Area;Road"),
        ]));
        assert_eq!(codes, vec!["DE:12345", "Area", "Road"]);
    }
}
