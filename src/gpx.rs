//! GPX 1.1 ingestion.
//!
//! Wraps the `gpx` crate. A GPX file can stand in for a directions
//! provider when navigating offline: its route, or a simplified track,
//! becomes a single-leg [`Route`]. Tracks can also be replayed as fixes.

use std::io::Read;

use serde::Serialize;

use crate::error::{NavigationError, Result};
use crate::geometry::{self, Coordinate};
use crate::location::Location;
use crate::maneuver;
use crate::route::Route;
use crate::simplify;

/// Tolerance used to thin out recorded tracks before building maneuvers.
pub const TRACK_SIMPLIFY_TOLERANCE_M: f64 = 10.0;

/// Horizontal accuracy assigned to replayed GPX points.
const REPLAY_ACCURACY_M: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpxPoint {
    pub coordinate: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ele: Option<f64>,
}

/// A track or route: a named point sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpxPath {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub points: Vec<GpxPoint>,
}

impl GpxPath {
    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.points.iter().map(|p| p.coordinate).collect()
    }
}

/// A single named point of interest, with its `<sym>` icon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpxWaypoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub point: GpxPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// All data extracted from a GPX file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpxData {
    pub tracks: Vec<GpxPath>,
    pub routes: Vec<GpxPath>,
    pub waypoints: Vec<GpxWaypoint>,
}

fn point(wp: &gpx::Waypoint) -> GpxPoint {
    GpxPoint {
        coordinate: Coordinate::new(wp.point().y(), wp.point().x()),
        ele: wp.elevation,
    }
}

/// Parse a GPX file from any reader.
pub fn parse<R: Read>(reader: R) -> Result<GpxData> {
    let gpx = gpx::read(reader).map_err(|e| NavigationError::Gpx(e.to_string()))?;

    let tracks = gpx
        .tracks
        .iter()
        .map(|t| GpxPath {
            name: t.name.clone(),
            // Segments are flattened into one path
            points: t
                .segments
                .iter()
                .flat_map(|seg| seg.points.iter())
                .map(point)
                .collect(),
        })
        .collect();

    let routes = gpx
        .routes
        .iter()
        .map(|r| GpxPath {
            name: r.name.clone(),
            points: r.points.iter().map(point).collect(),
        })
        .collect();

    let waypoints = gpx
        .waypoints
        .iter()
        .map(|wp| GpxWaypoint {
            name: wp.name.clone(),
            point: point(wp),
            icon: wp.symbol.clone(),
        })
        .collect();

    Ok(GpxData {
        tracks,
        routes,
        waypoints,
    })
}

pub fn parse_bytes(data: &[u8]) -> Result<GpxData> {
    parse(data)
}

/// Build a navigable route from GPX data.
///
/// The first `<rte>` with at least two points is used as is. Without
/// one, the first usable track is simplified first. Durations assume
/// `speed_mps` throughout.
pub fn route_from_gpx(data: &GpxData, speed_mps: f64) -> Result<Route> {
    if let Some(route) = data.routes.iter().find(|r| r.points.len() >= 2) {
        log::debug!("Building route from GPX route with {} points", route.points.len());
        return maneuver::route_from_points(&route.coordinates(), route.name.as_deref(), speed_mps);
    }

    let track = data
        .tracks
        .iter()
        .find(|t| t.points.len() >= 2)
        .ok_or(NavigationError::NoCandidateRoute)?;
    let simplified = simplify::rdp_simplify(&track.coordinates(), TRACK_SIMPLIFY_TOLERANCE_M);
    log::debug!(
        "Simplified GPX track from {} to {} points",
        track.points.len(),
        simplified.len()
    );
    maneuver::route_from_points(&simplified, track.name.as_deref(), speed_mps)
}

/// Fixes for replaying the first track (or route) of a GPX file.
///
/// GPX timestamps are not used: points are spaced one second apart,
/// with course and speed derived from the next point.
pub fn replay_locations(data: &GpxData) -> Result<Vec<Location>> {
    let path = data
        .tracks
        .iter()
        .chain(data.routes.iter())
        .find(|p| !p.points.is_empty())
        .ok_or_else(|| NavigationError::Gpx("file has no track or route points".to_string()))?;

    let points = &path.points;
    let locations = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut location = Location::new(p.coordinate)
                .with_accuracy(REPLAY_ACCURACY_M)
                .with_timestamp(i as f64);
            location.altitude = p.ele.unwrap_or(0.0);
            if let Some(next) = points.get(i + 1) {
                let speed = geometry::haversine(&p.coordinate, &next.coordinate);
                if speed > 0.0 {
                    location.course = geometry::bearing(&p.coordinate, &next.coordinate);
                }
                location.speed = speed;
            }
            location
        })
        .collect();
    Ok(locations)
}

/// Parse GPX and return the result as a JSON string.
pub fn parse_to_json(data: &[u8]) -> Result<String> {
    let gpx_data = parse_bytes(data)?;
    Ok(serde_json::to_string(&gpx_data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::ManeuverDirection;

    const CITY_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Donaukanal ride</name>
    <trkseg>
      <trkpt lat="48.2082" lon="16.3738"><ele>171</ele></trkpt>
      <trkpt lat="48.2090" lon="16.3750"><ele>173</ele></trkpt>
      <trkpt lat="48.2100" lon="16.3760"><ele>170</ele></trkpt>
    </trkseg>
  </trk>
  <rte>
    <name>Prater</name>
    <rtept lat="48.2000" lon="16.3500"></rtept>
    <rtept lat="48.2100" lon="16.3500"></rtept>
    <rtept lat="48.2100" lon="16.3700"></rtept>
  </rte>
  <wpt lat="48.2082" lon="16.3738">
    <name>Schwedenplatz</name>
    <ele>171</ele>
    <sym>fuel</sym>
  </wpt>
</gpx>"#;

    const L_SHAPED_TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Loop</name>
    <trkseg>
      <trkpt lat="48.0" lon="16.0"></trkpt>
      <trkpt lat="48.0" lon="16.01"></trkpt>
      <trkpt lat="48.0" lon="16.02"></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="48.01" lon="16.02"></trkpt>
      <trkpt lat="48.02" lon="16.02"></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn tracks_routes_and_waypoints_are_read() {
        let data = parse_bytes(CITY_GPX.as_bytes()).unwrap();

        assert_eq!(data.tracks.len(), 1);
        assert_eq!(data.tracks[0].name.as_deref(), Some("Donaukanal ride"));
        assert_eq!(data.tracks[0].points.len(), 3);

        let p = &data.tracks[0].points[0];
        assert!((p.coordinate.lat - 48.2082).abs() < 1e-6);
        assert!((p.coordinate.lon - 16.3738).abs() < 1e-6);
        assert_eq!(p.ele, Some(171.0));

        assert_eq!(data.routes[0].points.len(), 3);
        assert_eq!(data.waypoints[0].name.as_deref(), Some("Schwedenplatz"));
        assert_eq!(data.waypoints[0].icon.as_deref(), Some("fuel"));
    }

    #[test]
    fn parse_invalid_xml_returns_error() {
        assert!(matches!(parse_bytes(b"not xml at all"), Err(NavigationError::Gpx(_))));
    }

    #[test]
    fn json_export_keeps_structure() {
        let json = parse_to_json(CITY_GPX.as_bytes()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["tracks"].is_array());
        assert!(parsed["routes"][0]["points"][0]["coordinate"]["lat"].is_number());
    }

    #[test]
    fn route_element_is_preferred() {
        let data = parse_bytes(CITY_GPX.as_bytes()).unwrap();
        let route = route_from_gpx(&data, 10.0).unwrap();

        let steps = &route.legs()[0].steps;
        // Depart north, turn right to the east, arrive
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].maneuver_direction, ManeuverDirection::Right);
        assert_eq!(steps[2].instruction, "Arrive at Prater");
    }

    #[test]
    fn track_is_simplified_into_route() {
        let data = parse_bytes(L_SHAPED_TRACK.as_bytes()).unwrap();
        assert_eq!(data.tracks[0].points.len(), 5);

        let route = route_from_gpx(&data, 10.0).unwrap();
        let steps = &route.legs()[0].steps;
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].coordinates.len(), 2);
        assert_eq!(steps[1].maneuver_direction, ManeuverDirection::Left);
    }

    #[test]
    fn empty_gpx_has_no_route() {
        let empty = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
</gpx>"#;
        let data = parse_bytes(empty.as_bytes()).unwrap();
        assert!(data.tracks.is_empty());
        assert_eq!(route_from_gpx(&data, 10.0), Err(NavigationError::NoCandidateRoute));
        assert!(replay_locations(&data).is_err());
    }

    #[test]
    fn track_replays_one_fix_per_second() {
        let data = parse_bytes(L_SHAPED_TRACK.as_bytes()).unwrap();
        let fixes = replay_locations(&data).unwrap();

        assert_eq!(fixes.len(), 5);
        assert_eq!(fixes[3].timestamp, 3.0);
        assert!((fixes[0].course - 90.0).abs() < 0.1);
        assert!((fixes[2].course - 0.0).abs() < 0.1);
        assert!(fixes[0].speed > 700.0);
        assert!(!fixes[4].has_valid_course());
    }
}
