//! Location sources that do not need a device.
//!
//! [`ReplayLocationSource`] plays back a recording; [`SimulatedLocationSource`]
//! drives along the active route.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Result;
use crate::geometry::{self, Coordinate};
use crate::gpx;
use crate::location::{Location, LocationSource, LocationUpdate};
use crate::route::Route;

/// Course of simulated fixes points this far ahead along the route, in meters.
const LOOK_AHEAD_M: f64 = 10.0;

/// Seconds between simulated fixes.
const SIMULATION_TICK_S: f64 = 1.0;

/// Accuracy reported by simulated fixes, in meters.
const SIMULATED_ACCURACY_M: f64 = 5.0;

/// The simulation stops this close to the end of the route, in meters.
const END_TOLERANCE_M: f64 = 0.01;

/// One entry of a recorded location file.
///
/// Recorders disagree on naming, so the usual spellings are accepted.
#[derive(Debug, Deserialize)]
struct RecordedFix {
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lng", alias = "lon")]
    longitude: f64,
    #[serde(default)]
    altitude: f64,
    #[serde(default = "unknown", alias = "horizontalAccuracy", alias = "accuracy")]
    horizontal_accuracy: f64,
    #[serde(default = "unknown", alias = "verticalAccuracy")]
    vertical_accuracy: f64,
    #[serde(default = "unknown", alias = "bearing")]
    course: f64,
    #[serde(default = "unknown")]
    speed: f64,
    #[serde(default)]
    timestamp: f64,
}

fn unknown() -> f64 {
    -1.0
}

impl From<RecordedFix> for Location {
    fn from(fix: RecordedFix) -> Self {
        Location {
            coordinate: Coordinate::new(fix.latitude, fix.longitude),
            altitude: fix.altitude,
            horizontal_accuracy: fix.horizontal_accuracy,
            vertical_accuracy: fix.vertical_accuracy,
            course: fix.course,
            speed: fix.speed,
            timestamp: fix.timestamp,
        }
    }
}

/// Plays back recorded fixes in timestamp order.
#[derive(Debug, Clone, Default)]
pub struct ReplayLocationSource {
    fixes: VecDeque<Location>,
}

impl ReplayLocationSource {
    pub fn from_locations(mut locations: Vec<Location>) -> Self {
        locations.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self {
            fixes: locations.into(),
        }
    }

    /// Load a JSON array of recorded fixes.
    pub fn from_json(json: &str) -> Result<Self> {
        let recorded: Vec<RecordedFix> = serde_json::from_str(json)?;
        log::debug!("Loaded {} recorded fixes", recorded.len());
        Ok(Self::from_locations(recorded.into_iter().map(Location::from).collect()))
    }

    /// Replay the first track of a GPX file, one fix per second.
    pub fn from_gpx(data: &[u8]) -> Result<Self> {
        let parsed = gpx::parse_bytes(data)?;
        Ok(Self::from_locations(gpx::replay_locations(&parsed)?))
    }

    /// Fixes not yet played.
    pub fn remaining(&self) -> usize {
        self.fixes.len()
    }
}

impl LocationSource for ReplayLocationSource {
    fn next_update(&mut self) -> Option<LocationUpdate> {
        self.fixes.pop_front().map(LocationUpdate::Location)
    }
}

/// Drives along the route at a constant speed, one fix per tick.
///
/// Follows reroutes: after a route change it continues from the start
/// of the new route.
#[derive(Debug, Clone)]
pub struct SimulatedLocationSource {
    line: Vec<Coordinate>,
    length: f64,
    speed: f64,
    distance: f64,
    timestamp: f64,
    last_course: f64,
    finished: bool,
}

impl SimulatedLocationSource {
    pub fn new(route: &Route, speed_mps: f64, start_timestamp: f64) -> Self {
        let line = route.coordinates().to_vec();
        Self {
            length: geometry::polyline_length(&line),
            line,
            speed: speed_mps.max(0.0),
            distance: 0.0,
            timestamp: start_timestamp,
            last_course: -1.0,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl LocationSource for SimulatedLocationSource {
    fn next_update(&mut self) -> Option<LocationUpdate> {
        if self.finished {
            return None;
        }
        let distance = self.distance.min(self.length);
        let position = geometry::coordinate_at(&self.line, distance)?;
        if let Some(ahead) = geometry::coordinate_at(&self.line, distance + LOOK_AHEAD_M) {
            if geometry::haversine(&position, &ahead) > geometry::DEGENERATE_SEGMENT_M {
                self.last_course = geometry::bearing(&position, &ahead);
            }
        }

        let location = Location::new(position)
            .with_accuracy(SIMULATED_ACCURACY_M)
            .with_course(self.last_course)
            .with_speed(self.speed)
            .with_timestamp(self.timestamp);

        self.finished = distance + END_TOLERANCE_M >= self.length || self.speed <= 0.0;
        self.distance += self.speed * SIMULATION_TICK_S;
        self.timestamp += SIMULATION_TICK_S;
        Some(LocationUpdate::Location(location))
    }

    fn route_did_change(&mut self, route: &Arc<Route>) {
        log::debug!("Simulation following new route of {:.0} m", route.distance());
        self.line = route.coordinates().to_vec();
        self.length = geometry::polyline_length(&self.line);
        self.distance = 0.0;
        self.finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigationConfig;
    use crate::controller::{DirectionsProvider, NavigationState, RequestId, RouteController};
    use crate::fixtures::{self, ORIGIN};
    use crate::route::RouteRequest;

    fn next_location(source: &mut impl LocationSource) -> Option<Location> {
        match source.next_update()? {
            LocationUpdate::Location(location) => Some(location),
            LocationUpdate::Heading(_) => None,
        }
    }

    #[test]
    fn json_fixes_are_sorted_by_timestamp() {
        let json = r#"[
            {"lat": 48.2, "lng": 16.3, "timestamp": 20.0, "accuracy": 4.0},
            {"latitude": 48.1, "longitude": 16.2, "timestamp": 10.0, "course": 90.0, "speed": 12.0}
        ]"#;
        let mut source = ReplayLocationSource::from_json(json).unwrap();
        assert_eq!(source.remaining(), 2);

        let first = next_location(&mut source).unwrap();
        assert_eq!(first.timestamp, 10.0);
        assert_eq!(first.course, 90.0);
        assert_eq!(first.horizontal_accuracy, -1.0);

        let second = next_location(&mut source).unwrap();
        assert_eq!(second.coordinate, Coordinate::new(48.2, 16.3));
        assert_eq!(second.horizontal_accuracy, 4.0);
        assert!(source.next_update().is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ReplayLocationSource::from_json(r#"[{"lat": 48.0}]"#).is_err());
        assert!(ReplayLocationSource::from_json("{").is_err());
    }

    #[test]
    fn gpx_track_replays() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="48.0" lon="16.0"></trkpt>
    <trkpt lat="48.0001" lon="16.0"></trkpt>
  </trkseg></trk>
</gpx>"#;
        let source = ReplayLocationSource::from_gpx(gpx.as_bytes()).unwrap();
        assert_eq!(source.remaining(), 2);
    }

    #[test]
    fn simulation_drives_route_at_constant_speed() {
        let route = fixtures::straight_route();
        let mut source = SimulatedLocationSource::new(&route, 100.0, 0.0);

        let first = next_location(&mut source).unwrap();
        assert_eq!(first.coordinate, ORIGIN);
        assert!(first.course.abs() < 0.1);

        let second = next_location(&mut source).unwrap();
        assert_eq!(second.timestamp, 1.0);
        assert!((geometry::haversine(&ORIGIN, &second.coordinate) - 100.0).abs() < 0.1);

        let rest: Vec<Location> = std::iter::from_fn(|| next_location(&mut source)).collect();
        assert_eq!(rest.len(), 3);
        assert!(source.is_finished());
        assert!(rest[2].has_valid_course());
    }

    #[test]
    fn simulation_follows_route_change() {
        let route = fixtures::straight_route();
        let mut source = SimulatedLocationSource::new(&route, 100.0, 0.0);
        next_location(&mut source);
        next_location(&mut source);

        let other = fixtures::seven_step_route();
        source.route_did_change(&other);
        let location = next_location(&mut source).unwrap();
        assert_eq!(location.coordinate, other.coordinates()[0]);
        assert_eq!(location.timestamp, 2.0);
        assert!((location.course - 90.0).abs() < 0.1);
    }

    struct NoDirections;

    impl DirectionsProvider for NoDirections {
        fn calculate_route(&mut self, _id: RequestId, _request: RouteRequest) {}
    }

    #[test]
    fn simulated_drive_arrives() {
        let route = fixtures::seven_step_route();
        let mut controller =
            RouteController::new(route.clone(), NavigationConfig::default(), Box::new(NoDirections))
                .unwrap();
        controller.set_location_source(Box::new(SimulatedLocationSource::new(&route, 10.0, 0.0)));

        while controller.pump_location_source(10) > 0 {}

        assert_eq!(controller.state(), NavigationState::Arrived);
        assert!(controller.pending_request().is_none());
        assert!(controller.progress().current_leg_progress().is_on_final_step());
    }
}
