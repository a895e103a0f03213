//! Location fixes and heading readings as delivered by the device.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::Coordinate;
use crate::route::Route;

/// A raw or snapped location fix.
///
/// Negative `course`, `speed` or accuracy values mean "unknown", the
/// convention of the platform location APIs feeding the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub coordinate: Coordinate,
    #[serde(default)]
    pub altitude: f64,
    /// Radius of uncertainty in meters.
    #[serde(default = "unknown")]
    pub horizontal_accuracy: f64,
    #[serde(default = "unknown")]
    pub vertical_accuracy: f64,
    /// Direction of travel in degrees clockwise from true north.
    #[serde(default = "unknown")]
    pub course: f64,
    /// Speed in meters per second.
    #[serde(default = "unknown")]
    pub speed: f64,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: f64,
}

fn unknown() -> f64 {
    -1.0
}

impl Location {
    /// A fix at `coordinate` with nothing else known.
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            altitude: 0.0,
            horizontal_accuracy: unknown(),
            vertical_accuracy: unknown(),
            course: unknown(),
            speed: unknown(),
            timestamp: 0.0,
        }
    }

    pub fn with_course(mut self, course: f64) -> Self {
        self.course = course;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_accuracy(mut self, horizontal_accuracy: f64) -> Self {
        self.horizontal_accuracy = horizontal_accuracy;
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.coordinate = coordinate;
        self
    }

    /// True when the reported course can be used.
    pub fn has_valid_course(&self) -> bool {
        self.course.is_finite() && self.course >= 0.0
    }

    /// True when the horizontal accuracy is known and within `maximum` meters.
    pub fn is_qualified(&self, maximum: f64) -> bool {
        self.horizontal_accuracy.is_finite() && (0.0..=maximum).contains(&self.horizontal_accuracy)
    }

    /// Basic sanity: finite, in-range coordinate and a finite timestamp.
    pub fn is_sane(&self) -> bool {
        self.coordinate.is_valid() && self.timestamp.is_finite()
    }
}

/// A compass reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    /// Degrees clockwise from true north; negative when unknown.
    pub true_heading: f64,
    /// Maximum deviation in degrees; negative when the reading is invalid.
    pub accuracy: f64,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: f64,
}

impl Heading {
    pub fn is_qualified(&self) -> bool {
        self.true_heading.is_finite()
            && self.true_heading >= 0.0
            && self.accuracy.is_finite()
            && self.accuracy >= 0.0
    }

    /// True when the reading is qualified and at most `max_age` seconds older than `now`.
    pub fn is_recent(&self, now: f64, max_age: f64) -> bool {
        self.is_qualified() && (now - self.timestamp).abs() <= max_age
    }
}

/// One item pushed by a location source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationUpdate {
    Location(Location),
    Heading(Heading),
}

/// Something that produces fixes: a device, a recording or a simulation.
///
/// The controller owns its source and pulls from it; a source never
/// holds a reference back to the controller.
pub trait LocationSource {
    /// The next pending update, or None when nothing is available right now.
    fn next_update(&mut self) -> Option<LocationUpdate>;

    /// Called after the controller switched to a different route.
    fn route_did_change(&mut self, _route: &Arc<Route>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mark_unknown_values() {
        let loc = Location::new(Coordinate::new(48.0, 16.0));
        assert!(!loc.has_valid_course());
        assert!(!loc.is_qualified(100.0));
        assert!(loc.is_sane());
    }

    #[test]
    fn qualification_uses_accuracy_range() {
        let loc = Location::new(Coordinate::new(48.0, 16.0)).with_accuracy(10.0);
        assert!(loc.is_qualified(100.0));
        assert!(!loc.with_accuracy(150.0).is_qualified(100.0));
    }

    #[test]
    fn non_finite_fix_is_not_sane() {
        let loc = Location::new(Coordinate::new(f64::NAN, 16.0));
        assert!(!loc.is_sane());
    }

    #[test]
    fn json_fills_missing_fields_as_unknown() {
        let loc: Location =
            serde_json::from_str(r#"{"coordinate":{"lat":48.0,"lon":16.0},"timestamp":5.0}"#)
                .unwrap();
        assert_eq!(loc.course, -1.0);
        assert_eq!(loc.speed, -1.0);
        assert_eq!(loc.timestamp, 5.0);
    }

    #[test]
    fn heading_recency() {
        let heading = Heading {
            true_heading: 50.0,
            accuracy: 1.0,
            timestamp: 100.0,
        };
        assert!(heading.is_recent(103.0, 5.0));
        assert!(!heading.is_recent(110.0, 5.0));
        let invalid = Heading {
            accuracy: -1.0,
            ..heading
        };
        assert!(!invalid.is_recent(100.0, 5.0));
    }
}
