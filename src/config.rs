//! Tuning parameters of a navigation session.
//!
//! Every threshold the engine applies lives here instead of in global
//! state. Defaults follow the values the engine was tuned with on
//! real drives; hosts override individual fields through JSON.

use serde::{Deserialize, Serialize};

use crate::error::{NavigationError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Fixes with a horizontal accuracy outside `[0, this]` meters are unqualified.
    pub maximum_qualified_accuracy: f64,
    /// Snapping is skipped for fixes less accurate than this (meters).
    pub snapping_max_horizontal_accuracy: f64,
    /// Snapping is skipped when the fix is further than this from the nearby geometry.
    pub maximum_snapping_distance: f64,
    /// Minimum speed (m/s) at which a reported course is trusted over the route direction.
    pub snapping_minimum_speed: f64,
    /// Accuracy (meters) below which a reported course is trusted over the route direction.
    pub snapping_minimum_accuracy: f64,
    /// Largest course correction (degrees) snapping may apply.
    pub snapping_max_course_deviation: f64,
    /// At or below this speed (m/s) a fix never snaps onto the upcoming step.
    pub maximum_speed_for_current_step: f64,
    /// Course tolerance (degrees) for a completed turn onto the upcoming step.
    pub maximum_turn_completion_offset: f64,
    /// Radius (meters) around a maneuver in which the step may advance.
    pub maneuver_zone_radius: f64,
    /// A straight maneuver is reached this close to it along the step (meters).
    pub maneuver_reached_distance: f64,
    /// Growth in distance to the maneuver (meters) that counts as having passed it.
    pub moving_away_margin: f64,
    /// The arrival maneuver is reached this close to the destination along the step (meters).
    pub arrival_tolerance: f64,
    /// Start the next leg right after arriving at an intermediate waypoint.
    pub continue_after_arrival: bool,
    /// Distance (meters) from the route before a reroute is considered.
    pub rerouting_tolerance: f64,
    /// Off-route radius grows with horizontal accuracy times this factor.
    pub accuracy_radius_multiplier: f64,
    /// Upper bound (meters) of the off-route radius.
    pub maximum_off_route_radius: f64,
    /// Distance (meters) within which a fix counts as being on a later step.
    pub user_location_snapping_distance: f64,
    /// Consecutive fixes heading away from the route before it counts as off course.
    pub min_incorrect_courses: u32,
    /// Accuracy divisor raising the incorrect-course count for poor fixes.
    pub incorrect_course_multiplier: f64,
    /// Heading readings older than this (seconds) are ignored.
    pub heading_max_age: f64,
    /// Cell edge (meters) used when comparing route geometries.
    pub route_match_cell_size: f64,
    /// Minimum match percentage for adopting an alternative route.
    pub match_threshold: f64,
    /// Duration change (seconds) that justifies adopting a slower matching route.
    pub eta_update_margin: f64,
    /// Heading accuracy (degrees) attached to the origin of reroute requests.
    pub rerouting_heading_accuracy: f64,
    /// Periodically look for faster routes while on route.
    pub reroutes_proactively: bool,
    /// Seconds between proactive route checks.
    pub proactive_reroute_interval: f64,
    /// Proactive checks stop when less than this many seconds remain.
    pub proactive_minimum_duration_remaining: f64,
    /// Keep checking proactively even when close to the destination.
    pub check_for_reroute_in_last_minutes: bool,
    /// No proactive checks while the current maneuver is closer than this (seconds).
    pub medium_alert_interval: f64,
    /// Extrapolate along the route when the host reports that fixes stopped.
    pub dead_reckoning_enabled: bool,
    /// Drive along the route on dead-reckoned fixes while inside a tunnel.
    pub tunnel_simulation_enabled: bool,
    /// A tunnel entrance closer than this (meters) starts tunnel simulation.
    pub tunnel_entrance_distance: f64,
    /// Accurate fixes slower than this (m/s) near a tunnel entrance do not start simulation.
    pub tunnel_entrance_minimum_speed: f64,
    /// Qualified fixes needed after a tunnel before simulation stops.
    pub tunnel_exit_fixes: u32,
    /// Number of recent raw fixes kept in the session statistics.
    pub past_locations_limit: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            maximum_qualified_accuracy: 100.0,
            snapping_max_horizontal_accuracy: 100.0,
            maximum_snapping_distance: 50.0,
            snapping_minimum_speed: 3.0,
            snapping_minimum_accuracy: 20.0,
            snapping_max_course_deviation: 45.0,
            maximum_speed_for_current_step: 1.0,
            maximum_turn_completion_offset: 30.0,
            maneuver_zone_radius: 40.0,
            maneuver_reached_distance: 0.5,
            moving_away_margin: 1.0,
            arrival_tolerance: 10.0,
            continue_after_arrival: true,
            rerouting_tolerance: 50.0,
            accuracy_radius_multiplier: 1.0,
            maximum_off_route_radius: 100.0,
            user_location_snapping_distance: 15.0,
            min_incorrect_courses: 4,
            incorrect_course_multiplier: 4.0,
            heading_max_age: 5.0,
            route_match_cell_size: 10.0,
            match_threshold: 90.0,
            eta_update_margin: 30.0,
            rerouting_heading_accuracy: 90.0,
            reroutes_proactively: false,
            proactive_reroute_interval: 120.0,
            proactive_minimum_duration_remaining: 600.0,
            check_for_reroute_in_last_minutes: false,
            medium_alert_interval: 70.0,
            dead_reckoning_enabled: false,
            tunnel_simulation_enabled: true,
            tunnel_entrance_distance: 15.0,
            tunnel_entrance_minimum_speed: 5.0,
            tunnel_exit_fixes: 3,
            past_locations_limit: 40,
        }
    }
}

impl NavigationConfig {
    /// Parse and validate a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("maximum_qualified_accuracy", self.maximum_qualified_accuracy),
            ("maneuver_zone_radius", self.maneuver_zone_radius),
            ("rerouting_tolerance", self.rerouting_tolerance),
            ("maximum_off_route_radius", self.maximum_off_route_radius),
            ("incorrect_course_multiplier", self.incorrect_course_multiplier),
            ("route_match_cell_size", self.route_match_cell_size),
            ("proactive_reroute_interval", self.proactive_reroute_interval),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(name, value));
            }
        }

        let non_negative = [
            ("snapping_max_horizontal_accuracy", self.snapping_max_horizontal_accuracy),
            ("maximum_snapping_distance", self.maximum_snapping_distance),
            ("snapping_minimum_speed", self.snapping_minimum_speed),
            ("snapping_minimum_accuracy", self.snapping_minimum_accuracy),
            ("snapping_max_course_deviation", self.snapping_max_course_deviation),
            ("maximum_speed_for_current_step", self.maximum_speed_for_current_step),
            ("maximum_turn_completion_offset", self.maximum_turn_completion_offset),
            ("maneuver_reached_distance", self.maneuver_reached_distance),
            ("moving_away_margin", self.moving_away_margin),
            ("arrival_tolerance", self.arrival_tolerance),
            ("accuracy_radius_multiplier", self.accuracy_radius_multiplier),
            ("user_location_snapping_distance", self.user_location_snapping_distance),
            ("heading_max_age", self.heading_max_age),
            ("eta_update_margin", self.eta_update_margin),
            ("rerouting_heading_accuracy", self.rerouting_heading_accuracy),
            ("proactive_minimum_duration_remaining", self.proactive_minimum_duration_remaining),
            ("medium_alert_interval", self.medium_alert_interval),
            ("tunnel_entrance_distance", self.tunnel_entrance_distance),
            ("tunnel_entrance_minimum_speed", self.tunnel_entrance_minimum_speed),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(name, value));
            }
        }

        if !(0.0..=100.0).contains(&self.match_threshold) {
            return Err(invalid("match_threshold", self.match_threshold));
        }
        if self.min_incorrect_courses == 0 {
            return Err(NavigationError::InvalidConfig(
                "min_incorrect_courses must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: f64) -> NavigationError {
    NavigationError::InvalidConfig(format!("{name} out of range: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        let config = NavigationConfig::from_json("{}").unwrap();
        assert_eq!(config, NavigationConfig::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config =
            NavigationConfig::from_json(r#"{"match_threshold": 80.0, "reroutes_proactively": true}"#)
                .unwrap();
        assert_eq!(config.match_threshold, 80.0);
        assert!(config.reroutes_proactively);
        assert_eq!(config.maneuver_zone_radius, 40.0);
    }

    #[test]
    fn default_is_valid() {
        assert_eq!(NavigationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let zero_cells = NavigationConfig {
            route_match_cell_size: 0.0,
            ..NavigationConfig::default()
        };
        assert!(matches!(zero_cells.validate(), Err(NavigationError::InvalidConfig(_))));

        let over_full_match = r#"{"match_threshold": 120.0}"#;
        assert!(matches!(
            NavigationConfig::from_json(over_full_match),
            Err(NavigationError::InvalidConfig(_))
        ));
        assert!(NavigationConfig::from_json(r#"{"arrival_tolerance": -1.0}"#).is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(NavigationConfig::from_json("{not json").is_err());
    }
}
