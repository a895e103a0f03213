//! Location snapping.
//!
//! Corrects a raw fix onto the route geometry around the current step.
//! A fix that cannot be trusted to be on the route is passed through
//! unmodified and flagged with `used_raw`.

use serde::Serialize;

use crate::config::NavigationConfig;
use crate::geometry::{self, angle_difference};
use crate::location::{Heading, Location};
use crate::progress::LegProgress;

/// A fix after snapping. Recomputed for every update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnappedLocation {
    pub location: Location,
    /// Snapping was rejected; `location` is the raw fix.
    pub used_raw: bool,
    /// The projection lies on the upcoming step.
    pub on_upcoming_step: bool,
    /// The projection landed on the upcoming step but was held at the end of the current step.
    pub clamped_to_current_step: bool,
}

impl SnappedLocation {
    fn raw(location: Location) -> Self {
        Self {
            location,
            used_raw: true,
            on_upcoming_step: false,
            clamped_to_current_step: false,
        }
    }
}

/// Snap `location` onto the geometry of `leg`.
///
/// `heading` supplies a course for fixes that report none.
pub fn snap(
    location: &Location,
    leg: &LegProgress,
    heading: Option<&Heading>,
    config: &NavigationConfig,
) -> SnappedLocation {
    match snap_to_route(location, leg, config) {
        Some(snapped) => snapped,
        None => {
            let mut raw = *location;
            if !raw.has_valid_course() {
                if let Some(h) =
                    heading.filter(|h| h.is_recent(location.timestamp, config.heading_max_age))
                {
                    raw.course = h.true_heading;
                }
            }
            SnappedLocation::raw(raw)
        }
    }
}

fn snap_to_route(
    location: &Location,
    leg: &LegProgress,
    config: &NavigationConfig,
) -> Option<SnappedLocation> {
    if !location.is_qualified(config.snapping_max_horizontal_accuracy) {
        return None;
    }

    let window = leg.nearby_window();
    let closest = geometry::closest_point(&window.coordinates, &location.coordinate)?;
    if closest.distance > config.maximum_snapping_distance {
        return None;
    }

    let route_course = geometry::interpolated_course(&closest.coordinate, &window.coordinates)?;
    if course_disagrees(location, leg, route_course, config) {
        log::trace!(
            "Not snapping: course {:.0} vs route {:.0}",
            location.course,
            route_course
        );
        return None;
    }

    let mut snapped = *location;
    let mut on_upcoming_step = window.is_upcoming_segment(closest.segment_index);
    let mut clamped_to_current_step = false;

    let course = if on_upcoming_step && must_hold_current_step(location, leg, config) {
        let current = leg.current_step();
        let end = current.last_coordinate();
        on_upcoming_step = false;
        clamped_to_current_step = true;
        snapped.coordinate = end;
        geometry::interpolated_course(&end, &current.coordinates).unwrap_or(route_course)
    } else {
        snapped.coordinate = closest.coordinate;
        route_course
    };

    snapped.course = if location.has_valid_course()
        && angle_difference(location.course, course) <= config.snapping_max_course_deviation
    {
        location.course
    } else {
        course
    };

    Some(SnappedLocation {
        location: snapped,
        used_raw: false,
        on_upcoming_step,
        clamped_to_current_step,
    })
}

/// A trustworthy reported course pointing away from the route direction.
fn course_disagrees(
    location: &Location,
    leg: &LegProgress,
    route_course: f64,
    config: &NavigationConfig,
) -> bool {
    if !location.has_valid_course() {
        return false;
    }
    let departing = in_departure_zone(location, leg, config);
    let fast_enough = location.speed >= config.snapping_minimum_speed || departing;
    let accurate = location.horizontal_accuracy < config.snapping_minimum_accuracy || departing;

    fast_enough
        && accurate
        && angle_difference(location.course, route_course) > config.snapping_max_course_deviation
}

/// On the first step, still within the maneuver zone of the leg origin.
fn in_departure_zone(location: &Location, leg: &LegProgress, config: &NavigationConfig) -> bool {
    leg.step_index() == 0
        && geometry::haversine(&location.coordinate, &leg.leg().source.coordinate)
            <= config.maneuver_zone_radius
}

/// Whether a projection onto the upcoming step must stay on the current step.
fn must_hold_current_step(location: &Location, leg: &LegProgress, config: &NavigationConfig) -> bool {
    if location.speed <= config.maximum_speed_for_current_step {
        return true;
    }
    let Some(upcoming) = leg.upcoming_step() else {
        return true;
    };
    if upcoming.maneuver_direction.is_sharp() {
        return true;
    }
    match upcoming.final_heading {
        Some(heading) => {
            !location.has_valid_course()
                || angle_difference(location.course, heading) > config.maximum_turn_completion_offset
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, fix};
    use crate::geometry::{destination, haversine};
    use crate::progress::RouteProgress;

    fn progress() -> RouteProgress {
        RouteProgress::new(fixtures::seven_step_route(), 0)
    }

    #[test]
    fn snaps_nearby_fix_onto_current_step() {
        let progress = progress();
        let leg = progress.current_leg_progress();
        let on_route = geometry::coordinate_at(&leg.current_step().coordinates, 100.0).unwrap();
        let off_by_ten = destination(&on_route, 10.0, 0.0);

        let snapped = snap(&fix(off_by_ten, 90.0, 10.0, 0.0), leg, None, &NavigationConfig::default());
        assert!(!snapped.used_raw);
        assert!(!snapped.on_upcoming_step);
        assert!(haversine(&snapped.location.coordinate, &on_route) < 0.5);
        assert_eq!(snapped.location.course, 90.0);
    }

    #[test]
    fn corrects_small_course_error_only() {
        let progress = progress();
        let leg = progress.current_leg_progress();
        let on_route = geometry::coordinate_at(&leg.current_step().coordinates, 100.0).unwrap();
        let config = NavigationConfig::default();

        // Within the allowed deviation the reported course wins
        let snapped = snap(&fix(on_route, 100.0, 10.0, 0.0), leg, None, &config);
        assert_eq!(snapped.location.course, 100.0);

        // Slow and untrusted: the route direction wins
        let slow = fix(on_route, 170.0, 1.5, 0.0);
        let snapped = snap(&slow, leg, None, &config);
        assert!(!snapped.used_raw);
        assert!(angle_difference(snapped.location.course, 90.0) < 0.5);
    }

    #[test]
    fn trusted_opposite_course_is_not_snapped() {
        let progress = progress();
        let leg = progress.current_leg_progress();
        let on_route = geometry::coordinate_at(&leg.current_step().coordinates, 100.0).unwrap();

        let wrong_way = fix(on_route, 270.0, 10.0, 0.0);
        let snapped = snap(&wrong_way, leg, None, &NavigationConfig::default());
        assert!(snapped.used_raw);
        assert_eq!(snapped.location, wrong_way);
    }

    #[test]
    fn far_or_inaccurate_fix_is_not_snapped() {
        let progress = progress();
        let leg = progress.current_leg_progress();
        let on_route = geometry::coordinate_at(&leg.current_step().coordinates, 100.0).unwrap();
        let config = NavigationConfig::default();

        let far = fix(destination(&on_route, 80.0, 180.0), 90.0, 10.0, 0.0);
        assert!(snap(&far, leg, None, &config).used_raw);

        let vague = fix(on_route, 90.0, 10.0, 0.0).with_accuracy(150.0);
        assert!(snap(&vague, leg, None, &config).used_raw);
    }

    #[test]
    fn stationary_fix_at_boundary_stays_on_current_step() {
        let progress = progress();
        let leg = progress.current_leg_progress();
        let corner = leg.current_step().last_coordinate();
        let just_past = destination(&corner, 5.0, 0.0);

        let stopped = fix(just_past, -1.0, 0.0, 0.0);
        let snapped = snap(&stopped, leg, None, &NavigationConfig::default());
        assert!(snapped.clamped_to_current_step);
        assert!(!snapped.on_upcoming_step);
        assert!(haversine(&snapped.location.coordinate, &corner) < 0.01);
    }

    #[test]
    fn moving_fix_with_matching_course_snaps_onto_upcoming_step() {
        let progress = progress();
        let leg = progress.current_leg_progress();
        let corner = leg.current_step().last_coordinate();
        let just_past = destination(&corner, 5.0, 0.0);

        let moving = fix(just_past, 0.0, 10.0, 0.0);
        let snapped = snap(&moving, leg, None, &NavigationConfig::default());
        assert!(snapped.on_upcoming_step);
        assert!(!snapped.clamped_to_current_step);
        assert!(haversine(&snapped.location.coordinate, &just_past) < 0.5);
    }

    #[test]
    fn moving_fix_still_on_old_course_is_held_back() {
        let progress = progress();
        let leg = progress.current_leg_progress();
        let corner = leg.current_step().last_coordinate();
        let just_past = destination(&corner, 5.0, 0.0);

        // Still heading east, 90 degrees off the upcoming step
        let moving = fix(just_past, 50.0, 2.0, 0.0);
        let snapped = snap(&moving, leg, None, &NavigationConfig::default());
        assert!(snapped.clamped_to_current_step);
    }

    #[test]
    fn unsnapped_fix_borrows_recent_heading() {
        let progress = progress();
        let leg = progress.current_leg_progress();
        let far = destination(&fixtures::ORIGIN, 500.0, 180.0);
        let heading = Heading {
            true_heading: 123.0,
            accuracy: 5.0,
            timestamp: 10.0,
        };

        let snapped = snap(&fix(far, -1.0, 0.0, 12.0), leg, Some(&heading), &NavigationConfig::default());
        assert!(snapped.used_raw);
        assert_eq!(snapped.location.course, 123.0);

        let stale = snap(&fix(far, -1.0, 0.0, 60.0), leg, Some(&heading), &NavigationConfig::default());
        assert_eq!(stale.location.course, -1.0);
    }
}
