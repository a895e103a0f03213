//! Off-route detection.

use serde::Serialize;

use crate::config::NavigationConfig;
use crate::geometry::{self, angle_difference};
use crate::location::Location;
use crate::progress::LegProgress;

/// Where a fix lies relative to the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    OnRoute,
    /// Close to a later step of the current leg.
    OnFutureStep(usize),
    OffRoute,
}

/// Per-session memory of the off-route check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseTracker {
    /// Consecutive fixes whose course disagreed with the route.
    movements_away_from_route: u32,
}

impl CourseTracker {
    pub fn reset(&mut self) {
        self.movements_away_from_route = 0;
    }

    pub fn movements_away_from_route(&self) -> u32 {
        self.movements_away_from_route
    }

    /// Count the fix and report whether the course still follows the route.
    fn course_is_on_route(
        &mut self,
        location: &Location,
        route_course: Option<f64>,
        config: &NavigationConfig,
    ) -> bool {
        let (Some(route_course), true) = (route_course, location.has_valid_course()) else {
            return true;
        };

        if angle_difference(location.course, route_course) <= config.snapping_max_course_deviation {
            self.movements_away_from_route = 0;
            return true;
        }

        self.movements_away_from_route += 1;
        let accuracy = location.horizontal_accuracy.max(0.0);
        let allowed = (config.min_incorrect_courses as f64)
            .max(accuracy / config.incorrect_course_multiplier);
        (self.movements_away_from_route as f64) < allowed
    }
}

/// Radius around the nearby geometry inside which a fix counts as on route.
///
/// Halved near an intersection of the current step, after the maneuver
/// zone and accuracy floors, so wrong turns there are caught sooner.
pub fn off_route_radius(location: &Location, leg: &LegProgress, config: &NavigationConfig) -> f64 {
    let accuracy_radius = location.horizontal_accuracy.max(0.0) * config.accuracy_radius_multiplier;
    let mut radius = config
        .rerouting_tolerance
        .max(config.maneuver_zone_radius)
        .max(accuracy_radius);

    let near_intersection = leg.current_step().intersections.iter().any(|i| {
        geometry::haversine(&location.coordinate, &i.location) <= config.maneuver_zone_radius
    });
    if near_intersection {
        radius /= 2.0;
    }
    radius.min(config.maximum_off_route_radius)
}

/// Decide whether `location` is on the route.
///
/// Checks the prior, current and upcoming steps first. When the fix is
/// not on them, later steps of the current leg are checked with the
/// tighter `user_location_snapping_distance`. Callers that suppress
/// rerouting after arrival skip this check entirely.
pub fn check(
    location: &Location,
    leg: &LegProgress,
    tracker: &mut CourseTracker,
    config: &NavigationConfig,
) -> RouteStatus {
    let nearby = leg.nearby_coordinates();
    if let Some(closest) = geometry::closest_point(nearby, &location.coordinate) {
        let radius = off_route_radius(location, leg, config);
        if closest.distance <= radius {
            let route_course = geometry::interpolated_course(&closest.coordinate, nearby);
            if tracker.course_is_on_route(location, route_course, config) {
                return RouteStatus::OnRoute;
            }
            log::debug!(
                "Course {:.0} left the route {} times in a row",
                location.course,
                tracker.movements_away_from_route
            );
        }
    }

    let later = leg.step_index() + 1;
    match leg.closest_step_from(later, &location.coordinate) {
        Some((index, distance)) if distance <= config.user_location_snapping_distance => {
            tracker.reset();
            RouteStatus::OnFutureStep(index)
        }
        _ => RouteStatus::OffRoute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, fix};
    use crate::geometry::destination;
    use crate::progress::RouteProgress;

    fn progress() -> RouteProgress {
        RouteProgress::new(fixtures::seven_step_route(), 0)
    }

    fn mid_first_step(progress: &RouteProgress) -> crate::geometry::Coordinate {
        let step = progress.current_leg_progress().current_step();
        geometry::coordinate_at(&step.coordinates, 100.0).unwrap()
    }

    #[test]
    fn fix_on_polyline_is_on_route() {
        let progress = progress();
        let on_route = mid_first_step(&progress);
        let status = check(
            &fix(on_route, 90.0, 10.0, 0.0),
            progress.current_leg_progress(),
            &mut CourseTracker::default(),
            &NavigationConfig::default(),
        );
        assert_eq!(status, RouteStatus::OnRoute);
    }

    #[test]
    fn fix_beyond_radius_is_off_route() {
        let progress = progress();
        let away = destination(&mid_first_step(&progress), 100.0, 180.0);
        let location = fix(away, 90.0, 10.0, 0.0).with_accuracy(10.0);
        let leg = progress.current_leg_progress();
        let config = NavigationConfig::default();

        assert_eq!(off_route_radius(&location, leg, &config), 50.0);
        let status = check(&location, leg, &mut CourseTracker::default(), &config);
        assert_eq!(status, RouteStatus::OffRoute);
    }

    #[test]
    fn radius_grows_with_accuracy_up_to_cap() {
        let progress = progress();
        let here = mid_first_step(&progress);
        let leg = progress.current_leg_progress();
        let config = NavigationConfig::default();

        let vague = fix(here, 90.0, 10.0, 0.0).with_accuracy(80.0);
        assert_eq!(off_route_radius(&vague, leg, &config), 80.0);
        let very_vague = fix(here, 90.0, 10.0, 0.0).with_accuracy(500.0);
        assert_eq!(off_route_radius(&very_vague, leg, &config), 100.0);
    }

    #[test]
    fn repeated_wrong_course_goes_off_route() {
        let progress = progress();
        let here = mid_first_step(&progress);
        let leg = progress.current_leg_progress();
        let config = NavigationConfig::default();
        let mut tracker = CourseTracker::default();

        let wrong_way = fix(here, 270.0, 10.0, 0.0);
        for _ in 0..3 {
            assert_eq!(check(&wrong_way, leg, &mut tracker, &config), RouteStatus::OnRoute);
        }
        assert_eq!(check(&wrong_way, leg, &mut tracker, &config), RouteStatus::OffRoute);

        // One fix along the route resets the count
        let right_way = fix(here, 90.0, 10.0, 0.0);
        assert_eq!(check(&right_way, leg, &mut tracker, &config), RouteStatus::OnRoute);
        assert_eq!(tracker.movements_away_from_route(), 0);
    }

    #[test]
    fn fix_on_later_step_is_future_step() {
        let progress = progress();
        let route = progress.route().clone();
        let on_step_two = geometry::coordinate_at(&route.legs()[0].steps[2].coordinates, 100.0).unwrap();

        let status = check(
            &fix(on_step_two, 90.0, 10.0, 0.0),
            progress.current_leg_progress(),
            &mut CourseTracker::default(),
            &NavigationConfig::default(),
        );
        assert_eq!(status, RouteStatus::OnFutureStep(2));
    }

    #[test]
    fn near_later_step_but_outside_snapping_distance_is_off_route() {
        let progress = progress();
        let route = progress.route().clone();
        let on_step_four = geometry::coordinate_at(&route.legs()[0].steps[4].coordinates, 100.0).unwrap();
        let beside = destination(&on_step_four, 30.0, 180.0);

        let status = check(
            &fix(beside, 90.0, 10.0, 0.0),
            progress.current_leg_progress(),
            &mut CourseTracker::default(),
            &NavigationConfig::default(),
        );
        assert_eq!(status, RouteStatus::OffRoute);
    }

    #[test]
    fn intersection_tightens_tolerance() {
        let progress = RouteProgress::new(fixtures::straight_route(), 0);
        let leg = progress.current_leg_progress();
        let here = leg.current_step().coordinates[0];
        let config = NavigationConfig::default();
        let location = fix(here, 0.0, 10.0, 0.0);
        assert_eq!(off_route_radius(&location, leg, &config), 50.0);

        let mut legs = fixtures::straight_route().legs().to_vec();
        legs[0].steps[0] = legs[0].steps[0].clone().with_intersection(here);
        let route = crate::route::Route::new(legs, None).unwrap();
        let progress = RouteProgress::new(std::sync::Arc::new(route), 0);
        let leg = progress.current_leg_progress();
        assert_eq!(off_route_radius(&location, leg, &config), 25.0);

        // Poor accuracy widens the radius before the intersection halves it
        let vague = location.with_accuracy(80.0);
        assert_eq!(off_route_radius(&vague, leg, &config), 40.0);
    }
}
