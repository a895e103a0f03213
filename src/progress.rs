//! Progress of a traveler along a route.
//!
//! [`RouteProgress`] owns a [`LegProgress`] which owns a
//! [`StepProgress`]. Derived values (remaining distance, fractions,
//! durations) are computed on demand from the route and the few stored
//! counters. Only the controller mutates progress.

use std::sync::Arc;

use serde::Serialize;

use crate::geometry::{self, Coordinate};
use crate::location::Location;
use crate::route::{Route, RouteLeg, RouteRequest, RouteStep, Waypoint};

/// Progress along the current step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepProgress {
    step_distance: f64,
    step_duration: f64,
    pub(crate) distance_traveled: f64,
    /// Straight-line distance from the last fix to the upcoming maneuver, in meters.
    pub(crate) user_distance_to_maneuver_location: f64,
    /// Number of spoken instructions whose trigger point has been passed.
    pub(crate) spoken_instruction_index: usize,
    /// Number of visual instructions whose trigger point has been passed.
    pub(crate) visual_instruction_index: usize,
    /// Index of the last intersection passed on this step.
    pub(crate) intersection_index: usize,
}

impl StepProgress {
    fn new(step: &RouteStep) -> Self {
        Self {
            step_distance: step.distance,
            step_duration: step.expected_travel_time,
            distance_traveled: 0.0,
            user_distance_to_maneuver_location: f64::INFINITY,
            spoken_instruction_index: 0,
            visual_instruction_index: 0,
            intersection_index: 0,
        }
    }

    pub fn distance_traveled(&self) -> f64 {
        self.distance_traveled
    }

    pub fn distance_remaining(&self) -> f64 {
        (self.step_distance - self.distance_traveled).max(0.0)
    }

    /// Fraction in [0, 1]. Zero-length steps count as fully traveled.
    pub fn fraction_traveled(&self) -> f64 {
        if self.step_distance <= 0.0 {
            return 1.0;
        }
        (self.distance_traveled / self.step_distance).clamp(0.0, 1.0)
    }

    pub fn duration_remaining(&self) -> f64 {
        (1.0 - self.fraction_traveled()) * self.step_duration
    }

    pub fn user_distance_to_maneuver_location(&self) -> f64 {
        self.user_distance_to_maneuver_location
    }

    pub fn spoken_instruction_index(&self) -> usize {
        self.spoken_instruction_index
    }

    pub fn visual_instruction_index(&self) -> usize {
        self.visual_instruction_index
    }

    pub fn intersection_index(&self) -> usize {
        self.intersection_index
    }

    /// Record that the traveler is `along` meters into the step.
    ///
    /// Never moves backwards and never exceeds the step distance.
    pub(crate) fn record_distance(&mut self, along: f64) {
        let clamped = along.clamp(0.0, self.step_distance.max(0.0));
        self.distance_traveled = self.distance_traveled.max(clamped);
    }
}

/// Geometry of the prior, current and upcoming steps, concatenated.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NearbyWindow {
    pub(crate) coordinates: Vec<Coordinate>,
    /// Vertex index where the current step begins.
    pub(crate) current_start: usize,
    /// Vertex index where the upcoming step begins.
    pub(crate) upcoming_start: Option<usize>,
}

impl NearbyWindow {
    /// True when the segment starting at `segment_index` belongs to the upcoming step.
    pub(crate) fn is_upcoming_segment(&self, segment_index: usize) -> bool {
        self.upcoming_start.is_some_and(|start| segment_index >= start)
    }
}

/// Progress along the current leg.
#[derive(Debug, Clone)]
pub struct LegProgress {
    route: Arc<Route>,
    leg_index: usize,
    step_index: usize,
    pub(crate) user_has_arrived_at_waypoint: bool,
    pub(crate) current_step_progress: StepProgress,
    nearby: NearbyWindow,
}

impl LegProgress {
    fn new(route: Arc<Route>, leg_index: usize) -> Self {
        let nearby = nearby_window(&route.legs()[leg_index], 0);
        let current_step_progress = StepProgress::new(&route.legs()[leg_index].steps[0]);
        Self {
            route,
            leg_index,
            step_index: 0,
            user_has_arrived_at_waypoint: false,
            current_step_progress,
            nearby,
        }
    }

    pub fn leg(&self) -> &RouteLeg {
        &self.route.legs()[self.leg_index]
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn user_has_arrived_at_waypoint(&self) -> bool {
        self.user_has_arrived_at_waypoint
    }

    pub fn current_step_progress(&self) -> &StepProgress {
        &self.current_step_progress
    }

    pub fn current_step(&self) -> &RouteStep {
        &self.leg().steps[self.step_index]
    }

    pub fn prior_step(&self) -> Option<&RouteStep> {
        self.step_index
            .checked_sub(1)
            .and_then(|i| self.leg().steps.get(i))
    }

    pub fn upcoming_step(&self) -> Option<&RouteStep> {
        self.leg().steps.get(self.step_index + 1)
    }

    pub fn follow_on_step(&self) -> Option<&RouteStep> {
        self.leg().steps.get(self.step_index + 2)
    }

    /// Steps after the current one.
    pub fn remaining_steps(&self) -> &[RouteStep] {
        &self.leg().steps[self.step_index + 1..]
    }

    /// True on the zero-length arrival step.
    pub fn is_on_final_step(&self) -> bool {
        self.step_index == self.leg().last_step_index()
    }

    /// Prior, current and upcoming step geometry as one polyline.
    pub fn nearby_coordinates(&self) -> &[Coordinate] {
        &self.nearby.coordinates
    }

    pub(crate) fn nearby_window(&self) -> &NearbyWindow {
        &self.nearby
    }

    pub fn distance_traveled(&self) -> f64 {
        let before: f64 = self.leg().steps[..self.step_index]
            .iter()
            .map(|s| s.distance)
            .sum();
        before + self.current_step_progress.distance_traveled()
    }

    pub fn distance_remaining(&self) -> f64 {
        let after: f64 = self.remaining_steps().iter().map(|s| s.distance).sum();
        after + self.current_step_progress.distance_remaining()
    }

    pub fn duration_remaining(&self) -> f64 {
        let after: f64 = self
            .remaining_steps()
            .iter()
            .map(|s| s.expected_travel_time)
            .sum();
        after + self.current_step_progress.duration_remaining()
    }

    pub fn fraction_traveled(&self) -> f64 {
        let total = self.leg().distance;
        if total <= 0.0 {
            return 1.0;
        }
        (self.distance_traveled() / total).clamp(0.0, 1.0)
    }

    /// The current or a later step nearest to `coordinate`, with its distance.
    ///
    /// Ties go to the earlier step.
    pub fn closest_step(&self, coordinate: &Coordinate) -> Option<(usize, f64)> {
        self.closest_step_from(self.step_index, coordinate)
    }

    pub(crate) fn closest_step_from(
        &self,
        first_index: usize,
        coordinate: &Coordinate,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (index, step) in self.leg().steps.iter().enumerate().skip(first_index) {
            let Some(closest) = geometry::closest_point(&step.coordinates, coordinate) else {
                continue;
            };
            if best.map_or(true, |(_, d)| closest.distance < d) {
                best = Some((index, closest.distance));
            }
        }
        best
    }

    /// Move to `index`, clamped to the arrival step, and reset step progress.
    pub(crate) fn set_step_index(&mut self, index: usize) {
        let index = index.min(self.leg().last_step_index());
        self.step_index = index;
        self.current_step_progress = StepProgress::new(&self.leg().steps[index]);
        self.nearby = nearby_window(self.leg(), index);
    }
}

fn nearby_window(leg: &RouteLeg, step_index: usize) -> NearbyWindow {
    let mut coordinates = Vec::new();
    if let Some(prior) = step_index.checked_sub(1).and_then(|i| leg.steps.get(i)) {
        coordinates.extend_from_slice(&prior.coordinates);
    }
    let current_start = coordinates.len();
    coordinates.extend_from_slice(&leg.steps[step_index].coordinates);

    let upcoming_start = leg.steps.get(step_index + 1).map(|upcoming| {
        let start = coordinates.len();
        coordinates.extend_from_slice(&upcoming.coordinates);
        start
    });

    NearbyWindow {
        coordinates,
        current_start,
        upcoming_start,
    }
}

/// Root progress state of a navigation session.
#[derive(Debug, Clone)]
pub struct RouteProgress {
    route: Arc<Route>,
    leg_index: usize,
    current_leg_progress: LegProgress,
}

impl RouteProgress {
    /// Progress at the start of leg `leg_index` (clamped to the last leg).
    pub fn new(route: Arc<Route>, leg_index: usize) -> Self {
        let leg_index = leg_index.min(route.legs().len().saturating_sub(1));
        Self {
            current_leg_progress: LegProgress::new(Arc::clone(&route), leg_index),
            route,
            leg_index,
        }
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn leg_index(&self) -> usize {
        self.leg_index
    }

    pub fn current_leg(&self) -> &RouteLeg {
        &self.route.legs()[self.leg_index]
    }

    pub fn current_leg_progress(&self) -> &LegProgress {
        &self.current_leg_progress
    }

    pub(crate) fn current_leg_progress_mut(&mut self) -> &mut LegProgress {
        &mut self.current_leg_progress
    }

    pub fn is_final_leg(&self) -> bool {
        self.leg_index + 1 >= self.route.legs().len()
    }

    /// Destinations of the current and all later legs.
    pub fn remaining_waypoints(&self) -> Vec<Waypoint> {
        self.route.legs()[self.leg_index..]
            .iter()
            .map(|leg| leg.destination.clone())
            .collect()
    }

    pub fn distance_traveled(&self) -> f64 {
        let before: f64 = self.route.legs()[..self.leg_index]
            .iter()
            .map(|l| l.distance)
            .sum();
        before + self.current_leg_progress.distance_traveled()
    }

    pub fn distance_remaining(&self) -> f64 {
        let after: f64 = self.route.legs()[self.leg_index + 1..]
            .iter()
            .map(|l| l.distance)
            .sum();
        after + self.current_leg_progress.distance_remaining()
    }

    pub fn duration_remaining(&self) -> f64 {
        let after: f64 = self.route.legs()[self.leg_index + 1..]
            .iter()
            .map(|l| l.expected_travel_time)
            .sum();
        after + self.current_leg_progress.duration_remaining()
    }

    pub fn fraction_traveled(&self) -> f64 {
        if self.route.distance() <= 0.0 {
            return 1.0;
        }
        (1.0 - self.distance_remaining() / self.route.distance()).clamp(0.0, 1.0)
    }

    /// Geometry still ahead: the rest of the current step, later steps and later legs.
    pub fn remaining_geometry(&self) -> Vec<Coordinate> {
        let leg_progress = &self.current_leg_progress;
        let step = leg_progress.current_step();
        let traveled = leg_progress.current_step_progress.distance_traveled();

        let mut line = geometry::coordinate_at(&step.coordinates, traveled)
            .and_then(|at| geometry::closest_point(&step.coordinates, &at))
            .map(|closest| geometry::trimmed_from(&step.coordinates, &closest))
            .unwrap_or_else(|| vec![step.last_coordinate()]);

        let later_steps = leg_progress.remaining_steps().iter();
        let later_legs = self.route.legs()[self.leg_index + 1..]
            .iter()
            .flat_map(|leg| leg.steps.iter());
        for c in later_steps
            .chain(later_legs)
            .flat_map(|s| s.coordinates.iter())
        {
            if line.last() != Some(c) {
                line.push(*c);
            }
        }
        line
    }

    /// Directions request continuing from `location` to the remaining destinations.
    ///
    /// The fix becomes the origin; its course, when known, is passed on as
    /// the origin heading with `heading_accuracy` degrees of tolerance.
    pub fn reroute_request(&self, location: &Location, heading_accuracy: f64) -> RouteRequest {
        let mut origin = Waypoint::new(location.coordinate);
        if location.has_valid_course() {
            origin.heading = Some(location.course);
            origin.heading_accuracy = Some(heading_accuracy);
        }

        let mut waypoints = vec![origin];
        waypoints.extend(self.remaining_waypoints());
        RouteRequest {
            waypoints,
            profile: self.route.profile().map(String::from),
        }
    }

    /// Start the next leg. Clamped at the last leg; returns false there.
    pub(crate) fn advance_leg(&mut self) -> bool {
        if self.is_final_leg() {
            return false;
        }
        self.leg_index += 1;
        self.current_leg_progress = LegProgress::new(Arc::clone(&self.route), self.leg_index);
        true
    }
}

/// Serializable summary of a [`RouteProgress`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub leg_index: usize,
    pub step_index: usize,
    pub distance_traveled: f64,
    pub distance_remaining: f64,
    pub duration_remaining: f64,
    pub fraction_traveled: f64,
    pub step_distance_remaining: f64,
    pub user_distance_to_maneuver_location: f64,
    pub spoken_instruction_index: usize,
    pub visual_instruction_index: usize,
    pub intersection_index: usize,
    pub user_has_arrived_at_waypoint: bool,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upcoming_instruction: Option<String>,
}

impl From<&RouteProgress> for ProgressSnapshot {
    fn from(progress: &RouteProgress) -> Self {
        let leg = progress.current_leg_progress();
        let step = leg.current_step_progress();
        let to_maneuver = step.user_distance_to_maneuver_location();
        Self {
            leg_index: progress.leg_index(),
            step_index: leg.step_index(),
            distance_traveled: progress.distance_traveled(),
            distance_remaining: progress.distance_remaining(),
            duration_remaining: progress.duration_remaining(),
            fraction_traveled: progress.fraction_traveled(),
            step_distance_remaining: step.distance_remaining(),
            // JSON has no infinity
            user_distance_to_maneuver_location: if to_maneuver.is_finite() { to_maneuver } else { -1.0 },
            spoken_instruction_index: step.spoken_instruction_index(),
            visual_instruction_index: step.visual_instruction_index(),
            intersection_index: step.intersection_index(),
            user_has_arrived_at_waypoint: leg.user_has_arrived_at_waypoint(),
            instruction: leg.current_step().instruction.clone(),
            upcoming_instruction: leg.upcoming_step().map(|s| s.instruction.clone()),
        }
    }
}
