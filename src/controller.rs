//! Route controller: the navigation state machine.
//!
//! One [`RouteController`] tracks one traveler along one route. Every
//! fix runs through the same pipeline: filtering, snapping, the
//! off-route check, step and leg advancement, then progress
//! notification. Directions requests are fire-and-forget; their results
//! come back later through [`RouteController::handle_directions_response`].
//!
//! Inside tunnels, and on request when the receiver falls silent, the
//! controller feeds itself positions estimated along the route from the
//! last known speed.

use std::sync::Arc;

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::comparator::{self, RerouteReason, ReroutePolicy};
use crate::config::NavigationConfig;
use crate::error::NavigationError;
use crate::geometry::{self, angle_difference, Coordinate};
use crate::location::{Heading, Location, LocationSource, LocationUpdate};
use crate::off_route::{self, CourseTracker, RouteStatus};
use crate::progress::RouteProgress;
use crate::route::{Route, RouteRequest, Waypoint};
use crate::snapping::{self, SnappedLocation};
use crate::stats::SessionStats;
use crate::tunnel::{self, StepKey, TunnelTracker};

/// Identifies one directions request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RequestId(pub u64);

/// Computes routes on behalf of the controller.
///
/// `calculate_route` only dispatches; the host delivers the outcome
/// through [`RouteController::handle_directions_response`] with the
/// same id.
pub trait DirectionsProvider {
    fn calculate_route(&mut self, id: RequestId, request: RouteRequest);

    /// The response to `id` is no longer wanted.
    fn cancel(&mut self, _id: RequestId) {}
}

/// Observer of a navigation session. Every method has a default.
pub trait NavigationDelegate {
    fn should_reroute(&mut self, _location: &Location) -> bool {
        true
    }

    fn will_reroute(&mut self, _location: &Location) {}

    fn did_reroute(&mut self, _route: &Arc<Route>, _reason: RerouteReason) {}

    fn did_fail_to_reroute(&mut self, _error: &NavigationError) {}

    /// A proactive alternative was found but not adopted.
    fn did_decline_reroute(&mut self, _error: &NavigationError) {}

    fn progress_did_update(
        &mut self,
        _progress: &RouteProgress,
        _location: &Location,
        _raw_location: &Location,
    ) {
    }

    /// Returning true continues with the next leg, if any.
    fn did_arrive(&mut self, _waypoint: &Waypoint) -> bool {
        true
    }

    /// Asked for fixes with poor accuracy once an accurate one has been seen.
    fn should_discard_location(&mut self, _location: &Location) -> bool {
        true
    }

    fn should_prevent_reroutes_when_arrived(&mut self, _waypoint: &Waypoint) -> bool {
        true
    }

    /// Positions are estimated along the route from here on.
    fn will_enter_tunnel(&mut self, _location: &Location) {}

    fn did_exit_tunnel(&mut self, _location: &Location) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationState {
    Tracking,
    Rerouting,
    Arrived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Diversion,
    Proactive,
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    id: RequestId,
    kind: RequestKind,
}

pub struct RouteController {
    config: NavigationConfig,
    progress: RouteProgress,
    state: NavigationState,
    provider: Box<dyn DirectionsProvider>,
    delegate: Option<Box<dyn NavigationDelegate>>,
    location_source: Option<Box<dyn LocationSource>>,
    raw_location: Option<Location>,
    snapped_location: Option<SnappedLocation>,
    heading: Option<Heading>,
    has_qualified_location: bool,
    course_tracker: CourseTracker,
    pending: Option<PendingRequest>,
    next_request_id: u64,
    last_reroute_origin: Option<Coordinate>,
    last_proactive_check: Option<f64>,
    previous_arrival_waypoint: Option<Waypoint>,
    tunnel: TunnelTracker,
    stats: SessionStats,
    ended: bool,
}

impl RouteController {
    pub fn new(
        route: Arc<Route>,
        config: NavigationConfig,
        provider: Box<dyn DirectionsProvider>,
    ) -> Result<Self, NavigationError> {
        config.validate()?;
        info!(
            "Starting navigation: {} leg(s), {:.0} m",
            route.legs().len(),
            route.distance()
        );
        Ok(Self {
            config,
            progress: RouteProgress::new(route, 0),
            state: NavigationState::Tracking,
            provider,
            delegate: None,
            location_source: None,
            raw_location: None,
            snapped_location: None,
            heading: None,
            has_qualified_location: false,
            course_tracker: CourseTracker::default(),
            pending: None,
            next_request_id: 1,
            last_reroute_origin: None,
            last_proactive_check: None,
            previous_arrival_waypoint: None,
            tunnel: TunnelTracker::default(),
            stats: SessionStats::default(),
            ended: false,
        })
    }

    pub fn set_delegate(&mut self, delegate: Box<dyn NavigationDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn set_location_source(&mut self, source: Box<dyn LocationSource>) {
        self.location_source = Some(source);
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn progress(&self) -> &RouteProgress {
        &self.progress
    }

    pub fn route(&self) -> &Arc<Route> {
        self.progress.route()
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    /// The last accepted fix after snapping.
    pub fn location(&self) -> Option<&SnappedLocation> {
        self.snapped_location.as_ref()
    }

    pub fn raw_location(&self) -> Option<&Location> {
        self.raw_location.as_ref()
    }

    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending.map(|p| p.id)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn is_in_tunnel(&self) -> bool {
        self.tunnel.is_inside()
    }

    pub fn session_stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Process one raw fix.
    pub fn update_location(&mut self, raw: Location) {
        if self.ended {
            trace!("Navigation ended, ignoring location");
            return;
        }
        if !raw.is_sane() {
            trace!("Discarding non-finite or out-of-range fix");
            return;
        }
        self.stats.record_location(&raw, self.config.past_locations_limit);
        self.track_tunnel(&raw);

        let accepted = self.accept_location(&raw);
        if self.tunnel.is_inside() {
            if let Some(estimate) = self.dead_reckoned_location(raw.timestamp) {
                trace!("In tunnel, using estimated position");
                self.process(estimate);
                return;
            }
        }
        if let Err(reason) = accepted {
            trace!("{reason}");
            return;
        }
        self.process(raw);
    }

    /// Move along the route from the last fix at its speed, as of `now`.
    ///
    /// For hosts whose receiver has stopped delivering fixes. Does
    /// nothing unless `dead_reckoning_enabled` is set, the controller is
    /// tracking, and the last fix was moving. Returns true when an
    /// estimated fix was processed.
    pub fn dead_reckon(&mut self, now: f64) -> bool {
        if self.ended
            || !self.config.dead_reckoning_enabled
            || self.state != NavigationState::Tracking
        {
            return false;
        }
        let moving = self
            .raw_location
            .is_some_and(|last| last.speed > 0.0 && now > last.timestamp);
        if !moving {
            return false;
        }
        let Some(estimate) = self.dead_reckoned_location(now) else {
            return false;
        };
        debug!(
            "Dead reckoning to {:.6},{:.6}",
            estimate.coordinate.lat, estimate.coordinate.lon
        );
        self.process(estimate);
        true
    }

    fn process(&mut self, raw: Location) {
        let mut snapped = self.snap(&raw);
        self.raw_location = Some(raw);
        self.snapped_location = Some(snapped);

        let status = self.route_status(&raw);
        match status {
            RouteStatus::OnRoute => {}
            RouteStatus::OnFutureStep(index) => {
                debug!(
                    "Skipping from step {} to step {index}",
                    self.progress.current_leg_progress().step_index()
                );
                self.progress.current_leg_progress_mut().set_step_index(index);
                self.course_tracker.reset();
                snapped = self.snap(&raw);
                self.snapped_location = Some(snapped);
            }
            RouteStatus::OffRoute => {
                if self.state == NavigationState::Rerouting {
                    trace!("Still off route, reroute already pending");
                    return;
                }
                let wants_reroute = self
                    .delegate
                    .as_mut()
                    .map_or(true, |d| d.should_reroute(&raw));
                if wants_reroute {
                    self.reroute_for_diversion(&raw);
                    return;
                }
            }
        }

        if status != RouteStatus::OffRoute
            && !snapped.clamped_to_current_step
            && self.should_advance_step(&snapped, &raw)
        {
            self.advance_step();
        }
        self.update_step_progress(&snapped.location);
        self.stats.record_progress(self.progress.distance_traveled());
        self.check_arrival(raw.timestamp);
        self.check_proactive_reroute(&raw);

        if let Some(delegate) = self.delegate.as_mut() {
            delegate.progress_did_update(&self.progress, &snapped.location, &raw);
        }
    }

    /// Store a compass reading for fixes that report no course.
    pub fn update_heading(&mut self, heading: Heading) {
        if heading.is_qualified() {
            self.heading = Some(heading);
        } else {
            trace!("Ignoring unqualified heading {:.0}", heading.true_heading);
        }
    }

    /// Feed up to `max_updates` pending updates from the location source.
    ///
    /// Returns how many were processed.
    pub fn pump_location_source(&mut self, max_updates: usize) -> usize {
        let mut processed = 0;
        while processed < max_updates {
            let Some(update) = self.location_source.as_mut().and_then(|s| s.next_update()) else {
                break;
            };
            match update {
                LocationUpdate::Location(location) => self.update_location(location),
                LocationUpdate::Heading(heading) => self.update_heading(heading),
            }
            processed += 1;
        }
        processed
    }

    /// Deliver the outcome of a directions request.
    ///
    /// Responses for anything but the outstanding request are ignored.
    pub fn handle_directions_response(
        &mut self,
        id: RequestId,
        result: Result<Vec<Route>, NavigationError>,
    ) {
        if self.ended {
            debug!("Navigation ended, ignoring response {}", id.0);
            return;
        }
        let Some(pending) = self.pending.filter(|p| p.id == id) else {
            debug!("Ignoring stale directions response {}", id.0);
            return;
        };
        self.pending = None;

        match pending.kind {
            RequestKind::Diversion => self.finish_diversion(result),
            RequestKind::Proactive => self.finish_proactive(result),
        }
    }

    /// Replace the route and start over on its first leg.
    pub fn set_route(&mut self, route: Arc<Route>) {
        self.cancel_pending();
        info!("Route replaced: {:.0} m", route.distance());
        self.stats.record_route_replaced(self.progress.distance_traveled());
        self.tunnel = TunnelTracker::default();
        self.progress = RouteProgress::new(Arc::clone(&route), 0);
        self.state = NavigationState::Tracking;
        self.course_tracker.reset();
        self.last_reroute_origin = None;
        self.last_proactive_check = None;
        self.previous_arrival_waypoint = None;
        if let Some(source) = self.location_source.as_mut() {
            source.route_did_change(&route);
        }
    }

    /// Continue with the next leg after an arrival that did not advance.
    ///
    /// Returns false on the final leg.
    pub fn advance_leg(&mut self) -> bool {
        if !self.progress.advance_leg() {
            debug!("Already on the final leg");
            return false;
        }
        info!("Starting leg {}", self.progress.leg_index());
        self.state = NavigationState::Tracking;
        self.course_tracker.reset();
        true
    }

    /// Stop the session. Later fixes and responses are ignored.
    pub fn end_navigation(&mut self) {
        self.cancel_pending();
        self.ended = true;
        info!("Navigation ended");
    }

    fn accept_location(&mut self, raw: &Location) -> Result<(), NavigationError> {
        if raw.is_qualified(self.config.maximum_qualified_accuracy) {
            self.has_qualified_location = true;
            return Ok(());
        }
        let discard = self.has_qualified_location
            && self
                .delegate
                .as_mut()
                .map_or(true, |d| d.should_discard_location(raw));
        if discard {
            return Err(NavigationError::DiscardedLocation(format!(
                "horizontal accuracy {:.0} m",
                raw.horizontal_accuracy
            )));
        }
        Ok(())
    }

    fn step_key(&self) -> StepKey {
        (
            self.progress.leg_index(),
            self.progress.current_leg_progress().step_index(),
        )
    }

    fn track_tunnel(&mut self, raw: &Location) {
        if !self.config.tunnel_simulation_enabled {
            return;
        }
        let step = self.step_key();
        let qualified = raw.is_qualified(self.config.maximum_qualified_accuracy);
        if self.tunnel.is_inside() {
            if qualified && self.tunnel.record_qualified_fix(&self.config, step) {
                info!("Left tunnel");
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.did_exit_tunnel(raw);
                }
            }
            return;
        }
        if qualified && self.tunnel.exited_on(step) {
            return;
        }
        if tunnel::at_tunnel_entrance(raw, self.progress.current_leg_progress(), &self.config)
            && self.tunnel.enter()
        {
            info!(
                "Entering tunnel at {:.6},{:.6}",
                raw.coordinate.lat, raw.coordinate.lon
            );
            if let Some(delegate) = self.delegate.as_mut() {
                delegate.will_enter_tunnel(raw);
            }
        }
    }

    /// Position `now` when moving along the route at the last fix's speed.
    ///
    /// The course points at where the traveler will be two seconds
    /// further on.
    fn dead_reckoned_location(&self, now: f64) -> Option<Location> {
        let last = self.raw_location?;
        let speed = last.speed.max(0.0);
        let elapsed = (now - last.timestamp).max(0.0);
        let line = self.route().coordinates();
        let along = self.progress.distance_traveled() + speed * elapsed;
        let at = |meters: f64| geometry::coordinate_at(line, meters).or_else(|| line.last().copied());

        let coordinate = at(along)?;
        let course = match at(along + 2.0 * speed) {
            Some(ahead) if speed > 0.0 && ahead != coordinate => geometry::bearing(&coordinate, &ahead),
            _ => last.course,
        };
        Some(
            last.with_coordinate(coordinate)
                .with_course(course)
                .with_speed(speed)
                .with_timestamp(now.max(last.timestamp)),
        )
    }

    fn snap(&self, raw: &Location) -> SnappedLocation {
        snapping::snap(
            raw,
            self.progress.current_leg_progress(),
            self.heading.as_ref(),
            &self.config,
        )
    }

    fn route_status(&mut self, raw: &Location) -> RouteStatus {
        if self.progress.current_leg_progress().user_has_arrived_at_waypoint() {
            let destination = &self.progress.current_leg().destination;
            let prevent = self
                .delegate
                .as_mut()
                .map_or(true, |d| d.should_prevent_reroutes_when_arrived(destination));
            if prevent {
                return RouteStatus::OnRoute;
            }
        }
        off_route::check(
            raw,
            self.progress.current_leg_progress(),
            &mut self.course_tracker,
            &self.config,
        )
    }

    fn should_advance_step(&self, snapped: &SnappedLocation, raw: &Location) -> bool {
        let leg = self.progress.current_leg_progress();
        let Some(upcoming) = leg.upcoming_step() else {
            return false;
        };
        if snapped.on_upcoming_step {
            return true;
        }

        let position = &snapped.location.coordinate;
        let to_maneuver_location = geometry::haversine(position, &upcoming.maneuver_location);
        if to_maneuver_location > self.config.maneuver_zone_radius {
            return false;
        }

        let offset = self.config.maximum_turn_completion_offset;
        let current = leg.current_step();
        if upcoming.is_arrival() || upcoming.is_straight(offset) {
            let reached = if upcoming.is_arrival() {
                self.config.arrival_tolerance
            } else {
                self.config.maneuver_reached_distance
            };
            let along_remaining = geometry::closest_point(&current.coordinates, position)
                .map(|c| geometry::distance_remaining(&current.coordinates, &c));
            if along_remaining.is_some_and(|d| d <= reached) {
                return true;
            }
        } else if raw.has_valid_course()
            && upcoming
                .final_heading
                .is_some_and(|h| angle_difference(raw.course, h) <= offset)
        {
            return true;
        }

        let previous = leg.current_step_progress().user_distance_to_maneuver_location();
        previous.is_finite() && to_maneuver_location > previous + self.config.moving_away_margin
    }

    fn advance_step(&mut self) {
        let leg = self.progress.current_leg_progress_mut();
        let next = leg.step_index() + 1;
        leg.set_step_index(next);
        self.course_tracker.reset();
        debug!("Advanced to step {next}");
    }

    fn update_step_progress(&mut self, location: &Location) {
        let route = Arc::clone(self.progress.route());
        let leg_index = self.progress.leg_index();
        let leg_progress = self.progress.current_leg_progress_mut();
        let steps = &route.legs()[leg_index].steps;
        let step_index = leg_progress.step_index();
        let step = &steps[step_index];
        let maneuver = steps
            .get(step_index + 1)
            .map_or(step.last_coordinate(), |s| s.maneuver_location);

        let progress = &mut leg_progress.current_step_progress;
        if let Some(closest) = geometry::closest_point(&step.coordinates, &location.coordinate) {
            progress.record_distance(closest.distance_along);
        }
        progress.user_distance_to_maneuver_location =
            geometry::haversine(&location.coordinate, &maneuver);

        let remaining = progress.distance_remaining();
        let spoken = step
            .spoken_instructions
            .iter()
            .take_while(|i| remaining <= i.trigger_distance)
            .count();
        progress.spoken_instruction_index = progress.spoken_instruction_index.max(spoken);
        let visual = step
            .visual_instructions
            .iter()
            .take_while(|i| remaining <= i.trigger_distance)
            .count();
        progress.visual_instruction_index = progress.visual_instruction_index.max(visual);

        let traveled = progress.distance_traveled();
        let passed = step
            .intersections
            .iter()
            .take_while(|i| i.distance_along_step <= traveled)
            .count();
        progress.intersection_index = progress.intersection_index.max(passed.saturating_sub(1));
    }

    fn check_arrival(&mut self, timestamp: f64) {
        if !self.progress.current_leg_progress().is_on_final_step() {
            return;
        }
        let destination = self.progress.current_leg().destination.clone();
        if self.previous_arrival_waypoint.as_ref() == Some(&destination) {
            return;
        }
        self.previous_arrival_waypoint = Some(destination.clone());
        self.progress
            .current_leg_progress_mut()
            .user_has_arrived_at_waypoint = true;
        info!(
            "Arrived at {}",
            destination.name.as_deref().unwrap_or("waypoint")
        );
        if self.progress.is_final_leg() {
            self.stats.record_arrival(Some(timestamp));
        }

        let continue_to_next = self
            .delegate
            .as_mut()
            .map_or(true, |d| d.did_arrive(&destination));
        if continue_to_next && self.progress.advance_leg() {
            info!("Starting leg {}", self.progress.leg_index());
            self.course_tracker.reset();
            self.state = NavigationState::Tracking;
        } else {
            self.state = NavigationState::Arrived;
        }
    }

    fn check_proactive_reroute(&mut self, raw: &Location) {
        if !self.config.reroutes_proactively
            || self.state != NavigationState::Tracking
            || self.pending.is_some()
        {
            return;
        }
        let now = raw.timestamp;
        let Some(last) = self.last_proactive_check else {
            self.last_proactive_check = Some(now);
            return;
        };
        if now - last < self.config.proactive_reroute_interval {
            return;
        }
        self.last_proactive_check = Some(now);

        let remaining = self.progress.duration_remaining();
        if remaining <= self.config.proactive_minimum_duration_remaining
            && !self.config.check_for_reroute_in_last_minutes
        {
            trace!("Too close to the destination for a route check");
            return;
        }
        let step_remaining = self
            .progress
            .current_leg_progress()
            .current_step_progress()
            .duration_remaining();
        if step_remaining <= self.config.medium_alert_interval {
            trace!("Maneuver too close for a route check");
            return;
        }

        debug!("Checking for a better route, {remaining:.0} s remaining");
        self.request_route(raw, RequestKind::Proactive);
    }

    fn reroute_for_diversion(&mut self, raw: &Location) {
        if let Some(origin) = self.last_reroute_origin {
            if geometry::haversine(&origin, &raw.coordinate) < self.config.rerouting_tolerance {
                trace!("Too close to the last reroute origin");
                return;
            }
        }
        if let Some(pending) = self.pending.take() {
            debug!("Diversion supersedes request {}", pending.id.0);
            self.provider.cancel(pending.id);
        }

        info!(
            "Off route at {:.6},{:.6}, requesting a new route",
            raw.coordinate.lat, raw.coordinate.lon
        );
        self.last_reroute_origin = Some(raw.coordinate);
        self.state = NavigationState::Rerouting;
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.will_reroute(raw);
        }
        self.request_route(raw, RequestKind::Diversion);
    }

    fn request_route(&mut self, location: &Location, kind: RequestKind) {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        let request = self
            .progress
            .reroute_request(location, self.config.rerouting_heading_accuracy);
        self.pending = Some(PendingRequest { id, kind });
        self.provider.calculate_route(id, request);
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("Cancelling request {}", pending.id.0);
            self.provider.cancel(pending.id);
        }
        if self.state == NavigationState::Rerouting {
            self.state = NavigationState::Tracking;
        }
    }

    fn finish_diversion(&mut self, result: Result<Vec<Route>, NavigationError>) {
        self.state = NavigationState::Tracking;
        let routes = match result {
            Ok(routes) if !routes.is_empty() => routes,
            Ok(_) => return self.fail_reroute(NavigationError::NoCandidateRoute),
            Err(error) => return self.fail_reroute(error),
        };

        let current = self.progress.remaining_geometry();
        let geometries: Vec<&[Coordinate]> = routes.iter().map(|r| r.coordinates()).collect();
        let index = comparator::best_match(&current, &geometries, self.config.route_match_cell_size)
            .map_or(0, |best| {
                debug!(
                    "Candidate {} matches {:.0}% of the old route",
                    best.index, best.match_percentage
                );
                best.index
            });

        if let Some(route) = routes.into_iter().nth(index) {
            self.adopt_route(Arc::new(route), RerouteReason::DivertedFromRoute);
        }
    }

    fn finish_proactive(&mut self, result: Result<Vec<Route>, NavigationError>) {
        let routes = match result {
            Ok(routes) => routes,
            Err(error) => {
                debug!("Route check failed: {error}");
                return;
            }
        };

        let current = self.progress.remaining_geometry();
        let candidates: Vec<(&[Coordinate], f64)> = routes
            .iter()
            .map(|r| (r.coordinates(), r.expected_travel_time()))
            .collect();
        let selection = comparator::select_reroute(
            &current,
            self.progress.duration_remaining(),
            &candidates,
            &ReroutePolicy::from(&self.config),
        );

        match selection {
            Ok(selection) => {
                if let Some(route) = routes.into_iter().nth(selection.candidate.index) {
                    self.adopt_route(Arc::new(route), selection.reason);
                }
            }
            Err(error) => {
                debug!("Keeping current route: {error}");
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.did_decline_reroute(&error);
                }
            }
        }
    }

    fn fail_reroute(&mut self, error: NavigationError) {
        warn!("Reroute failed: {error}");
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.did_fail_to_reroute(&error);
        }
    }

    fn adopt_route(&mut self, route: Arc<Route>, reason: RerouteReason) {
        info!("Adopting new route ({reason:?}): {:.0} m", route.distance());
        self.stats.record_route_replaced(self.progress.distance_traveled());
        self.stats.record_reroute(self.raw_location.map(|l| l.timestamp));
        self.progress = RouteProgress::new(Arc::clone(&route), 0);
        self.course_tracker.reset();
        self.previous_arrival_waypoint = None;
        self.state = NavigationState::Tracking;
        if let Some(source) = self.location_source.as_mut() {
            source.route_did_change(&route);
        }
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.did_reroute(&route, reason);
        }
    }
}
