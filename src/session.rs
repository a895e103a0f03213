//! Event-queue facade over [`RouteController`].
//!
//! Hosts that cannot implement the delegate and provider traits directly
//! (the JNI bridge) drive a [`Session`] instead. Every call returns the
//! events the controller emitted while handling it, in order.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use serde::Serialize;

use crate::comparator::RerouteReason;
use crate::config::NavigationConfig;
use crate::controller::{
    DirectionsProvider, NavigationDelegate, NavigationState, RequestId, RouteController,
};
use crate::error::{NavigationError, Result};
use crate::geometry::Coordinate;
use crate::location::{Heading, Location};
use crate::progress::{ProgressSnapshot, RouteProgress};
use crate::route::{self, Route, RouteRequest, Waypoint};
use crate::stats::SessionStats;

/// Something the host should know about or act on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationEvent {
    ProgressUpdated {
        progress: ProgressSnapshot,
        location: Location,
        raw_location: Location,
    },
    WillReroute {
        location: Location,
    },
    /// The host must fetch routes for `request` and deliver them under `request_id`.
    RerouteRequested {
        request_id: RequestId,
        request: RouteRequest,
    },
    RerouteCancelled {
        request_id: RequestId,
    },
    Rerouted {
        reason: RerouteReason,
        distance: f64,
        expected_travel_time: f64,
        coordinates: Vec<Coordinate>,
    },
    RerouteFailed {
        error: String,
    },
    RerouteDeclined {
        error: String,
    },
    Arrived {
        waypoint: Waypoint,
    },
    TunnelEntered {
        location: Location,
    },
    TunnelExited {
        location: Location,
    },
}

struct ChannelDelegate {
    events: Sender<NavigationEvent>,
    continue_after_arrival: bool,
}

impl ChannelDelegate {
    fn emit(&self, event: NavigationEvent) {
        // The receiver lives in the same session; a send only fails during teardown
        if self.events.send(event).is_err() {
            log::trace!("Session gone, dropping event");
        }
    }
}

impl NavigationDelegate for ChannelDelegate {
    fn will_reroute(&mut self, location: &Location) {
        self.emit(NavigationEvent::WillReroute {
            location: *location,
        });
    }

    fn did_reroute(&mut self, route: &Arc<Route>, reason: RerouteReason) {
        self.emit(NavigationEvent::Rerouted {
            reason,
            distance: route.distance(),
            expected_travel_time: route.expected_travel_time(),
            coordinates: route.coordinates().to_vec(),
        });
    }

    fn did_fail_to_reroute(&mut self, error: &NavigationError) {
        self.emit(NavigationEvent::RerouteFailed {
            error: error.to_string(),
        });
    }

    fn did_decline_reroute(&mut self, error: &NavigationError) {
        self.emit(NavigationEvent::RerouteDeclined {
            error: error.to_string(),
        });
    }

    fn progress_did_update(
        &mut self,
        progress: &RouteProgress,
        location: &Location,
        raw_location: &Location,
    ) {
        self.emit(NavigationEvent::ProgressUpdated {
            progress: ProgressSnapshot::from(progress),
            location: *location,
            raw_location: *raw_location,
        });
    }

    fn did_arrive(&mut self, waypoint: &Waypoint) -> bool {
        self.emit(NavigationEvent::Arrived {
            waypoint: waypoint.clone(),
        });
        self.continue_after_arrival
    }

    fn will_enter_tunnel(&mut self, location: &Location) {
        self.emit(NavigationEvent::TunnelEntered {
            location: *location,
        });
    }

    fn did_exit_tunnel(&mut self, location: &Location) {
        self.emit(NavigationEvent::TunnelExited {
            location: *location,
        });
    }
}

struct ChannelProvider {
    events: Sender<NavigationEvent>,
}

impl DirectionsProvider for ChannelProvider {
    fn calculate_route(&mut self, id: RequestId, request: RouteRequest) {
        let event = NavigationEvent::RerouteRequested {
            request_id: id,
            request,
        };
        if self.events.send(event).is_err() {
            log::trace!("Session gone, dropping request {}", id.0);
        }
    }

    fn cancel(&mut self, id: RequestId) {
        if self.events.send(NavigationEvent::RerouteCancelled { request_id: id }).is_err() {
            log::trace!("Session gone, dropping cancellation {}", id.0);
        }
    }
}

/// One navigation session driven through plain calls.
pub struct Session {
    controller: RouteController,
    events: Receiver<NavigationEvent>,
}

impl Session {
    /// Fails when `config` does not validate.
    ///
    /// With `continue_after_arrival` off, an arrival at an intermediate
    /// waypoint leaves the session in the arrived state until
    /// [`Session::advance_leg`].
    pub fn new(route: Route, config: NavigationConfig) -> Result<Self> {
        let (sender, events) = mpsc::channel();
        let continue_after_arrival = config.continue_after_arrival;
        let mut controller = RouteController::new(
            Arc::new(route),
            config,
            Box::new(ChannelProvider {
                events: sender.clone(),
            }),
        )?;
        controller.set_delegate(Box::new(ChannelDelegate {
            events: sender,
            continue_after_arrival,
        }));
        Ok(Self { controller, events })
    }

    /// Build a session from a route document and an optional configuration document.
    pub fn from_json(route_json: &str, config_json: Option<&str>) -> Result<Self> {
        let route = Route::from_json(route_json)?;
        let config = match config_json.map(str::trim).filter(|c| !c.is_empty()) {
            Some(json) => NavigationConfig::from_json(json)?,
            None => NavigationConfig::default(),
        };
        Self::new(route, config)
    }

    pub fn controller(&self) -> &RouteController {
        &self.controller
    }

    pub fn state(&self) -> NavigationState {
        self.controller.state()
    }

    pub fn stats(&self) -> &SessionStats {
        self.controller.session_stats()
    }

    pub fn update_location(&mut self, location: Location) -> Vec<NavigationEvent> {
        self.controller.update_location(location);
        self.drain()
    }

    pub fn update_heading(&mut self, heading: Heading) -> Vec<NavigationEvent> {
        self.controller.update_heading(heading);
        self.drain()
    }

    /// Hand over the provider document answering request `request_id`.
    ///
    /// A document that does not parse counts as a failed request.
    pub fn deliver_routes(&mut self, request_id: u64, routes_json: &str) -> Vec<NavigationEvent> {
        let result = route::routes_from_json(routes_json);
        if let Err(error) = &result {
            log::warn!("Unusable directions response {request_id}: {error}");
        }
        self.controller
            .handle_directions_response(RequestId(request_id), result);
        self.drain()
    }

    pub fn fail_routes(&mut self, request_id: u64, message: &str) -> Vec<NavigationEvent> {
        self.controller.handle_directions_response(
            RequestId(request_id),
            Err(NavigationError::DirectionsRequestFailed(message.to_string())),
        );
        self.drain()
    }

    /// Estimate the position as of `now` from the last fix.
    pub fn dead_reckon(&mut self, now: f64) -> Vec<NavigationEvent> {
        self.controller.dead_reckon(now);
        self.drain()
    }

    /// Returns whether a next leg was started, plus the events.
    pub fn advance_leg(&mut self) -> (bool, Vec<NavigationEvent>) {
        let advanced = self.controller.advance_leg();
        (advanced, self.drain())
    }

    pub fn end(&mut self) -> Vec<NavigationEvent> {
        self.controller.end_navigation();
        self.drain()
    }

    fn drain(&self) -> Vec<NavigationEvent> {
        self.events.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, fix, ORIGIN};
    use crate::geometry::destination;

    const ROUTE_JSON: &str = r#"{"routes":[{
        "distance": 400.0,
        "duration": 40.0,
        "geometry": {"type": "LineString", "coordinates": [[16.37, 48.2], [16.37, 48.2036]]},
        "legs": [{"steps": [
            {"maneuver": {"type": "depart", "location": [16.37, 48.2], "instruction": "Head north"},
             "geometry": {"type": "LineString", "coordinates": [[16.37, 48.2], [16.37, 48.2018]]},
             "distance": 200.0, "duration": 20.0, "name": "Ring"},
            {"maneuver": {"type": "continue", "modifier": "straight", "location": [16.37, 48.2018], "instruction": "Continue"},
             "geometry": {"type": "LineString", "coordinates": [[16.37, 48.2018], [16.37, 48.2036]]},
             "distance": 200.0, "duration": 20.0, "name": "Ring"}
        ]}]
    }]}"#;

    fn event_types(events: &[NavigationEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn progress_is_reported_as_event() {
        let mut session = Session::from_json(ROUTE_JSON, None).unwrap();
        let events = session.update_location(fix(destination(&ORIGIN, 50.0, 0.0), 0.0, 10.0, 1.0));

        assert_eq!(event_types(&events), vec!["progress_updated"]);
        let NavigationEvent::ProgressUpdated { progress, .. } = &events[0] else {
            panic!("Expected progress, got {events:?}");
        };
        assert_eq!(progress.step_index, 0);
        assert!((progress.distance_traveled - 50.0).abs() < 1.0);
    }

    #[test]
    fn reroute_round_trip() {
        let mut session = Session::from_json(ROUTE_JSON, Some("{}")).unwrap();
        let away = destination(&ORIGIN, 1_000.0, 90.0);
        let events = session.update_location(fix(away, 90.0, 10.0, 1.0));

        assert_eq!(event_types(&events), vec!["will_reroute", "reroute_requested"]);
        let NavigationEvent::RerouteRequested { request_id, request } = &events[1] else {
            panic!("Expected a request, got {events:?}");
        };
        assert_eq!(request.waypoints[0].coordinate, away);
        assert_eq!(session.state(), NavigationState::Rerouting);

        let events = session.deliver_routes(request_id.0, ROUTE_JSON);
        assert_eq!(event_types(&events), vec!["rerouted"]);
        assert_eq!(session.state(), NavigationState::Tracking);
    }

    #[test]
    fn unparsable_response_fails_reroute() {
        let mut session = Session::from_json(ROUTE_JSON, None).unwrap();
        let events = session.update_location(fix(destination(&ORIGIN, 1_000.0, 90.0), 90.0, 10.0, 1.0));
        let id = match &events[1] {
            NavigationEvent::RerouteRequested { request_id, .. } => request_id.0,
            other => panic!("Expected a request, got {other:?}"),
        };

        let events = session.deliver_routes(id, "not json");
        assert_eq!(event_types(&events), vec!["reroute_failed"]);

        let events = session.fail_routes(id, "offline");
        assert!(events.is_empty());
    }

    #[test]
    fn config_document_is_applied() {
        let session = Session::from_json(ROUTE_JSON, Some(r#"{"maneuver_zone_radius": 25.0}"#)).unwrap();
        assert_eq!(session.controller().config().maneuver_zone_radius, 25.0);
        assert!(Session::from_json("{\"routes\": []}", None).is_err());
        assert!(Session::from_json(ROUTE_JSON, Some("not json")).is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = NavigationEvent::RerouteRequested {
            request_id: RequestId(3),
            request: RouteRequest {
                waypoints: vec![Waypoint::new(ORIGIN)],
                profile: None,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reroute_requested");
        assert_eq!(json["request_id"], 3);
    }

    #[test]
    fn ending_cancels_pending_request() {
        let mut session = Session::from_json(ROUTE_JSON, None).unwrap();
        session.update_location(fix(destination(&ORIGIN, 1_000.0, 90.0), 90.0, 10.0, 1.0));
        let events = session.end();
        assert_eq!(event_types(&events), vec!["reroute_cancelled"]);
        assert!(session.update_location(fix(ORIGIN, 0.0, 10.0, 2.0)).is_empty());
    }

    #[test]
    fn arrival_can_wait_for_advance_leg() {
        let route = fixtures::two_leg_route();
        let a = route.legs()[0].destination.coordinate;
        let config = NavigationConfig {
            continue_after_arrival: false,
            ..NavigationConfig::default()
        };
        let mut session = Session::new(Route::clone(&route), config).unwrap();

        session.update_location(fix(destination(&ORIGIN, 100.0, 0.0), 0.0, 10.0, 1.0));
        let events = session.update_location(fix(a, 0.0, 10.0, 2.0));
        assert!(event_types(&events).contains(&"arrived".to_string()));
        assert_eq!(session.state(), NavigationState::Arrived);
        assert_eq!(session.controller().progress().leg_index(), 0);

        let (advanced, _) = session.advance_leg();
        assert!(advanced);
        assert_eq!(session.controller().progress().leg_index(), 1);
        assert_eq!(session.state(), NavigationState::Tracking);
    }

    #[test]
    fn invalid_config_fails_session() {
        let config = r#"{"match_threshold": 150.0}"#;
        assert!(matches!(
            Session::from_json(ROUTE_JSON, Some(config)),
            Err(NavigationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn broken_candidate_does_not_spoil_response() {
        let mut session = Session::from_json(ROUTE_JSON, None).unwrap();
        let events = session.update_location(fix(destination(&ORIGIN, 1_000.0, 90.0), 90.0, 10.0, 1.0));
        let NavigationEvent::RerouteRequested { request_id, .. } = &events[1] else {
            panic!("Expected a request, got {events:?}");
        };

        let good = ROUTE_JSON
            .trim()
            .trim_start_matches(r#"{"routes":["#)
            .trim_end_matches("]}");
        let mixed = format!(r#"{{"routes":[{{"distance": 10.0, "legs": []}}, {good}]}}"#);
        let events = session.deliver_routes(request_id.0, &mixed);

        assert_eq!(event_types(&events), vec!["rerouted"]);
        assert_eq!(session.stats().number_of_reroutes, 1);
    }
}
