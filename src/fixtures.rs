//! Synthetic routes around Vienna shared by the unit tests.

use std::sync::Arc;

use crate::geometry::{destination, Coordinate};
use crate::location::Location;
use crate::route::{ManeuverDirection, ManeuverType, Route, RouteLeg, RouteStep, Waypoint};

pub const ORIGIN: Coordinate = Coordinate::new(48.2, 16.37);

/// Length of every fixture step in meters.
pub const STEP_LENGTH: f64 = 200.0;

/// Planned duration of every seven-step fixture step in seconds.
pub const STEP_DURATION: f64 = 200.0;

/// Vertices reached by walking `legs` of (bearing, meters) from `start`.
pub fn walk(start: Coordinate, legs: &[(f64, f64)]) -> Vec<Coordinate> {
    let mut points = vec![start];
    for (bearing, meters) in legs {
        let last = points[points.len() - 1];
        points.push(destination(&last, *meters, *bearing));
    }
    points
}

/// Staircase of seven 200 m steps: east, north, east, ... east.
///
/// Every maneuver after departure is a 90 degree turn.
pub fn seven_step_route() -> Arc<Route> {
    let bearings = [90.0, 0.0, 90.0, 0.0, 90.0, 0.0, 90.0];
    let corners = walk(
        ORIGIN,
        &bearings.map(|b| (b, STEP_LENGTH)),
    );

    let steps = corners
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let (kind, direction, text) = match i {
                0 => (ManeuverType::Depart, ManeuverDirection::Unspecified, "Head east"),
                _ if bearings[i] == 0.0 => (ManeuverType::Turn, ManeuverDirection::Left, "Turn left"),
                _ => (ManeuverType::Turn, ManeuverDirection::Right, "Turn right"),
            };
            RouteStep::new(kind, direction, w.to_vec(), text)
                .with_duration(STEP_DURATION)
                .with_spoken_instruction(150.0, "Prepare to turn")
                .with_spoken_instruction(50.0, "Turn now")
                .with_visual_instruction(STEP_LENGTH, "Next maneuver")
        })
        .collect();

    let leg = RouteLeg::new(
        Waypoint::named(corners[0], "Start"),
        Waypoint::named(corners[7], "Finish"),
        steps,
    );
    Arc::new(Route::new(vec![leg], Some("driving".to_string())).unwrap())
}

/// Two 200 m steps due north joined by a straight maneuver.
pub fn straight_route() -> Arc<Route> {
    let points = walk(ORIGIN, &[(0.0, STEP_LENGTH), (0.0, STEP_LENGTH)]);
    let steps = vec![
        RouteStep::new(
            ManeuverType::Depart,
            ManeuverDirection::Unspecified,
            points[0..2].to_vec(),
            "Head north",
        )
        .with_duration(20.0),
        RouteStep::new(
            ManeuverType::Continue,
            ManeuverDirection::Straight,
            points[1..3].to_vec(),
            "Continue straight",
        )
        .with_duration(20.0),
    ];
    let leg = RouteLeg::new(Waypoint::new(points[0]), Waypoint::named(points[2], "End"), steps);
    Arc::new(Route::new(vec![leg], None).unwrap())
}

/// Two single-step legs: 200 m north to "A", then 200 m east to "B".
pub fn two_leg_route() -> Arc<Route> {
    let points = walk(ORIGIN, &[(0.0, STEP_LENGTH), (90.0, STEP_LENGTH)]);
    let first = RouteLeg::new(
        Waypoint::named(points[0], "Origin"),
        Waypoint::named(points[1], "A"),
        vec![RouteStep::new(
            ManeuverType::Depart,
            ManeuverDirection::Unspecified,
            points[0..2].to_vec(),
            "Head north",
        )
        .with_duration(20.0)],
    );
    let second = RouteLeg::new(
        Waypoint::named(points[1], "A"),
        Waypoint::named(points[2], "B"),
        vec![RouteStep::new(
            ManeuverType::Depart,
            ManeuverDirection::Unspecified,
            points[1..3].to_vec(),
            "Head east",
        )
        .with_duration(20.0)],
    );
    Arc::new(Route::new(vec![first, second], None).unwrap())
}

/// A single-step route along `points`.
pub fn line_route(points: Vec<Coordinate>, duration: f64) -> Route {
    let first = points[0];
    let last = points[points.len() - 1];
    let step = RouteStep::new(ManeuverType::Depart, ManeuverDirection::Unspecified, points, "Go")
        .with_duration(duration);
    Route::new(
        vec![RouteLeg::new(Waypoint::new(first), Waypoint::new(last), vec![step])],
        Some("driving".to_string()),
    )
    .unwrap()
}

/// An accurate moving fix.
pub fn fix(coordinate: Coordinate, course: f64, speed: f64, timestamp: f64) -> Location {
    Location::new(coordinate)
        .with_accuracy(5.0)
        .with_course(course)
        .with_speed(speed)
        .with_timestamp(timestamp)
}
