//! Maneuver synthesis for routes without provider instructions.
//!
//! A GPX route is only a list of points. Every point where the path
//! changes direction becomes a maneuver; points in between that continue
//! roughly straight are folded into the surrounding step.

use crate::error::{NavigationError, Result};
use crate::geometry::{self, Coordinate};
use crate::route::{ManeuverDirection, ManeuverType, Route, RouteLeg, RouteStep, Waypoint};

/// The final announcement is given this many meters before the maneuver.
const FINAL_ANNOUNCEMENT_M: f64 = 50.0;

/// Split `points` into steps, one per direction change.
///
/// Step durations assume a constant `speed_mps`. Each step carries the
/// spoken and visual instructions for the maneuver that ends it.
pub fn build_steps(points: &[Coordinate], speed_mps: f64) -> Result<Vec<RouteStep>> {
    if !(speed_mps.is_finite() && speed_mps > 0.0) {
        return Err(NavigationError::InvalidRouteGeometry(format!(
            "nominal speed must be positive, got {speed_mps}"
        )));
    }

    let mut points: Vec<Coordinate> = points.to_vec();
    points.dedup();
    if points.len() < 2 {
        return Err(NavigationError::InvalidRouteGeometry(
            "route needs at least two distinct points".to_string(),
        ));
    }

    // Indices of the points that start a step, plus the last point
    let mut maneuvers = vec![(0, ManeuverDirection::Unspecified)];
    for i in 1..points.len() - 1 {
        let turn = compute_turn(&points[i - 1], &points[i], &points[i + 1]);
        if turn != ManeuverDirection::Straight {
            maneuvers.push((i, turn));
        }
    }
    let last = points.len() - 1;

    let mut steps = Vec::with_capacity(maneuvers.len());
    for (k, &(start, direction)) in maneuvers.iter().enumerate() {
        let end = maneuvers.get(k + 1).map_or(last, |m| m.0);
        let coordinates = points[start..=end].to_vec();

        let (kind, instruction) = if k == 0 {
            let heading = geometry::bearing(&points[0], &points[1]);
            (ManeuverType::Depart, format!("Head {}", compass_direction(heading)))
        } else {
            (ManeuverType::Turn, capitalize(turn_to_text(direction)))
        };

        let mut step = RouteStep::new(kind, direction, coordinates, instruction);
        step.expected_travel_time = step.distance / speed_mps;

        let next = maneuvers
            .get(k + 1)
            .map_or("arrive at destination", |m| turn_to_text(m.1));
        let distance = step.distance;
        step = step
            .with_spoken_instruction(distance, format!("In {}, {next}", format_distance(distance)))
            .with_visual_instruction(distance, capitalize(next));
        if distance > FINAL_ANNOUNCEMENT_M {
            step = step.with_spoken_instruction(FINAL_ANNOUNCEMENT_M, capitalize(next));
        }
        steps.push(step);
    }

    Ok(steps)
}

/// A single-leg route along `points` with synthesized maneuvers.
pub fn route_from_points(
    points: &[Coordinate],
    destination_name: Option<&str>,
    speed_mps: f64,
) -> Result<Route> {
    let steps = build_steps(points, speed_mps)?;
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Err(NavigationError::InvalidRouteGeometry(
            "route has no points".to_string(),
        ));
    };
    let destination = match destination_name {
        Some(name) => Waypoint::named(*last, name),
        None => Waypoint::new(*last),
    };
    let leg = RouteLeg::new(Waypoint::new(*first), destination, steps);
    Route::new(vec![leg], None)
}

/// Turn direction at `b` given the approach from `a` and the exit toward `c`.
fn compute_turn(a: &Coordinate, b: &Coordinate, c: &Coordinate) -> ManeuverDirection {
    let bearing_ab = geometry::bearing(a, b);
    let bearing_bc = geometry::bearing(b, c);

    // Positive = right turn, negative = left turn
    let angle = geometry::wrap(bearing_bc - bearing_ab, -180.0, 180.0);
    classify_turn(angle)
}

/// Classify a relative bearing angle into a turn direction.
pub fn classify_turn(angle: f64) -> ManeuverDirection {
    let abs_angle = angle.abs();

    if abs_angle > 170.0 {
        ManeuverDirection::UTurn
    } else if abs_angle > 120.0 {
        if angle > 0.0 { ManeuverDirection::SharpRight } else { ManeuverDirection::SharpLeft }
    } else if abs_angle > 60.0 {
        if angle > 0.0 { ManeuverDirection::Right } else { ManeuverDirection::Left }
    } else if abs_angle > 20.0 {
        if angle > 0.0 { ManeuverDirection::SlightRight } else { ManeuverDirection::SlightLeft }
    } else {
        ManeuverDirection::Straight
    }
}

fn turn_to_text(direction: ManeuverDirection) -> &'static str {
    match direction {
        ManeuverDirection::Straight | ManeuverDirection::Unspecified => "continue straight",
        ManeuverDirection::SlightLeft => "keep slightly left",
        ManeuverDirection::Left => "turn left",
        ManeuverDirection::SharpLeft => "turn sharp left",
        ManeuverDirection::SlightRight => "keep slightly right",
        ManeuverDirection::Right => "turn right",
        ManeuverDirection::SharpRight => "turn sharp right",
        ManeuverDirection::UTurn => "make a U-turn",
    }
}

fn compass_direction(bearing: f64) -> &'static str {
    const NAMES: [&str; 8] = [
        "north",
        "northeast",
        "east",
        "southeast",
        "south",
        "southwest",
        "west",
        "northwest",
    ];
    let sector = (geometry::wrap(bearing, 0.0, 360.0) / 45.0).round() as usize % 8;
    NAMES[sector]
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Distance rounded for announcements: tens of meters, or kilometers.
pub fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{} m", (meters / 10.0).round() as i64 * 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{walk, ORIGIN};

    #[test]
    fn classify_straight() {
        assert_eq!(classify_turn(5.0), ManeuverDirection::Straight);
        assert_eq!(classify_turn(-10.0), ManeuverDirection::Straight);
    }

    #[test]
    fn classify_turns() {
        assert_eq!(classify_turn(90.0), ManeuverDirection::Right);
        assert_eq!(classify_turn(-90.0), ManeuverDirection::Left);
        assert_eq!(classify_turn(-30.0), ManeuverDirection::SlightLeft);
        assert_eq!(classify_turn(150.0), ManeuverDirection::SharpRight);
    }

    #[test]
    fn classify_u_turn() {
        assert_eq!(classify_turn(175.0), ManeuverDirection::UTurn);
        assert_eq!(classify_turn(-175.0), ManeuverDirection::UTurn);
    }

    #[test]
    fn straight_points_form_one_step() {
        let points = walk(ORIGIN, &[(0.0, 100.0), (5.0, 100.0), (0.0, 100.0)]);
        let steps = build_steps(&points, 10.0).unwrap();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].maneuver_type, ManeuverType::Depart);
        assert_eq!(steps[0].instruction, "Head north");
        assert_eq!(steps[0].coordinates.len(), 4);
        assert!((steps[0].expected_travel_time - 30.0).abs() < 0.1);
    }

    #[test]
    fn right_turn_splits_steps() {
        let points = walk(ORIGIN, &[(0.0, 300.0), (90.0, 300.0)]);
        let steps = build_steps(&points, 10.0).unwrap();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].maneuver_type, ManeuverType::Turn);
        assert_eq!(steps[1].maneuver_direction, ManeuverDirection::Right);
        assert_eq!(steps[1].instruction, "Turn right");
        assert_eq!(steps[1].maneuver_location, points[1]);

        let announcements: Vec<&str> = steps[0]
            .spoken_instructions
            .iter()
            .map(|i| i.text.as_str())
            .collect();
        assert!(announcements.contains(&"In 300 m, turn right"));
        assert!(announcements.contains(&"Turn right"));
    }

    #[test]
    fn route_from_points_ends_with_arrival() {
        let points = walk(ORIGIN, &[(0.0, 300.0), (270.0, 300.0)]);
        let route = route_from_points(&points, Some("Hut"), 5.0).unwrap();

        let steps = &route.legs()[0].steps;
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].maneuver_direction, ManeuverDirection::Left);
        assert!(steps[2].is_arrival());
        assert_eq!(steps[2].instruction, "Arrive at Hut");
        assert!((route.expected_travel_time() - 120.0).abs() < 0.5);
    }

    #[test]
    fn too_few_points_is_an_error() {
        assert!(build_steps(&[ORIGIN], 10.0).is_err());
        assert!(build_steps(&[ORIGIN, ORIGIN], 10.0).is_err());
        let points = walk(ORIGIN, &[(0.0, 100.0)]);
        assert!(build_steps(&points, 0.0).is_err());
    }

    #[test]
    fn format_distance_meters() {
        assert_eq!(format_distance(150.0), "150 m");
        assert_eq!(format_distance(5.0), "10 m");
    }

    #[test]
    fn format_distance_km() {
        assert_eq!(format_distance(2500.0), "2.5 km");
    }
}
