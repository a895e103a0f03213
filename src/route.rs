//! Route data model.
//!
//! A [`Route`] is an ordered list of legs, each an ordered list of
//! maneuver-bounded steps with their own geometry. Routes are built
//! once, validated, and then shared immutably (`Arc<Route>`) between
//! the controller, progress snapshots and location sources.
//!
//! Provider documents use the Directions JSON layout: coordinates are
//! GeoJSON-ordered `[lon, lat]` pairs.

use serde::{Deserialize, Serialize};

use crate::error::{NavigationError, Result};
use crate::geometry::{self, Coordinate, DEGENERATE_SEGMENT_M};

/// Instruction text of the arrival steps added during normalization.
pub const ARRIVAL_INSTRUCTION: &str = "Arrive at destination";

/// A stop the traveler wants to reach, or the origin of a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub coordinate: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Direction of travel at the waypoint, used for the origin of reroute requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_accuracy: Option<f64>,
}

impl Waypoint {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            name: None,
            heading: None,
            heading_accuracy: None,
        }
    }

    pub fn named(coordinate: Coordinate, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(coordinate)
        }
    }
}

/// Kind of maneuver at the start of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverType {
    Depart,
    Turn,
    Continue,
    NewName,
    Merge,
    OnRamp,
    OffRamp,
    Fork,
    EndOfRoad,
    UseLane,
    Roundabout,
    RoundaboutTurn,
    ExitRoundabout,
    Rotary,
    ExitRotary,
    Notification,
    Arrive,
    Other,
}

impl From<&str> for ManeuverType {
    fn from(value: &str) -> Self {
        match value {
            "depart" => ManeuverType::Depart,
            "turn" => ManeuverType::Turn,
            "continue" => ManeuverType::Continue,
            "new name" => ManeuverType::NewName,
            "merge" => ManeuverType::Merge,
            "on ramp" => ManeuverType::OnRamp,
            "off ramp" => ManeuverType::OffRamp,
            "fork" => ManeuverType::Fork,
            "end of road" => ManeuverType::EndOfRoad,
            "use lane" => ManeuverType::UseLane,
            "roundabout" => ManeuverType::Roundabout,
            "roundabout turn" => ManeuverType::RoundaboutTurn,
            "exit roundabout" => ManeuverType::ExitRoundabout,
            "rotary" => ManeuverType::Rotary,
            "exit rotary" => ManeuverType::ExitRotary,
            "notification" => ManeuverType::Notification,
            "arrive" => ManeuverType::Arrive,
            _ => ManeuverType::Other,
        }
    }
}

/// Direction of a maneuver relative to the direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverDirection {
    Straight,
    SlightLeft,
    Left,
    SharpLeft,
    SlightRight,
    Right,
    SharpRight,
    UTurn,
    Unspecified,
}

impl ManeuverDirection {
    /// Sharp turns and U-turns.
    pub fn is_sharp(self) -> bool {
        matches!(
            self,
            ManeuverDirection::SharpLeft | ManeuverDirection::SharpRight | ManeuverDirection::UTurn
        )
    }
}

impl From<&str> for ManeuverDirection {
    fn from(value: &str) -> Self {
        match value {
            "straight" => ManeuverDirection::Straight,
            "slight left" => ManeuverDirection::SlightLeft,
            "left" => ManeuverDirection::Left,
            "sharp left" => ManeuverDirection::SharpLeft,
            "slight right" => ManeuverDirection::SlightRight,
            "right" => ManeuverDirection::Right,
            "sharp right" => ManeuverDirection::SharpRight,
            "uturn" => ManeuverDirection::UTurn,
            _ => ManeuverDirection::Unspecified,
        }
    }
}

/// An intersection the step passes through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intersection {
    pub location: Coordinate,
    /// Distance from the start of the step to the intersection, in meters.
    pub distance_along_step: f64,
    /// The road leaving the intersection runs through a tunnel.
    pub tunnel: bool,
}

/// An announcement to speak once the traveler is `trigger_distance` meters
/// before the end of the step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpokenInstruction {
    pub trigger_distance: f64,
    pub text: String,
}

/// A banner to show once the traveler is `trigger_distance` meters before
/// the end of the step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualInstruction {
    pub trigger_distance: f64,
    pub text: String,
}

/// A maneuver-bounded portion of a leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStep {
    pub maneuver_type: ManeuverType,
    pub maneuver_direction: ManeuverDirection,
    pub maneuver_location: Coordinate,
    pub instruction: String,
    /// Road name, empty when unnamed.
    pub name: String,
    /// At least two coordinates.
    pub coordinates: Vec<Coordinate>,
    /// Planned length in meters.
    pub distance: f64,
    /// Planned duration in seconds.
    pub expected_travel_time: f64,
    pub intersections: Vec<Intersection>,
    /// Ordered by decreasing trigger distance.
    pub spoken_instructions: Vec<SpokenInstruction>,
    /// Ordered by decreasing trigger distance.
    pub visual_instructions: Vec<VisualInstruction>,
    /// Heading arriving at the maneuver. None for the first step of a leg.
    pub initial_heading: Option<f64>,
    /// Heading leaving the maneuver. None for zero-length steps.
    pub final_heading: Option<f64>,
}

impl RouteStep {
    /// A step over `coordinates`, its distance taken from the geometry.
    ///
    /// Headings and intersection distances are derived once the step is
    /// part of a [`Route`].
    pub fn new(
        maneuver_type: ManeuverType,
        maneuver_direction: ManeuverDirection,
        coordinates: Vec<Coordinate>,
        instruction: impl Into<String>,
    ) -> Self {
        let maneuver_location = coordinates.first().copied().unwrap_or(Coordinate::new(0.0, 0.0));
        let distance = geometry::polyline_length(&coordinates);
        Self {
            maneuver_type,
            maneuver_direction,
            maneuver_location,
            instruction: instruction.into(),
            name: String::new(),
            coordinates,
            distance,
            expected_travel_time: 0.0,
            intersections: Vec::new(),
            spoken_instructions: Vec::new(),
            visual_instructions: Vec::new(),
            initial_heading: None,
            final_heading: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.expected_travel_time = seconds;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_spoken_instruction(mut self, trigger_distance: f64, text: impl Into<String>) -> Self {
        self.spoken_instructions.push(SpokenInstruction {
            trigger_distance,
            text: text.into(),
        });
        self
    }

    pub fn with_visual_instruction(mut self, trigger_distance: f64, text: impl Into<String>) -> Self {
        self.visual_instructions.push(VisualInstruction {
            trigger_distance,
            text: text.into(),
        });
        self
    }

    pub fn with_intersection(mut self, location: Coordinate) -> Self {
        self.intersections.push(Intersection {
            location,
            distance_along_step: 0.0,
            tunnel: false,
        });
        self
    }

    /// An intersection whose outgoing road enters a tunnel.
    pub fn with_tunnel_entrance(mut self, location: Coordinate) -> Self {
        self.intersections.push(Intersection {
            location,
            distance_along_step: 0.0,
            tunnel: true,
        });
        self
    }

    /// Zero-length step announcing arrival at `at`.
    pub fn arrival(at: Coordinate) -> Self {
        Self::new(
            ManeuverType::Arrive,
            ManeuverDirection::Unspecified,
            vec![at, at],
            ARRIVAL_INSTRUCTION,
        )
    }

    pub fn is_arrival(&self) -> bool {
        self.maneuver_type == ManeuverType::Arrive
    }

    /// Angle between the approach and the exit of the maneuver, in [0, 180].
    pub fn turn_angle(&self) -> Option<f64> {
        Some(geometry::angle_difference(
            self.initial_heading?,
            self.final_heading?,
        ))
    }

    /// True when the maneuver changes direction by at most `tolerance` degrees,
    /// or has no direction at all.
    pub fn is_straight(&self, tolerance: f64) -> bool {
        self.turn_angle().map_or(true, |angle| angle <= tolerance)
    }

    pub fn last_coordinate(&self) -> Coordinate {
        self.coordinates.last().copied().unwrap_or(self.maneuver_location)
    }
}

/// The part of a route between two consecutive waypoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteLeg {
    pub source: Waypoint,
    pub destination: Waypoint,
    pub steps: Vec<RouteStep>,
    pub name: String,
    pub distance: f64,
    pub expected_travel_time: f64,
}

impl RouteLeg {
    pub fn new(source: Waypoint, destination: Waypoint, steps: Vec<RouteStep>) -> Self {
        let distance = steps.iter().map(|s| s.distance).sum();
        let expected_travel_time = steps.iter().map(|s| s.expected_travel_time).sum();
        Self {
            source,
            destination,
            steps,
            name: String::new(),
            distance,
            expected_travel_time,
        }
    }

    pub fn last_step_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// Leg geometry, consecutive duplicate coordinates removed.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        let mut line: Vec<Coordinate> = Vec::new();
        for c in self.steps.iter().flat_map(|s| s.coordinates.iter()) {
            if line.last() != Some(c) {
                line.push(*c);
            }
        }
        line
    }
}

/// A validated, immutable route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    legs: Vec<RouteLeg>,
    profile: Option<String>,
    distance: f64,
    expected_travel_time: f64,
    coordinates: Vec<Coordinate>,
}

impl Route {
    /// Validate legs and normalize them.
    ///
    /// Each leg must have steps and every step at least two finite
    /// coordinates. A leg whose last step is not a zero-length arrival
    /// step gets one appended at its final coordinate. Headings and
    /// intersection distances are derived from the geometry.
    pub fn new(legs: Vec<RouteLeg>, profile: Option<String>) -> Result<Self> {
        if legs.is_empty() {
            return Err(NavigationError::InvalidRouteGeometry(
                "route has no legs".to_string(),
            ));
        }

        let mut normalized = Vec::with_capacity(legs.len());
        for (leg_index, mut leg) in legs.into_iter().enumerate() {
            validate_leg(leg_index, &leg)?;
            normalize_arrival(&mut leg);
            derive_step_geometry(&mut leg);
            leg.distance = leg.steps.iter().map(|s| s.distance).sum();
            leg.expected_travel_time = leg.steps.iter().map(|s| s.expected_travel_time).sum();
            normalized.push(leg);
        }

        let mut coordinates: Vec<Coordinate> = Vec::new();
        for leg in &normalized {
            for c in leg.coordinates() {
                if coordinates.last() != Some(&c) {
                    coordinates.push(c);
                }
            }
        }

        Ok(Self {
            distance: normalized.iter().map(|l| l.distance).sum(),
            expected_travel_time: normalized.iter().map(|l| l.expected_travel_time).sum(),
            legs: normalized,
            profile,
            coordinates,
        })
    }

    /// At least one leg, each ending in an arrival step.
    pub fn legs(&self) -> &[RouteLeg] {
        &self.legs
    }

    /// Routing profile, reused for reroute requests.
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Planned length in meters.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Planned duration in seconds.
    pub fn expected_travel_time(&self) -> f64 {
        self.expected_travel_time
    }

    /// Full route geometry.
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    /// Parse the first route of a provider document.
    pub fn from_json(json: &str) -> Result<Self> {
        routes_from_json(json)?
            .into_iter()
            .next()
            .ok_or(NavigationError::NoCandidateRoute)
    }
}

fn validate_leg(leg_index: usize, leg: &RouteLeg) -> Result<()> {
    if leg.steps.is_empty() {
        return Err(NavigationError::InvalidRouteGeometry(format!(
            "leg {leg_index} has no steps"
        )));
    }
    for (step_index, step) in leg.steps.iter().enumerate() {
        if step.coordinates.len() < 2 {
            return Err(NavigationError::InvalidRouteGeometry(format!(
                "leg {leg_index} step {step_index} has {} coordinate(s)",
                step.coordinates.len()
            )));
        }
        if !step.coordinates.iter().all(Coordinate::is_valid) {
            return Err(NavigationError::InvalidRouteGeometry(format!(
                "leg {leg_index} step {step_index} has an invalid coordinate"
            )));
        }
        if !step.distance.is_finite() || !step.expected_travel_time.is_finite() {
            return Err(NavigationError::InvalidRouteGeometry(format!(
                "leg {leg_index} step {step_index} has a non-finite distance or duration"
            )));
        }
    }
    Ok(())
}

fn normalize_arrival(leg: &mut RouteLeg) {
    let Some(last) = leg.steps.last_mut() else {
        return;
    };
    let end = last.last_coordinate();
    if last.is_arrival() {
        if geometry::polyline_length(&last.coordinates) <= DEGENERATE_SEGMENT_M {
            last.distance = 0.0;
            last.expected_travel_time = 0.0;
            return;
        }
        // An arrive maneuver with geometry still covers ground.
        last.maneuver_type = ManeuverType::Continue;
    }
    let mut arrival = RouteStep::arrival(end);
    if let Some(name) = &leg.destination.name {
        arrival.instruction = format!("Arrive at {name}");
    }
    leg.steps.push(arrival);
}

fn derive_step_geometry(leg: &mut RouteLeg) {
    let mut previous_exit: Option<f64> = None;
    for step in &mut leg.steps {
        step.initial_heading = previous_exit;
        step.final_heading = first_heading(&step.coordinates);
        previous_exit = last_heading(&step.coordinates).or(previous_exit);

        for intersection in &mut step.intersections {
            intersection.distance_along_step =
                geometry::distance_to(&step.coordinates, &intersection.location).unwrap_or(0.0);
        }
        step.intersections
            .sort_by(|a, b| a.distance_along_step.total_cmp(&b.distance_along_step));
        step.spoken_instructions
            .sort_by(|a, b| b.trigger_distance.total_cmp(&a.trigger_distance));
        step.visual_instructions
            .sort_by(|a, b| b.trigger_distance.total_cmp(&a.trigger_distance));
    }
}

/// Bearing of the first segment with a direction.
fn first_heading(line: &[Coordinate]) -> Option<f64> {
    line.windows(2)
        .find(|w| geometry::haversine(&w[0], &w[1]) > DEGENERATE_SEGMENT_M)
        .map(|w| geometry::bearing(&w[0], &w[1]))
}

/// Bearing of the last segment with a direction.
fn last_heading(line: &[Coordinate]) -> Option<f64> {
    line.windows(2)
        .rev()
        .find(|w| geometry::haversine(&w[0], &w[1]) > DEGENERATE_SEGMENT_M)
        .map(|w| geometry::bearing(&w[0], &w[1]))
}

/// Origin plus destinations for a directions request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRequest {
    pub waypoints: Vec<Waypoint>,
    pub profile: Option<String>,
}

// Provider document layout.

#[derive(Deserialize)]
struct RoutesDocument {
    routes: Vec<RouteDocument>,
    #[serde(default)]
    waypoints: Vec<WaypointDocument>,
}

#[derive(Deserialize)]
struct RouteDocument {
    legs: Vec<LegDocument>,
    #[serde(default)]
    waypoints: Vec<WaypointDocument>,
    #[serde(default)]
    profile: Option<String>,
}

#[derive(Deserialize)]
struct LegDocument {
    steps: Vec<StepDocument>,
    #[serde(default)]
    summary: String,
}

#[derive(Deserialize)]
struct StepDocument {
    geometry: GeometryDocument,
    maneuver: ManeuverDocument,
    #[serde(default)]
    distance: Option<f64>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    intersections: Vec<IntersectionDocument>,
    #[serde(default, alias = "voiceInstructions")]
    spoken_instructions: Vec<InstructionDocument>,
    #[serde(default, alias = "bannerInstructions")]
    visual_instructions: Vec<InstructionDocument>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GeometryDocument {
    LineString { coordinates: Vec<Vec<f64>> },
    Coordinates(Vec<Vec<f64>>),
}

#[derive(Deserialize)]
struct ManeuverDocument {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    location: Option<Vec<f64>>,
}

#[derive(Deserialize)]
struct IntersectionDocument {
    location: Vec<f64>,
    /// Road classes of the outgoing road.
    #[serde(default)]
    classes: Vec<String>,
}

#[derive(Deserialize)]
struct InstructionDocument {
    #[serde(alias = "distanceAlongGeometry")]
    distance_along_geometry: f64,
    #[serde(default, alias = "announcement")]
    text: Option<String>,
    #[serde(default)]
    primary: Option<BannerTextDocument>,
}

#[derive(Deserialize)]
struct BannerTextDocument {
    text: String,
}

#[derive(Deserialize)]
struct WaypointDocument {
    location: Vec<f64>,
    #[serde(default)]
    name: Option<String>,
}

/// Parse the usable routes of a `{ "routes": [...] }` provider document.
///
/// Candidates that fail validation are skipped. When none is usable the
/// first validation error is returned, or `NoCandidateRoute` for an
/// empty list.
pub fn routes_from_json(json: &str) -> Result<Vec<Route>> {
    let document: RoutesDocument = serde_json::from_str(json)?;
    let shared_waypoints = document.waypoints;
    let mut routes = Vec::with_capacity(document.routes.len());
    let mut first_error = None;
    for (index, route) in document.routes.iter().enumerate() {
        let waypoints = if route.waypoints.is_empty() {
            &shared_waypoints
        } else {
            &route.waypoints
        };
        match route_from_document(route, waypoints) {
            Ok(route) => routes.push(route),
            Err(e) => {
                log::warn!("Skipping route candidate {index}: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    if routes.is_empty() {
        return Err(first_error.unwrap_or(NavigationError::NoCandidateRoute));
    }
    Ok(routes)
}

fn route_from_document(route: &RouteDocument, waypoints: &[WaypointDocument]) -> Result<Route> {
    let waypoints = waypoints
        .iter()
        .map(|w| -> Result<Waypoint> {
            Ok(Waypoint {
                name: w.name.clone(),
                ..Waypoint::new(position(&w.location)?)
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let use_waypoints = waypoints.len() == route.legs.len() + 1;

    let mut legs = Vec::with_capacity(route.legs.len());
    for (leg_index, leg) in route.legs.iter().enumerate() {
        let steps = leg
            .steps
            .iter()
            .map(step_from_document)
            .collect::<Result<Vec<_>>>()?;

        let (source, destination) = if use_waypoints {
            (waypoints[leg_index].clone(), waypoints[leg_index + 1].clone())
        } else {
            let first = steps.first().and_then(|s| s.coordinates.first().copied());
            let last = steps.last().map(RouteStep::last_coordinate);
            match (first, last) {
                (Some(first), Some(last)) => (Waypoint::new(first), Waypoint::new(last)),
                _ => {
                    return Err(NavigationError::InvalidRouteGeometry(format!(
                        "leg {leg_index} has no steps"
                    )))
                }
            }
        };

        let mut leg_model = RouteLeg::new(source, destination, steps);
        leg_model.name = leg.summary.clone();
        legs.push(leg_model);
    }

    Route::new(legs, route.profile.clone())
}

fn step_from_document(step: &StepDocument) -> Result<RouteStep> {
    let raw = match &step.geometry {
        GeometryDocument::LineString { coordinates } => coordinates,
        GeometryDocument::Coordinates(coordinates) => coordinates,
    };
    let coordinates = raw
        .iter()
        .map(|p| position(p))
        .collect::<Result<Vec<_>>>()?;

    let mut model = RouteStep::new(
        ManeuverType::from(step.maneuver.kind.as_str()),
        step.maneuver
            .modifier
            .as_deref()
            .map_or(ManeuverDirection::Unspecified, ManeuverDirection::from),
        coordinates,
        step.maneuver.instruction.clone(),
    )
    .with_name(step.name.clone());

    if let Some(location) = &step.maneuver.location {
        model.maneuver_location = position(location)?;
    }
    if let Some(distance) = step.distance {
        model.distance = distance;
    }
    model.expected_travel_time = step.duration.unwrap_or(0.0);

    for intersection in &step.intersections {
        let location = position(&intersection.location)?;
        model = if intersection.classes.iter().any(|c| c == "tunnel") {
            model.with_tunnel_entrance(location)
        } else {
            model.with_intersection(location)
        };
    }
    for spoken in &step.spoken_instructions {
        let text = spoken.text.clone().unwrap_or_default();
        model = model.with_spoken_instruction(spoken.distance_along_geometry, text);
    }
    for visual in &step.visual_instructions {
        let text = visual
            .text
            .clone()
            .or_else(|| visual.primary.as_ref().map(|p| p.text.clone()))
            .unwrap_or_default();
        model = model.with_visual_instruction(visual.distance_along_geometry, text);
    }
    Ok(model)
}

/// GeoJSON position `[lon, lat, ...]`.
fn position(values: &[f64]) -> Result<Coordinate> {
    match values {
        [lon, lat, ..] => Ok(Coordinate::new(*lat, *lon)),
        _ => Err(NavigationError::InvalidRouteGeometry(format!(
            "position needs longitude and latitude, got {values:?}"
        ))),
    }
}
