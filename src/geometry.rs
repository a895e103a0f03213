//! Geometry on route polylines.
//!
//! Platform-agnostic module for nearest-point projection, distances
//! along a polyline and bearing computations. All coordinates use
//! WGS84 (lat/lon in degrees); lengths are great-circle meters.

use serde::{Deserialize, Serialize};

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True for finite coordinates inside the WGS84 value ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Result of projecting a position onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClosestPoint {
    /// Nearest point on the polyline.
    pub coordinate: Coordinate,
    /// Index of the segment start vertex (0-based).
    pub segment_index: usize,
    /// Position of the projection inside the segment, 0 at its start and 1 at its end.
    pub fraction: f64,
    /// Distance from the position to the nearest point, in meters.
    pub distance: f64,
    /// Distance along the polyline from its start to the projected point, in meters.
    pub distance_along: f64,
}

/// Direction in which [`distance_along`] accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toward {
    Start,
    End,
}

/// Earth radius in meters (WGS84 mean).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A later segment must be closer by more than this to win a projection tie.
const TIE_TOLERANCE_M: f64 = 1e-6;

/// Segments shorter than this carry no usable direction.
pub(crate) const DEGENERATE_SEGMENT_M: f64 = 1e-3;

/// Slack accepted when asking for a coordinate at the very end of a polyline.
const LENGTH_TOLERANCE_M: f64 = 1e-6;

/// Haversine distance between two points in meters.
pub fn haversine(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Initial bearing from point A to point B in degrees [0, 360).
pub fn bearing(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    wrap(y.atan2(x).to_degrees(), 0.0, 360.0)
}

/// Wrap a value into `[min, max)`.
pub fn wrap(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    ((value - min) % span + span) % span + min
}

/// Smallest absolute difference between two headings, in [0, 180].
pub fn angle_difference(a: f64, b: f64) -> f64 {
    wrap(a - b, -180.0, 180.0).abs()
}

/// Point reached by travelling `distance` meters from `from` along `bearing_deg`.
pub fn destination(from: &Coordinate, distance: f64, bearing_deg: f64) -> Coordinate {
    let angular = distance / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = from.lat.to_radians();
    let lon1 = from.lon.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Coordinate {
        lat: lat2.to_degrees(),
        lon: wrap(lon2.to_degrees(), -180.0, 180.0),
    }
}

/// Total length of a polyline in meters.
pub fn polyline_length(line: &[Coordinate]) -> f64 {
    line.windows(2).map(|w| haversine(&w[0], &w[1])).sum()
}

/// Cumulative length from the vertex at `from_index` to the end or the start.
///
/// Both directions sum the same segment lengths, so
/// `distance_along(l, i, Start) + distance_along(l, i, End) == polyline_length(l)`.
/// An index past the last vertex is treated as the last vertex.
pub fn distance_along(line: &[Coordinate], from_index: usize, toward: Toward) -> f64 {
    if line.len() < 2 {
        return 0.0;
    }
    let from = from_index.min(line.len() - 1);
    match toward {
        Toward::End => polyline_length(&line[from..]),
        Toward::Start => polyline_length(&line[..=from]),
    }
}

/// Project a position onto the nearest segment of a polyline.
///
/// The polyline is treated as connected segments, not a point cloud.
/// When two segments are equally close, the earlier one wins.
///
/// Returns None if the polyline has fewer than 2 points.
pub fn closest_point(line: &[Coordinate], position: &Coordinate) -> Option<ClosestPoint> {
    if line.len() < 2 {
        return None;
    }

    let mut best: Option<ClosestPoint> = None;
    let mut cumulative_distance = 0.0;

    for (i, segment) in line.windows(2).enumerate() {
        let a = &segment[0];
        let b = &segment[1];
        let seg_len = haversine(a, b);

        let (projected, fraction) = project_on_segment(position, a, b);
        let dist = haversine(position, &projected);
        let along = cumulative_distance + haversine(a, &projected);

        let is_better = match &best {
            Some(prev) => dist + TIE_TOLERANCE_M < prev.distance,
            None => true,
        };

        if is_better {
            best = Some(ClosestPoint {
                coordinate: projected,
                segment_index: i,
                fraction,
                distance: dist,
                distance_along: along,
            });
        }

        cumulative_distance += seg_len;
    }

    best
}

/// Distance along the polyline from its start to the projection of `position`.
pub fn distance_to(line: &[Coordinate], position: &Coordinate) -> Option<f64> {
    closest_point(line, position).map(|c| c.distance_along)
}

/// Length of the polyline left after a projected point.
pub fn distance_remaining(line: &[Coordinate], closest: &ClosestPoint) -> f64 {
    let next = closest.segment_index + 1;
    match line.get(next) {
        Some(segment_end) => {
            haversine(&closest.coordinate, segment_end) + distance_along(line, next, Toward::End)
        }
        None => 0.0,
    }
}

/// The part of the polyline after a projected point, starting at the projection.
pub fn trimmed_from(line: &[Coordinate], closest: &ClosestPoint) -> Vec<Coordinate> {
    let next = (closest.segment_index + 1).min(line.len());
    let mut trimmed = Vec::with_capacity(line.len() - next + 1);
    trimmed.push(closest.coordinate);
    trimmed.extend_from_slice(&line[next..]);
    trimmed
}

/// Direction of travel along the polyline at the projection of `position`.
///
/// Uses the bearing of the segment holding the projection. A degenerate
/// segment defers to the next segment with a direction, then to the
/// previous one.
pub fn interpolated_course(position: &Coordinate, line: &[Coordinate]) -> Option<f64> {
    let closest = closest_point(line, position)?;
    let has_direction = |i: &usize| haversine(&line[*i], &line[*i + 1]) > DEGENERATE_SEGMENT_M;

    let index = (closest.segment_index..line.len() - 1)
        .find(has_direction)
        .or_else(|| (0..closest.segment_index).rev().find(has_direction))?;

    Some(bearing(&line[index], &line[index + 1]))
}

/// Coordinate `distance` meters from the start of the polyline.
///
/// Walks the segments and interpolates inside the one that holds the
/// target. Returns None for negative distances or distances beyond the
/// polyline length.
pub fn coordinate_at(line: &[Coordinate], distance: f64) -> Option<Coordinate> {
    if line.is_empty() || !distance.is_finite() || distance < 0.0 {
        return None;
    }

    let mut travelled = 0.0;
    for w in line.windows(2) {
        let seg_len = haversine(&w[0], &w[1]);
        if travelled + seg_len >= distance {
            if seg_len <= 0.0 {
                return Some(w[0]);
            }
            let t = (distance - travelled) / seg_len;
            return Some(interpolate(&w[0], &w[1], t));
        }
        travelled += seg_len;
    }

    if distance - travelled <= LENGTH_TOLERANCE_M {
        line.last().copied()
    } else {
        None
    }
}

/// Points every `spacing` meters along the polyline, both ends included.
pub fn resample(line: &[Coordinate], spacing: f64) -> Vec<Coordinate> {
    let Some(first) = line.first() else {
        return Vec::new();
    };
    if !spacing.is_finite() || spacing <= 0.0 {
        return line.to_vec();
    }

    let mut samples = vec![*first];
    let mut next_at = spacing;
    let mut travelled = 0.0;

    for w in line.windows(2) {
        let seg_len = haversine(&w[0], &w[1]);
        while seg_len > 0.0 && travelled + seg_len >= next_at {
            let t = (next_at - travelled) / seg_len;
            samples.push(interpolate(&w[0], &w[1], t));
            next_at += spacing;
        }
        travelled += seg_len;
    }

    if let Some(last) = line.last() {
        if samples.last() != Some(last) {
            samples.push(*last);
        }
    }
    samples
}

fn interpolate(a: &Coordinate, b: &Coordinate, t: f64) -> Coordinate {
    if t <= 0.0 {
        return *a;
    }
    if t >= 1.0 {
        return *b;
    }
    Coordinate {
        lat: a.lat + t * (b.lat - a.lat),
        lon: a.lon + t * (b.lon - a.lon),
    }
}

/// Project a point onto a line segment defined by two endpoints.
///
/// Uses a planar approximation scaled by latitude cosine, which is
/// accurate enough for short segments (< 10 km). Returns the projected
/// point and its fraction along the segment.
fn project_on_segment(p: &Coordinate, a: &Coordinate, b: &Coordinate) -> (Coordinate, f64) {
    let cos_lat = ((a.lat + b.lat) / 2.0).to_radians().cos();

    let dx = (b.lon - a.lon) * cos_lat;
    let dy = b.lat - a.lat;
    let px = (p.lon - a.lon) * cos_lat;
    let py = p.lat - a.lat;

    let seg_len_sq = dx * dx + dy * dy;

    if seg_len_sq < 1e-20 {
        // Degenerate segment, return start point
        return (*a, 0.0);
    }

    // Clamp parameter t to [0, 1] to stay on the segment
    let t = ((px * dx + py * dy) / seg_len_sq).clamp(0.0, 1.0);

    (interpolate(a, b, t), t)
}
