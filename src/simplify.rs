//! Polyline simplification.
//!
//! Recorded tracks carry a point every few meters. Building maneuvers
//! from them needs the sparse shape only, so tracks are reduced with the
//! Ramer-Douglas-Peucker algorithm first.

use crate::geometry::{self, Coordinate};

/// Ramer-Douglas-Peucker line simplification.
///
/// Keeps both endpoints and every vertex farther than `tolerance_m` from
/// the segment joining the vertices kept around it.
pub fn rdp_simplify(points: &[Coordinate], tolerance_m: f64) -> Vec<Coordinate> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    // Spans still to examine, as (first, last) index pairs
    let mut spans = vec![(0, points.len() - 1)];
    while let Some((first, last)) = spans.pop() {
        if last - first < 2 {
            continue;
        }
        let Some((index, offset)) = farthest_from_chord(points, first, last) else {
            continue;
        };
        if offset > tolerance_m {
            keep[index] = true;
            spans.push((first, index));
            spans.push((index, last));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(*p))
        .collect()
}

/// Interior vertex of `points[first..=last]` farthest from the chord
/// between its ends, with that distance in meters.
fn farthest_from_chord(points: &[Coordinate], first: usize, last: usize) -> Option<(usize, f64)> {
    let chord = [points[first], points[last]];
    (first + 1..last)
        .filter_map(|i| geometry::closest_point(&chord, &points[i]).map(|c| (i, c.distance)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}
