//! Route comparison and reroute selection.
//!
//! Geometries are compared on a coarse grid: both polylines are sampled
//! at a fixed spacing and each sample is reduced to a grid cell. Two
//! routes match where their cells coincide or touch.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::NavigationConfig;
use crate::error::NavigationError;
use crate::geometry::{self, Coordinate};

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Why a new route was adopted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RerouteReason {
    DivertedFromRoute,
    FasterRoute,
    EtaUpdate,
}

/// A candidate route scored against the active route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RerouteCandidate {
    pub index: usize,
    /// Similarity in [0, 100].
    pub match_percentage: f64,
}

/// Thresholds of the acceptance policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReroutePolicy {
    pub match_threshold: f64,
    pub eta_update_margin: f64,
    pub cell_size: f64,
}

impl From<&NavigationConfig> for ReroutePolicy {
    fn from(config: &NavigationConfig) -> Self {
        Self {
            match_threshold: config.match_threshold,
            eta_update_margin: config.eta_update_margin,
            cell_size: config.route_match_cell_size,
        }
    }
}

/// Outcome of [`select_reroute`] when a candidate is adopted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RerouteSelection {
    pub candidate: RerouteCandidate,
    pub reason: RerouteReason,
}

/// Share of both routes, in percent, that runs through the same cells.
///
/// Symmetric. Returns None when either geometry is empty.
pub fn match_percentage(a: &[Coordinate], b: &[Coordinate], cell_size: f64) -> Option<f64> {
    if a.is_empty() || b.is_empty() || !cell_size.is_finite() || cell_size <= 0.0 {
        return None;
    }
    let cells_a = cells(a, cell_size);
    let cells_b = cells(b, cell_size);

    let matched_a = cells_a.iter().filter(|c| touches(c, &cells_b)).count();
    let matched_b = cells_b.iter().filter(|c| touches(c, &cells_a)).count();

    let total = cells_a.len() + cells_b.len();
    Some((matched_a + matched_b) as f64 / total as f64 * 100.0)
}

fn cells(line: &[Coordinate], cell_size: f64) -> HashSet<(i64, i64)> {
    let degrees = cell_size / METERS_PER_DEGREE;
    geometry::resample(line, cell_size)
        .iter()
        .map(|c| ((c.lat / degrees).floor() as i64, (c.lon / degrees).floor() as i64))
        .collect()
}

/// The cell itself or one of its eight neighbours is present.
fn touches(cell: &(i64, i64), other: &HashSet<(i64, i64)>) -> bool {
    let (lat, lon) = *cell;
    (-1..=1).any(|dy| (-1..=1).any(|dx| other.contains(&(lat + dy, lon + dx))))
}

/// The candidate most similar to `target`. The first one wins ties.
pub fn best_match(
    target: &[Coordinate],
    candidates: &[&[Coordinate]],
    cell_size: f64,
) -> Option<RerouteCandidate> {
    let mut best: Option<RerouteCandidate> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = match_percentage(target, candidate, cell_size).unwrap_or(0.0);
        if best.map_or(true, |b| score > b.match_percentage) {
            best = Some(RerouteCandidate {
                index,
                match_percentage: score,
            });
        }
    }
    best
}

/// Pick an alternative to the active route, or explain why none is taken.
///
/// Among candidates matching `current_geometry` by at least the policy
/// threshold, the one with the lowest duration is considered. It is
/// adopted as a faster route when it beats `current_duration_remaining`,
/// as an ETA update when it is slower by more than the margin.
pub fn select_reroute(
    current_geometry: &[Coordinate],
    current_duration_remaining: f64,
    candidates: &[(&[Coordinate], f64)],
    policy: &ReroutePolicy,
) -> Result<RerouteSelection, NavigationError> {
    let mut best_seen: Option<f64> = None;
    let mut chosen: Option<(RerouteCandidate, f64)> = None;

    for (index, (line, duration)) in candidates.iter().enumerate() {
        let score = match_percentage(current_geometry, line, policy.cell_size).unwrap_or(0.0);
        best_seen = Some(best_seen.map_or(score, |b| b.max(score)));
        if score < policy.match_threshold {
            continue;
        }
        if chosen.map_or(true, |(_, d)| *duration < d) {
            chosen = Some((
                RerouteCandidate {
                    index,
                    match_percentage: score,
                },
                *duration,
            ));
        }
    }

    let Some((candidate, duration)) = chosen else {
        return Err(NavigationError::NoConfidentMatch {
            best_match: best_seen,
        });
    };

    let difference = duration - current_duration_remaining;
    let reason = if difference < 0.0 {
        RerouteReason::FasterRoute
    } else if difference > policy.eta_update_margin {
        RerouteReason::EtaUpdate
    } else {
        return Err(NavigationError::NotImproved { difference });
    };

    Ok(RerouteSelection { candidate, reason })
}
