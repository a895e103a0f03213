//! Statistics of one navigation session.

use std::collections::VecDeque;

use serde::Serialize;

use crate::location::Location;

/// What happened over a session, across reroutes.
///
/// Timestamps are those of the fixes that caused them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub departure_timestamp: Option<f64>,
    /// Set on arrival at the final destination.
    pub arrival_timestamp: Option<f64>,
    /// Meters traveled along every route of the session.
    pub total_distance_completed: f64,
    pub number_of_reroutes: u32,
    pub last_reroute_timestamp: Option<f64>,
    /// Most recent raw fixes, oldest first.
    pub past_locations: VecDeque<Location>,
    #[serde(skip)]
    distance_on_replaced_routes: f64,
}

impl SessionStats {
    pub(crate) fn record_location(&mut self, location: &Location, limit: usize) {
        self.departure_timestamp.get_or_insert(location.timestamp);
        if limit == 0 {
            return;
        }
        while self.past_locations.len() >= limit {
            self.past_locations.pop_front();
        }
        self.past_locations.push_back(*location);
    }

    /// Update the total with the distance traveled on the current route.
    pub(crate) fn record_progress(&mut self, traveled_on_route: f64) {
        self.total_distance_completed = self.distance_on_replaced_routes + traveled_on_route;
    }

    /// The current route is about to be replaced after `traveled_on_route` meters.
    pub(crate) fn record_route_replaced(&mut self, traveled_on_route: f64) {
        self.distance_on_replaced_routes += traveled_on_route;
        self.total_distance_completed = self.distance_on_replaced_routes;
    }

    pub(crate) fn record_reroute(&mut self, timestamp: Option<f64>) {
        self.number_of_reroutes += 1;
        self.last_reroute_timestamp = timestamp;
    }

    pub(crate) fn record_arrival(&mut self, timestamp: Option<f64>) {
        self.arrival_timestamp = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{fix, ORIGIN};

    #[test]
    fn past_locations_are_bounded() {
        let mut stats = SessionStats::default();
        for t in 0..5 {
            stats.record_location(&fix(ORIGIN, 0.0, 10.0, t as f64), 3);
        }
        assert_eq!(stats.departure_timestamp, Some(0.0));
        let kept: Vec<f64> = stats.past_locations.iter().map(|l| l.timestamp).collect();
        assert_eq!(kept, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn distance_accumulates_over_replaced_routes() {
        let mut stats = SessionStats::default();
        stats.record_progress(120.0);
        stats.record_route_replaced(150.0);
        stats.record_reroute(Some(30.0));
        stats.record_progress(40.0);

        assert_eq!(stats.total_distance_completed, 190.0);
        assert_eq!(stats.number_of_reroutes, 1);
        assert_eq!(stats.last_reroute_timestamp, Some(30.0));
    }
}
