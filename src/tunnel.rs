//! Tunnel detection.
//!
//! Inside a tunnel fixes degrade or stop. When the traveler drives into
//! a tunnel the controller switches to dead-reckoned fixes along the
//! route, and switches back once the receiver reports enough good fixes.

use crate::config::NavigationConfig;
use crate::location::Location;
use crate::progress::LegProgress;
use crate::route::Intersection;

/// Whether `location` is inside a tunnel or about to enter one.
///
/// True when the last intersection passed on the current step leads into
/// a tunnel, or when the next one does and is closer than
/// `tunnel_entrance_distance`. Accurate fixes must also be moving at
/// least `tunnel_entrance_minimum_speed` for the second case.
pub fn at_tunnel_entrance(location: &Location, leg: &LegProgress, config: &NavigationConfig) -> bool {
    let traveled = leg.current_step_progress().distance_traveled();
    let (passed, upcoming) = split_intersections(&leg.current_step().intersections, traveled);

    if passed.is_some_and(|i| i.tunnel) {
        return true;
    }
    let Some(upcoming) = upcoming.filter(|i| i.tunnel) else {
        return false;
    };
    let moving = location.speed >= config.tunnel_entrance_minimum_speed;
    let unreliable = !location.is_qualified(config.maximum_qualified_accuracy);
    (moving || unreliable) && upcoming.distance_along_step - traveled < config.tunnel_entrance_distance
}

/// Last intersection at or behind `traveled`, and the first one ahead of it.
fn split_intersections(
    intersections: &[Intersection],
    traveled: f64,
) -> (Option<&Intersection>, Option<&Intersection>) {
    let ahead = intersections
        .iter()
        .position(|i| i.distance_along_step > traveled)
        .unwrap_or(intersections.len());
    let passed = ahead.checked_sub(1).and_then(|i| intersections.get(i));
    (passed, intersections.get(ahead))
}

/// Leg and step index of a step.
pub type StepKey = (usize, usize);

/// Per-session tunnel state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TunnelTracker {
    inside: bool,
    exit_fixes: u32,
    exited_on: Option<StepKey>,
}

impl TunnelTracker {
    pub fn is_inside(&self) -> bool {
        self.inside
    }

    /// True when a tunnel was left on `step`. Good fixes there do not re-enter it.
    pub fn exited_on(&self, step: StepKey) -> bool {
        self.exited_on == Some(step)
    }

    /// Returns true when this call started the tunnel.
    pub fn enter(&mut self) -> bool {
        let entered = !self.inside;
        self.inside = true;
        self.exit_fixes = 0;
        self.exited_on = None;
        entered
    }

    /// Count a qualified fix on `step`. Returns true once enough have
    /// been seen to leave the tunnel.
    pub fn record_qualified_fix(&mut self, config: &NavigationConfig, step: StepKey) -> bool {
        if !self.inside {
            return false;
        }
        self.exit_fixes += 1;
        if self.exit_fixes < config.tunnel_exit_fixes {
            return false;
        }
        self.inside = false;
        self.exit_fixes = 0;
        self.exited_on = Some(step);
        true
    }
}
