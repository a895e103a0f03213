//! Turn-by-turn route tracking for NDKarte.
//!
//! Feed a [`RouteController`] a route and a stream of location fixes; it
//! snaps them to the route, tracks progress through steps and legs, and
//! decides when a new route is needed. Directions come from the host
//! through [`DirectionsProvider`]. The Android app drives everything
//! through the JNI bridge in [`android_jni`].

pub mod android_jni;
pub mod comparator;
pub mod config;
pub mod controller;
pub mod error;
pub mod geometry;
pub mod gpx;
pub mod location;
pub mod maneuver;
pub mod off_route;
pub mod progress;
pub mod replay;
pub mod route;
pub mod session;
pub mod simplify;
pub mod snapping;
pub mod stats;
pub mod tunnel;

#[cfg(test)]
mod fixtures;

pub use comparator::{RerouteCandidate, RerouteReason};
pub use config::NavigationConfig;
pub use controller::{
    DirectionsProvider, NavigationDelegate, NavigationState, RequestId, RouteController,
};
pub use error::NavigationError;
pub use geometry::Coordinate;
pub use location::{Heading, Location, LocationSource, LocationUpdate};
pub use progress::{LegProgress, RouteProgress, StepProgress};
pub use route::{Route, RouteLeg, RouteRequest, RouteStep, Waypoint};
pub use session::{NavigationEvent, Session};
pub use snapping::SnappedLocation;
pub use stats::SessionStats;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
