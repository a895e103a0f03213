//! Error taxonomy of the navigation engine.

/// Everything that can go wrong while building routes or tracking them.
///
/// Only [`NavigationError::InvalidRouteGeometry`], [`NavigationError::InvalidConfig`]
/// and the document parsing variants are hard failures. The rest describe runtime
/// outcomes that the controller recovers from locally.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NavigationError {
    #[error("invalid route geometry: {0}")]
    InvalidRouteGeometry(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("directions request failed: {0}")]
    DirectionsRequestFailed(String),
    #[error("directions provider returned no routes")]
    NoCandidateRoute,
    #[error("no candidate route matched the current route closely enough (best match {best_match:?}%)")]
    NoConfidentMatch { best_match: Option<f64> },
    #[error("candidate route changes the remaining duration by only {difference:.0} s")]
    NotImproved { difference: f64 },
    #[error("discarded location: {0}")]
    DiscardedLocation(String),
    #[error("JSON error: {0}")]
    Json(String),
    #[error("GPX parse error: {0}")]
    Gpx(String),
}

impl From<serde_json::Error> for NavigationError {
    fn from(err: serde_json::Error) -> Self {
        NavigationError::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavigationError>;
