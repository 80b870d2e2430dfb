//! Taxi Track Library - Route playback and live tracking core
//!
//! This library holds everything the map viewer does that is not drawing: loading the
//! static route table, resolving drivable paths, following the device position, and
//! the state machine that switches between the two.
//!
//! # Architecture
//!
//! - **[`RouteRepository`]**: Period-keyed route table behind a [`RouteSource`]
//! - **[`RoutingProvider`]**: Turns route waypoints into a drawable [`ResolvedPath`]
//! - **[`GeolocationSource`]**: One-shot and continuous device position updates
//! - **[`MapView`]**: The narrow map surface; [`MapScene`] is the in-memory implementation
//! - **[`RouteAnimator`]**: Steps the vehicle marker along a resolved path
//! - **[`ModeController`]**: Live / Historical state machine owning the session
//!
//! # Concurrency
//!
//! The controller never blocks. Slow collaborator work is handed out as [`Request`]s and
//! comes back as [`SessionEvent`]s stamped with the [`Generation`] that asked for it, so
//! results that arrive after the user moved on are dropped instead of applied.

mod animator;
mod controller;
pub mod geolocation;
mod map_view;
mod notify;
mod point;
mod repository;
mod route;
pub mod routing;

// Public API exports
pub use animator::{
    AnimationState, DEFAULT_SPEED, RouteAnimator, SPEED_MAX, SPEED_MIN, TickHandle, TickOutcome,
    VehicleInfo, speed_multiplier,
};
pub use controller::{
    Generation, Mode, ModeController, Request, Selection, SessionConfig, SessionEvent,
};
pub use geolocation::{GeolocationSource, Permission, PositionFix, PositionOptions, PositionSink};
pub use map_view::{CameraCommand, Layer, LayerHandle, MapScene, MapView, Marker, MarkerIcon};
pub use notify::{Notification, Notifier};
pub use point::{GeoPoint, bounding_rect, haversine_km};
pub use repository::{
    FileRouteSource, HttpRouteSource, RouteRepository, RouteSource, RouteTable,
    StaticRouteSource,
};
pub use route::{Period, ResolvedPath, Route};
pub use routing::RoutingProvider;

/// Error types for the tracking core
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Route data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Location permission denied")]
    LocationPermissionDenied,

    #[error("Location unavailable")]
    LocationUnavailable,

    #[error("Location request timed out")]
    LocationTimeout,

    #[error("Geolocation not supported")]
    LocationUnsupported,

    #[error("Routing failed: {0}")]
    RoutingFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackError {
    /// Text shown to the user in the transient notification
    pub fn user_message(&self) -> String {
        match self {
            Self::DataUnavailable(reason) if reason.is_empty() => {
                "No route data available for selected period".to_string()
            }
            Self::DataUnavailable(reason) => reason.clone(),
            Self::LocationPermissionDenied => {
                "Location access was denied. Please enable location services to use live tracking."
                    .to_string()
            }
            Self::LocationUnavailable => {
                "Location information is currently unavailable. Please try again later."
                    .to_string()
            }
            Self::LocationTimeout => {
                "Location request timed out. Please check your connection.".to_string()
            }
            Self::LocationUnsupported => "Your device doesn't support geolocation.".to_string(),
            Self::RoutingFailed(_) => "Failed to compute the route. Please try again.".to_string(),
            Self::Io(_) | Self::Json(_) => "No route data available".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert!(
            TrackError::LocationPermissionDenied
                .user_message()
                .contains("denied")
        );
        assert!(TrackError::LocationTimeout.user_message().contains("timed out"));
        assert_eq!(
            TrackError::DataUnavailable(String::new()).user_message(),
            "No route data available for selected period"
        );
        assert_eq!(
            TrackError::DataUnavailable("No route data available".into()).user_message(),
            "No route data available"
        );
    }
}
