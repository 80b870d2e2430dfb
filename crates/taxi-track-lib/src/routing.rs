//! Routing providers
//!
//! A routing provider turns the sparse waypoints of a [`crate::Route`] into the path the
//! vehicle is drawn along. Two providers are available: the OSRM route service and an
//! offline straight-line interpolator.

use crate::{GeoPoint, ResolvedPath, Result, TrackError, point};
use serde::Deserialize;
use std::time::Duration;

/// Resolves ordered waypoints into a drawable path
///
/// Implementations may block; callers run them off the UI thread.
pub trait RoutingProvider: Send + Sync {
    fn resolve(&self, waypoints: &[GeoPoint]) -> Result<ResolvedPath>;

    /// Short description for logs
    fn name(&self) -> &'static str;
}

/// Public OSRM demo server
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

/// Driving routes from an OSRM HTTP server
pub struct OsrmRouter {
    base_url: String,
    profile: String,
    timeout: Duration,
}

impl OsrmRouter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            profile: "driving".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the route request URL (`lng,lat` pairs separated by `;`)
    pub fn request_url(&self, waypoints: &[GeoPoint]) -> String {
        let coordinates = waypoints
            .iter()
            .map(|p| format!("{:.6},{:.6}", p.lng, p.lat))
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{}/route/v1/{}/{}?overview=full&geometries=geojson",
            self.base_url, self.profile, coordinates
        )
    }
}

impl Default for OsrmRouter {
    fn default() -> Self {
        Self::new(DEFAULT_OSRM_URL)
    }
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: `[lng, lat]`
    coordinates: Vec<[f64; 2]>,
}

/// Parse an OSRM `route` response body into a path
pub fn parse_osrm_response(body: &[u8]) -> Result<ResolvedPath> {
    let response: OsrmResponse = serde_json::from_slice(body)
        .map_err(|e| TrackError::RoutingFailed(format!("invalid OSRM response: {e}")))?;

    if response.code != "Ok" {
        return Err(TrackError::RoutingFailed(format!(
            "OSRM returned {}: {}",
            response.code,
            response.message.unwrap_or_default()
        )));
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| TrackError::RoutingFailed("OSRM returned no routes".to_string()))?;

    let points = route
        .geometry
        .coordinates
        .into_iter()
        .map(|[lng, lat]| GeoPoint::new(lat, lng))
        .collect();

    ResolvedPath::new(points)
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RoutingProvider for OsrmRouter {
    fn resolve(&self, waypoints: &[GeoPoint]) -> Result<ResolvedPath> {
        match waypoints {
            [] => return Err(TrackError::RoutingFailed("no waypoints".to_string())),
            // OSRM needs two coordinates; a single point is its own path
            [single] => return ResolvedPath::new(vec![*single]),
            _ => {}
        }

        let url = self.request_url(waypoints);
        tracing::debug!("Requesting route for {} waypoints", waypoints.len());

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TrackError::RoutingFailed(format!("HTTP client: {e}")))?;

        let response = client
            .get(&url)
            .send()
            .map_err(|e| TrackError::RoutingFailed(format!("Request failed: {e}")))?;

        // OSRM reports errors as JSON with a 400 status, so the body is parsed either way
        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| TrackError::RoutingFailed(format!("Failed to read response: {e}")))?;

        let path = parse_osrm_response(&body).map_err(|e| {
            tracing::warn!("Routing request failed with HTTP {status}: {e}");
            e
        })?;

        tracing::debug!(
            "Resolved {} waypoints into {} path points ({:.2} km)",
            waypoints.len(),
            path.len(),
            path.total_distance_km()
        );
        Ok(path)
    }

    fn name(&self) -> &'static str {
        "osrm"
    }
}

/// Offline provider: straight segments between waypoints, densified
///
/// Consecutive output points are at most `max_step_km` apart so playback moves at an
/// even pace.
pub struct StraightLineRouter {
    max_step_km: f64,
}

impl StraightLineRouter {
    pub fn new(max_step_km: f64) -> Self {
        Self {
            max_step_km: max_step_km.max(1e-3),
        }
    }
}

impl Default for StraightLineRouter {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl RoutingProvider for StraightLineRouter {
    fn resolve(&self, waypoints: &[GeoPoint]) -> Result<ResolvedPath> {
        let Some(first) = waypoints.first() else {
            return Err(TrackError::RoutingFailed("no waypoints".to_string()));
        };

        let mut points = vec![*first];
        for pair in waypoints.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let steps = (point::haversine_km(a, b) / self.max_step_km).ceil().max(1.0) as usize;
            for i in 1..=steps {
                let t = i as f64 / steps as f64;
                points.push(GeoPoint::new(
                    a.lat + (b.lat - a.lat) * t,
                    a.lng + (b.lng - a.lng) * t,
                ));
            }
        }

        ResolvedPath::new(points)
    }

    fn name(&self) -> &'static str {
        "straight-line"
    }
}
