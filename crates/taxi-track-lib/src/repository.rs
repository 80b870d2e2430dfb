//! Route repository
//!
//! The route data is a single static JSON document keyed by period:
//!
//! ```json
//! { "yesterday": { "coordinates": [ { "lat": 18.52, "lng": 73.85 }, ... ] } }
//! ```
//!
//! It is fetched again on every request; nothing is cached here. The caller keeps the
//! [`Route`] it got for as long as its session lasts.

use crate::{GeoPoint, Period, Result, Route, TrackError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Where the raw route document comes from
///
/// Implementations are blocking; callers run them off the UI thread.
pub trait RouteSource: Send + Sync {
    /// Fetch the raw document bytes
    fn fetch(&self) -> Result<Vec<u8>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Route data read from a local file
pub struct FileRouteSource {
    path: PathBuf,
}

impl FileRouteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RouteSource for FileRouteSource {
    fn fetch(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Route data downloaded over HTTP(S)
pub struct HttpRouteSource {
    url: String,
    timeout: Duration,
}

impl HttpRouteSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl RouteSource for HttpRouteSource {
    fn fetch(&self) -> Result<Vec<u8>> {
        // A blocking client must not be created or dropped inside an async context
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TrackError::DataUnavailable(format!("HTTP client: {e}")))?;

        let response = client
            .get(&self.url)
            .send()
            .map_err(|e| TrackError::DataUnavailable(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TrackError::DataUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| TrackError::DataUnavailable(format!("Failed to read response: {e}")))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Route data held in memory (embedded sample data, tests)
pub struct StaticRouteSource {
    json: String,
}

impl StaticRouteSource {
    pub fn new(json: impl Into<String>) -> Self {
        Self { json: json.into() }
    }
}

impl RouteSource for StaticRouteSource {
    fn fetch(&self) -> Result<Vec<u8>> {
        Ok(self.json.as_bytes().to_vec())
    }

    fn describe(&self) -> String {
        "embedded route data".to_string()
    }
}

#[derive(Deserialize)]
struct RawRoute {
    #[serde(default)]
    coordinates: Vec<GeoPoint>,
}

/// Parsed route document
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: BTreeMap<Period, Vec<GeoPoint>>,
}

impl RouteTable {
    /// Parse the JSON document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: BTreeMap<String, RawRoute> = serde_json::from_slice(bytes)?;
        let routes = raw
            .into_iter()
            .map(|(key, route)| (Period::new(key), route.coordinates))
            .collect();
        Ok(Self { routes })
    }

    /// All period keys, sorted by name
    pub fn periods(&self) -> Vec<Period> {
        self.routes.keys().cloned().collect()
    }

    /// The route for a period; absent or empty periods are unavailable
    pub fn route(&self, period: &Period) -> Result<Route> {
        let points = self
            .routes
            .get(period)
            .filter(|points| !points.is_empty())
            .ok_or_else(|| TrackError::DataUnavailable(String::new()))?;

        if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
            tracing::warn!(
                "Route {period} contains an invalid point ({}, {})",
                bad.lat,
                bad.lng
            );
            return Err(TrackError::DataUnavailable(String::new()));
        }

        Route::new(period.clone(), points.clone())
    }
}

/// Loads routes by period from a [`RouteSource`]
pub struct RouteRepository {
    source: Box<dyn RouteSource>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteRepository {
    pub fn new(source: impl RouteSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Fetch and parse the whole table
    ///
    /// Fetch and parse failures are reported as `DataUnavailable` so callers only deal
    /// with one kind of "no data" outcome.
    pub fn load_table(&self) -> Result<RouteTable> {
        let bytes = self.source.fetch().map_err(|e| {
            tracing::warn!("Error loading route data from {}: {e}", self.source.describe());
            TrackError::DataUnavailable("No route data available".to_string())
        })?;

        RouteTable::from_json(&bytes).map_err(|e| {
            tracing::warn!("Error parsing route data from {}: {e}", self.source.describe());
            TrackError::DataUnavailable("No route data available".to_string())
        })
    }

    /// Fetch the table and return the route for one period
    pub fn load(&self, period: &Period) -> Result<Route> {
        let route = self.load_table()?.route(period)?;
        tracing::debug!(
            "Loaded route {} with {} points from {}",
            period,
            route.points().len(),
            self.source.describe()
        );
        Ok(route)
    }

    /// Fetch the table and list its periods
    pub fn periods(&self) -> Result<Vec<Period>> {
        Ok(self.load_table()?.periods())
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "morning": { "coordinates": [
            { "lat": 18.50, "lng": 73.85 },
            { "lat": 18.51, "lng": 73.86 },
            { "lat": 18.52, "lng": 73.87 }
        ] },
        "yesterday": { "coordinates": [ { "lat": 18.5204, "lng": 73.8567 } ] },
        "empty": { "coordinates": [] }
    }"#;

    struct FailingSource;

    impl RouteSource for FailingSource {
        fn fetch(&self) -> Result<Vec<u8>> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn test_load_route() {
        let repo = RouteRepository::new(StaticRouteSource::new(SAMPLE));
        let route = repo.load(&Period::from("morning")).unwrap();
        assert_eq!(route.points().len(), 3);
        assert_eq!(route.start(), GeoPoint::new(18.50, 73.85));
    }

    #[test]
    fn test_repeated_loads_are_identical() {
        let repo = RouteRepository::new(StaticRouteSource::new(SAMPLE));
        let a = repo.load(&Period::from("morning")).unwrap();
        let b = repo.load(&Period::from("morning")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_absent_period_is_unavailable() {
        let repo = RouteRepository::new(StaticRouteSource::new(SAMPLE));
        let result = repo.load(&Period::from("last_year"));
        assert!(matches!(result, Err(TrackError::DataUnavailable(_))));
    }

    #[test]
    fn test_empty_period_is_unavailable() {
        let repo = RouteRepository::new(StaticRouteSource::new(SAMPLE));
        let result = repo.load(&Period::from("empty"));
        assert!(matches!(result, Err(TrackError::DataUnavailable(_))));
    }

    #[test]
    fn test_unparseable_data_is_unavailable() {
        let repo = RouteRepository::new(StaticRouteSource::new("{ not json"));
        let result = repo.load(&Period::from("morning"));
        assert!(matches!(result, Err(TrackError::DataUnavailable(_))));
    }

    #[test]
    fn test_fetch_failure_is_unavailable() {
        let repo = RouteRepository::new(FailingSource);
        assert!(matches!(
            repo.periods(),
            Err(TrackError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let repo = RouteRepository::new(FileRouteSource::new("/nonexistent/taxi_routes.json"));
        assert!(matches!(
            repo.load(&Period::from("yesterday")),
            Err(TrackError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_invalid_point_is_unavailable() {
        let json = r#"{ "bad": { "coordinates": [ { "lat": 123.0, "lng": 73.0 } ] } }"#;
        let table = RouteTable::from_json(json.as_bytes()).unwrap();
        assert!(table.route(&Period::from("bad")).is_err());
    }

    #[test]
    fn test_periods_are_sorted_by_name() {
        let repo = RouteRepository::new(StaticRouteSource::new(SAMPLE));
        let periods = repo.periods().unwrap();
        let keys: Vec<&str> = periods.iter().map(|p| p.as_str()).collect();
        assert_eq!(keys, vec!["empty", "morning", "yesterday"]);
    }
}
