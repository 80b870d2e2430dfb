//! Route and resolved path types
//!
//! A [`Route`] is what the route data file holds for one period: the raw waypoints.
//! A [`ResolvedPath`] is what the routing provider makes of them: the drawable line the
//! vehicle actually follows, usually with many more points.

use crate::{GeoPoint, Result, TrackError, point};
use geo::Rect;
use std::fmt;

/// Key of a historical time bucket in the route data (e.g. `"yesterday"`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period(String);

impl Period {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable label (`"last_week"` becomes `"Last week"`)
    pub fn label(&self) -> String {
        let spaced = self.0.replace(['_', '-'], " ");
        let mut chars = spaced.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Period {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// The waypoints recorded for one period
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    period: Period,
    points: Vec<GeoPoint>,
}

impl Route {
    /// Create a route, rejecting empty point lists
    pub fn new(period: Period, points: Vec<GeoPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(TrackError::DataUnavailable(String::new()));
        }
        Ok(Self { period, points })
    }

    #[inline]
    pub fn period(&self) -> &Period {
        &self.period
    }

    #[inline]
    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    #[inline]
    pub fn start(&self) -> GeoPoint {
        self.points[0]
    }

    #[inline]
    pub fn end(&self) -> GeoPoint {
        self.points[self.points.len() - 1]
    }
}

/// Drawable path returned by a routing provider, with its precomputed bounds
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPath {
    points: Vec<GeoPoint>,
    bounds: Rect<f64>,
    total_distance_km: f64,
}

impl ResolvedPath {
    /// Create a path, failing with `RoutingFailed` when there is nothing to draw
    pub fn new(points: Vec<GeoPoint>) -> Result<Self> {
        let bounds = point::bounding_rect(&points)
            .ok_or_else(|| TrackError::RoutingFailed("empty path".to_string()))?;
        let total_distance_km = points
            .windows(2)
            .map(|w| point::haversine_km(w[0], w[1]))
            .sum();
        Ok(Self {
            points,
            bounds,
            total_distance_km,
        })
    }

    #[inline]
    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<GeoPoint> {
        self.points.get(index).copied()
    }

    /// First point; a path is never empty
    #[inline]
    pub fn start(&self) -> GeoPoint {
        self.points[0]
    }

    /// Bounding rectangle (x = longitude, y = latitude)
    #[inline]
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Length of the whole path in kilometers
    #[inline]
    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_km
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn morning() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(18.50, 73.85),
            GeoPoint::new(18.51, 73.86),
            GeoPoint::new(18.52, 73.87),
        ]
    }

    #[test]
    fn test_route_creation() {
        let route = Route::new(Period::from("morning"), morning()).unwrap();
        assert_eq!(route.points().len(), 3);
        assert_eq!(route.start(), GeoPoint::new(18.50, 73.85));
        assert_eq!(route.end(), GeoPoint::new(18.52, 73.87));
        assert_eq!(route.period().as_str(), "morning");
    }

    #[test]
    fn test_empty_route_fails() {
        let result = Route::new(Period::from("morning"), Vec::new());
        assert!(matches!(result, Err(TrackError::DataUnavailable(_))));
    }

    #[test]
    fn test_empty_path_fails() {
        let result = ResolvedPath::new(Vec::new());
        assert!(matches!(result, Err(TrackError::RoutingFailed(_))));
    }

    #[test]
    fn test_path_metadata() {
        let path = ResolvedPath::new(morning()).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.get(1), Some(GeoPoint::new(18.51, 73.86)));
        assert_eq!(path.get(3), None);
        assert!(path.bounds().width() > 0.0);
        // Two hops of roughly 1.5 km each
        assert!(path.total_distance_km() > 2.5 && path.total_distance_km() < 3.5);
    }

    #[test]
    fn test_period_label() {
        assert_eq!(Period::from("last_week").label(), "Last week");
        assert_eq!(Period::from("yesterday").label(), "Yesterday");
        assert_eq!(Period::from("").label(), "");
    }
}
