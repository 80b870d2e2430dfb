//! Geographic points and the small amount of geometry the viewer needs

use geo::Rect;
use serde::{Deserialize, Serialize};

/// Earth's mean radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 position, serialized as `{"lat": .., "lng": ..}` like the route data file
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Coordinates with four decimals, as shown in popups
    pub fn format_short(&self) -> String {
        format!("{:.4}, {:.4}", self.lat, self.lng)
    }

    /// Whether both components are finite and inside the WGS84 range
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<GeoPoint> for geo::Coord<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::Coord { x: p.lng, y: p.lat }
    }
}

/// Haversine distance between two points in kilometers
#[inline]
pub fn haversine_km(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let delta_lat = (p2.lat - p1.lat).to_radians();
    let delta_lon = (p2.lng - p1.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Bounding rectangle (x = longitude, y = latitude) of a point list
///
/// Returns `None` for an empty list. A single point yields a degenerate rectangle.
pub fn bounding_rect(points: &[GeoPoint]) -> Option<Rect<f64>> {
    let first = points.first()?;
    let mut min = geo::Coord::from(*first);
    let mut max = min;

    for p in &points[1..] {
        min.x = min.x.min(p.lng);
        min.y = min.y.min(p.lat);
        max.x = max.x.max(p.lng);
        max.y = max.y.max(p.lat);
    }

    Some(Rect::new(min, max))
}

/// Rectangle covering a circle of `radius_m` meters around `center`
pub fn circle_bounds(center: GeoPoint, radius_m: f64) -> Rect<f64> {
    let dlat = (radius_m / 1000.0 / EARTH_RADIUS_KM).to_degrees();
    let cos_lat = center.lat.to_radians().cos().max(1e-6);
    let dlng = dlat / cos_lat;
    Rect::new(
        geo::Coord {
            x: center.lng - dlng,
            y: center.lat - dlat,
        },
        geo::Coord {
            x: center.lng + dlng,
            y: center.lat + dlat,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero() {
        let p = GeoPoint::new(18.5204, 73.8567);
        assert!(haversine_km(p, p).abs() < 1e-12);
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is roughly 111.2 km
        let d = haversine_km(GeoPoint::new(18.0, 73.0), GeoPoint::new(19.0, 73.0));
        assert!((d - 111.19).abs() < 0.1, "got {d}");
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let a = GeoPoint::new(18.50, 73.85);
        let b = GeoPoint::new(18.52, 73.87);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-12);
    }

    #[test]
    fn test_bounding_rect() {
        assert!(bounding_rect(&[]).is_none());

        let rect = bounding_rect(&[
            GeoPoint::new(18.50, 73.87),
            GeoPoint::new(18.52, 73.85),
            GeoPoint::new(18.51, 73.86),
        ])
        .unwrap();
        assert_eq!(rect.min().x, 73.85);
        assert_eq!(rect.max().x, 73.87);
        assert_eq!(rect.min().y, 18.50);
        assert_eq!(rect.max().y, 18.52);
    }

    #[test]
    fn test_circle_bounds_contains_center() {
        let center = GeoPoint::new(18.5204, 73.8567);
        let rect = circle_bounds(center, 100.0);
        assert!(rect.min().y < center.lat && rect.max().y > center.lat);
        assert!(rect.min().x < center.lng && rect.max().x > center.lng);
        // 100 m is just under a thousandth of a degree of latitude
        assert!(rect.height() > 0.0017 && rect.height() < 0.0019);
    }

    #[test]
    fn test_validity_and_format() {
        assert!(GeoPoint::new(18.5, 73.8).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
        assert_eq!(GeoPoint::new(18.5, 73.85).format_short(), "18.5000, 73.8500");
    }
}
