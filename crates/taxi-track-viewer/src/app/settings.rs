use crate::entrypoints::parse_args;
use clap::{Parser, ValueEnum};
use std::path::Path;
use std::time::Duration;
use taxi_track_lib::geolocation::{FixedGeolocation, UnsupportedGeolocation};
use taxi_track_lib::routing::{DEFAULT_OSRM_URL, OsrmRouter, StraightLineRouter};
use taxi_track_lib::{
    DEFAULT_SPEED, FileRouteSource, GeoPoint, GeolocationSource, HttpRouteSource, Period,
    RouteRepository, RoutingProvider, SPEED_MAX, Selection, SessionConfig, StaticRouteSource,
};

/// Route data bundled into the binary
const EMBEDDED_ROUTES: &str = include_str!("../../data/taxi_routes.json");

const DEFAULT_ROUTES: &str = "data/taxi_routes.json";

const NETWORK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterKind {
    /// Snap routes to roads with an OSRM server
    Osrm,
    /// Join waypoints with straight segments
    Straight,
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Taxi Track Viewer - Replay a taxi's recorded route or follow the device position on a map
pub struct Settings {
    /// Route data: a JSON file path or an http(s) URL
    #[clap(long, value_name = "PATH|URL", default_value = DEFAULT_ROUTES)]
    pub routes: String,

    /// Period shown on startup
    #[clap(long, default_value = "yesterday")]
    pub period: String,

    /// Start in live tracking mode
    #[clap(long, default_value = "false")]
    pub live: bool,

    /// Period shown when live tracking fails
    #[clap(long, default_value = "yesterday")]
    pub fallback_period: String,

    /// How route waypoints become a drawable path
    #[clap(long, value_enum, default_value = "osrm")]
    pub router: RouterKind,

    /// OSRM server used by the osrm router
    #[clap(long, default_value = DEFAULT_OSRM_URL)]
    pub osrm_url: String,

    /// Device position as LAT,LNG (live mode is unsupported without it)
    #[clap(long, value_name = "LAT,LNG", value_parser = parse_location)]
    pub location: Option<GeoPoint>,

    /// Accuracy radius of the device position, in meters
    #[clap(long, default_value = "25")]
    pub accuracy: f64,

    /// Ask before using the device position in live mode
    #[clap(long, default_value = "false")]
    pub ask_location: bool,

    /// Initial speed slider value (0-190, lower is faster)
    #[clap(
        long,
        default_value_t = DEFAULT_SPEED,
        value_parser = clap::value_parser!(u32).range(0..=SPEED_MAX as i64)
    )]
    pub speed: u32,
}

/// Parse `LAT,LNG` into a point
fn parse_location(s: &str) -> Result<GeoPoint, String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got {s:?}"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("invalid latitude {lat:?}: {e}"))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|e| format!("invalid longitude {lng:?}: {e}"))?;

    let point = GeoPoint::new(lat, lng);
    if !point.is_valid() {
        return Err(format!("{lat},{lng} is not a valid position"));
    }
    Ok(point)
}

impl Settings {
    /// Parse the process arguments, exiting with usage on error
    pub fn from_cli() -> Self {
        match parse_args::<Settings>() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Where route data comes from
    pub fn route_repository(&self) -> RouteRepository {
        if self.routes.starts_with("http://") || self.routes.starts_with("https://") {
            return RouteRepository::new(
                HttpRouteSource::new(self.routes.clone()).with_timeout(NETWORK_TIMEOUT),
            );
        }

        if self.routes == DEFAULT_ROUTES && !Path::new(&self.routes).exists() {
            tracing::info!("{DEFAULT_ROUTES} not found, using the bundled sample routes");
            return RouteRepository::new(StaticRouteSource::new(EMBEDDED_ROUTES));
        }

        RouteRepository::new(FileRouteSource::new(&self.routes))
    }

    pub fn routing_provider(&self) -> Box<dyn RoutingProvider> {
        match self.router {
            RouterKind::Osrm => {
                Box::new(OsrmRouter::new(self.osrm_url.clone()).with_timeout(NETWORK_TIMEOUT))
            }
            RouterKind::Straight => Box::new(StraightLineRouter::default()),
        }
    }

    pub fn geolocation(&self) -> Box<dyn GeolocationSource> {
        match self.location {
            Some(point) => {
                let source = FixedGeolocation::new(point, self.accuracy.max(0.0));
                if self.ask_location {
                    Box::new(source.asking_first())
                } else {
                    Box::new(source)
                }
            }
            None => Box::new(UnsupportedGeolocation),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            fallback_period: Period::new(self.fallback_period.clone()),
            initial_speed: self.speed,
            ..SessionConfig::default()
        }
    }

    /// Selector value on startup
    pub fn initial_selection(&self) -> Selection {
        if self.live {
            Selection::Live
        } else {
            Selection::Historical(Period::new(self.period.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxi_track_lib::{Permission, RouteTable};

    fn parse(args: &[&str]) -> Settings {
        Settings::try_parse_from(std::iter::once("taxi-track-viewer").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&[]);
        assert_eq!(settings.routes, DEFAULT_ROUTES);
        assert_eq!(settings.router, RouterKind::Osrm);
        assert_eq!(settings.osrm_url, DEFAULT_OSRM_URL);
        assert_eq!(settings.speed, 50);
        assert!(settings.location.is_none());
        assert_eq!(
            settings.initial_selection(),
            Selection::Historical(Period::from("yesterday"))
        );

        let config = settings.session_config();
        assert_eq!(config.fallback_period, Period::from("yesterday"));
        assert_eq!(config.default_zoom, 13.0);
        assert_eq!(settings.geolocation().permission(), Permission::Unsupported);
    }

    #[test]
    fn test_live_with_location() {
        let settings = parse(&["--live", "--location", "18.5314, 73.8446", "--accuracy", "40"]);
        assert_eq!(settings.initial_selection(), Selection::Live);
        assert_eq!(settings.location, Some(GeoPoint::new(18.5314, 73.8446)));
        assert_eq!(settings.geolocation().permission(), Permission::Granted);
    }

    #[test]
    fn test_ask_location() {
        let settings = parse(&["--location", "18.5314,73.8446", "--ask-location"]);
        assert_eq!(settings.geolocation().permission(), Permission::Prompt);

        // Nothing to ask about without a position
        let settings = parse(&["--ask-location"]);
        assert_eq!(settings.geolocation().permission(), Permission::Unsupported);
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let bad = [
            vec!["--location", "18.5"],
            vec!["--location", "north,73.8"],
            vec!["--location", "95,73.8"],
            vec!["--speed", "200"],
            vec!["--router", "teleport"],
        ];
        for args in bad {
            let full = std::iter::once("taxi-track-viewer").chain(args.iter().copied());
            assert!(Settings::try_parse_from(full).is_err(), "{args:?}");
        }
    }

    #[test]
    fn test_router_selection() {
        assert_eq!(parse(&[]).routing_provider().name(), "osrm");
        assert_eq!(
            parse(&["--router", "straight"]).routing_provider().name(),
            "straight-line"
        );
    }

    #[test]
    fn test_embedded_routes_parse() {
        let table = RouteTable::from_json(EMBEDDED_ROUTES.as_bytes()).unwrap();
        let periods = table.periods();
        assert!(periods.contains(&Period::from("yesterday")));
        for period in &periods {
            assert!(table.route(period).is_ok(), "{period}");
        }
    }
}
