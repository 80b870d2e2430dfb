//! Live / Historical mode controller
//!
//! [`ModeController`] owns the whole session: which mode is active, the markers it put
//! on the map, the geolocation watch, the animator and the notification. It is a plain
//! state machine. It never blocks and never spawns; work that needs the network or the
//! disk is queued as a [`Request`] (see [`ModeController::take_requests`]) and its
//! result is fed back in as a [`SessionEvent`].
//!
//! Every transition bumps the session [`Generation`]. Requests and position sinks carry
//! the generation they were created under, and events from an older generation are
//! dropped, so a slow route lookup for a period the user already left never lands on
//! the map.
//!
//! Resource discipline: the previous mode is torn down completely (animation stopped,
//! watch cleared, layers removed) before anything for the next mode is acquired, so a
//! watch and a running animation never coexist.

use crate::geolocation::{
    GeolocationSource, Permission, PositionFix, PositionOptions, PositionSink, WatchHandle,
};
use crate::notify::{NOTIFICATION_DURATION, Notification, Notifier};
use crate::{
    AnimationState, GeoPoint, LayerHandle, MapView, MarkerIcon, Period, ResolvedPath, Result,
    Route, RouteAnimator, RouteRepository, RoutingProvider, TrackError, VehicleInfo, animator,
    point,
};
use instant::Instant;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Transition counter used to recognise stale results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Live,
    Historical,
}

/// Value of the mode selector
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Live,
    Historical(Period),
}

impl Selection {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Live => Mode::Live,
            Self::Historical(_) => Mode::Historical,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Live => "Today (live)".to_string(),
            Self::Historical(period) => period.label(),
        }
    }
}

/// Session-wide settings
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Map center used when nothing else can be shown
    pub default_center: GeoPoint,
    pub default_zoom: f64,
    /// Period shown after a forced switch away from live mode
    pub fallback_period: Period,
    /// Pixels kept free around a fitted route
    pub fit_padding: f32,
    pub notification_duration: Duration,
    pub position_options: PositionOptions,
    /// Initial speed slider value
    pub initial_speed: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_center: GeoPoint::new(18.5204, 73.8567),
            default_zoom: 13.0,
            fallback_period: Period::from("yesterday"),
            fit_padding: 50.0,
            notification_duration: NOTIFICATION_DURATION,
            position_options: PositionOptions::default(),
            initial_speed: animator::DEFAULT_SPEED,
        }
    }
}

/// Blocking work for the executor
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// List the periods available in the route data
    ListPeriods,
    LoadRoute {
        generation: Generation,
        period: Period,
    },
    ResolvePath {
        generation: Generation,
        waypoints: Vec<GeoPoint>,
    },
}

impl Request {
    /// Run the request to completion on the calling thread
    pub fn execute(
        self,
        repository: &RouteRepository,
        router: &dyn RoutingProvider,
    ) -> SessionEvent {
        match self {
            Self::ListPeriods => SessionEvent::PeriodsListed {
                result: repository.periods(),
            },
            Self::LoadRoute { generation, period } => SessionEvent::RouteLoaded {
                generation,
                result: repository.load(&period),
            },
            Self::ResolvePath {
                generation,
                waypoints,
            } => SessionEvent::PathResolved {
                generation,
                result: router.resolve(&waypoints),
            },
        }
    }
}

/// Asynchronous results fed back into the controller
#[derive(Debug)]
pub enum SessionEvent {
    PeriodsListed {
        result: Result<Vec<Period>>,
    },
    RouteLoaded {
        generation: Generation,
        result: Result<Route>,
    },
    PathResolved {
        generation: Generation,
        result: Result<ResolvedPath>,
    },
    Position {
        generation: Generation,
        result: Result<PositionFix>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadStatus {
    LoadingRoute,
    ResolvingPath,
    Ready,
    Failed,
}

struct HistoricalSession {
    period: Period,
    status: LoadStatus,
    route: Option<Route>,
    path: Option<Arc<ResolvedPath>>,
    start_marker: Option<LayerHandle>,
    end_marker: Option<LayerHandle>,
    vehicle: Option<LayerHandle>,
    path_layer: Option<LayerHandle>,
    /// Begin playback as soon as the path is ready
    autostart: bool,
}

impl HistoricalSession {
    fn new(period: Period, autostart: bool) -> Self {
        Self {
            period,
            status: LoadStatus::LoadingRoute,
            route: None,
            path: None,
            start_marker: None,
            end_marker: None,
            vehicle: None,
            path_layer: None,
            autostart,
        }
    }

    fn remove_layers(&mut self, map: &mut dyn MapView) {
        for handle in [
            self.start_marker.take(),
            self.end_marker.take(),
            self.vehicle.take(),
            self.path_layer.take(),
        ]
        .into_iter()
        .flatten()
        {
            if map.has_layer(handle) {
                map.remove_layer(handle);
            }
        }
    }
}

struct LiveSession {
    watch: Option<WatchHandle>,
    marker: Option<LayerHandle>,
    circle: Option<LayerHandle>,
    requested_at: Instant,
    last_fix: Option<PositionFix>,
    /// Waiting for the user to allow location access; no watch yet
    awaiting_consent: bool,
}

impl LiveSession {
    fn new(watch: Option<WatchHandle>, requested_at: Instant) -> Self {
        Self {
            watch,
            marker: None,
            circle: None,
            requested_at,
            last_fix: None,
            awaiting_consent: watch.is_none(),
        }
    }

    /// Still waiting for the first fix from a running watch
    fn waiting_for_fix(&self) -> bool {
        !self.awaiting_consent && self.last_fix.is_none()
    }

    fn remove_layers(&mut self, map: &mut dyn MapView) {
        for handle in [self.marker.take(), self.circle.take()].into_iter().flatten() {
            if map.has_layer(handle) {
                map.remove_layer(handle);
            }
        }
    }
}

/// Everything that changes while the viewer runs
pub struct SessionState {
    selection: Selection,
    generation: Generation,
    historical: Option<HistoricalSession>,
    live: Option<LiveSession>,
    animator: RouteAnimator,
    notifier: Notifier,
    periods: Vec<Period>,
    /// The user's answer to the location prompt, remembered for the session
    location_consent: Option<bool>,
}

pub struct ModeController {
    state: SessionState,
    config: SessionConfig,
    geolocation: Box<dyn GeolocationSource>,
    events: UnboundedSender<SessionEvent>,
    requests: Vec<Request>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ModeController {
    /// Create an idle controller; call [`Self::initialize`] with the selector's value
    pub fn new(
        config: SessionConfig,
        geolocation: Box<dyn GeolocationSource>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        let state = SessionState {
            selection: Selection::Historical(config.fallback_period.clone()),
            generation: Generation::default(),
            historical: None,
            live: None,
            animator: RouteAnimator::new(config.initial_speed),
            notifier: Notifier::new(config.notification_duration),
            periods: Vec::new(),
            location_consent: None,
        };
        Self {
            state,
            config,
            geolocation,
            events,
            requests: Vec::new(),
        }
    }

    /// Enter the initial mode, read once from the selector at startup
    pub fn initialize(&mut self, selection: Selection, now: Instant, map: &mut dyn MapView) {
        tracing::info!("Starting in {:?}", selection);
        self.requests.push(Request::ListPeriods);
        self.apply_selection(selection, false, now, map);
    }

    /// The user changed the selector
    pub fn select(&mut self, selection: Selection, now: Instant, map: &mut dyn MapView) {
        if selection == self.state.selection && self.has_healthy_session() {
            return;
        }
        tracing::info!("Switching from {:?} to {:?}", self.state.selection, selection);
        self.apply_selection(selection, false, now, map);
    }

    fn has_healthy_session(&self) -> bool {
        match self.state.selection {
            Selection::Live => self.state.live.is_some(),
            Selection::Historical(_) => self
                .state
                .historical
                .as_ref()
                .is_some_and(|h| h.status != LoadStatus::Failed),
        }
    }

    fn apply_selection(
        &mut self,
        selection: Selection,
        autostart: bool,
        now: Instant,
        map: &mut dyn MapView,
    ) {
        self.state.generation = self.state.generation.next();
        self.teardown(map);
        self.state.selection = selection.clone();

        match selection {
            Selection::Live => self.enter_live(now, map),
            Selection::Historical(period) => self.enter_historical(period, autostart),
        }
    }

    /// Release everything the current mode holds; safe to call with nothing held
    fn teardown(&mut self, map: &mut dyn MapView) {
        self.state.animator.clear();

        if let Some(mut live) = self.state.live.take() {
            if let Some(watch) = live.watch.take() {
                self.geolocation.clear_watch(watch);
            }
            live.remove_layers(map);
        }

        if let Some(mut historical) = self.state.historical.take() {
            historical.remove_layers(map);
        }
    }

    fn enter_live(&mut self, now: Instant, map: &mut dyn MapView) {
        match self.geolocation.permission() {
            Permission::Unsupported => self.fail_live(TrackError::LocationUnsupported, now, map),
            Permission::Denied => self.fail_live(TrackError::LocationPermissionDenied, now, map),
            Permission::Granted => self.start_watch(now, map),
            Permission::Prompt => match self.state.location_consent {
                Some(true) => self.start_watch(now, map),
                Some(false) => self.fail_live(TrackError::LocationPermissionDenied, now, map),
                None => {
                    tracing::debug!("Asking for location access");
                    self.state.live = Some(LiveSession::new(None, now));
                }
            },
        }
    }

    fn start_watch(&mut self, now: Instant, map: &mut dyn MapView) {
        let options = self.config.position_options.clone();
        let sink = PositionSink::new(self.state.generation, self.events.clone());

        self.geolocation.request_current(&options, sink.clone());
        match self.geolocation.watch_position(&options, sink) {
            Ok(watch) => {
                tracing::debug!(
                    "Watching position ({watch:?}, high accuracy: {}, max age: {:?})",
                    options.high_accuracy,
                    options.maximum_age
                );
                self.state.live = Some(LiveSession::new(Some(watch), now));
            }
            Err(e) => self.fail_live(e, now, map),
        }
    }

    /// The user answered the location prompt shown while live mode waits for consent
    ///
    /// The answer holds for the rest of the session. Declining falls back to the
    /// historical view like a denied permission does.
    pub fn answer_location_prompt(&mut self, allow: bool, now: Instant, map: &mut dyn MapView) {
        if !self.awaiting_location_consent() {
            tracing::debug!("No location prompt pending");
            return;
        }
        self.state.location_consent = Some(allow);
        if allow {
            self.start_watch(now, map);
        } else {
            self.fail_live(TrackError::LocationPermissionDenied, now, map);
        }
    }

    /// Live mode is waiting for [`Self::answer_location_prompt`]
    pub fn awaiting_location_consent(&self) -> bool {
        self.state
            .live
            .as_ref()
            .is_some_and(|live| live.awaiting_consent)
    }

    /// Leave live mode for the fallback period after a location failure
    fn fail_live(&mut self, error: TrackError, now: Instant, map: &mut dyn MapView) {
        tracing::warn!("Live tracking unavailable: {error}");
        self.state.notifier.show(error.user_message(), now);
        let fallback = Selection::Historical(self.config.fallback_period.clone());
        self.apply_selection(fallback, false, now, map);
    }

    fn enter_historical(&mut self, period: Period, autostart: bool) {
        self.requests.push(Request::LoadRoute {
            generation: self.state.generation,
            period: period.clone(),
        });
        self.state.historical = Some(HistoricalSession::new(period, autostart));
    }

    /// Historical load failed: clean map, default view, stay historical
    fn fail_historical(&mut self, error: TrackError, now: Instant, map: &mut dyn MapView) {
        tracing::warn!("Showing route failed: {error}");
        self.state.notifier.show(error.user_message(), now);
        self.state.animator.clear();
        if let Some(historical) = self.state.historical.as_mut() {
            historical.remove_layers(map);
            historical.route = None;
            historical.path = None;
            historical.autostart = false;
            historical.status = LoadStatus::Failed;
        }
        map.set_view(self.config.default_center, self.config.default_zoom);
    }

    fn is_current(&self, generation: Generation, what: &str) -> bool {
        if generation != self.state.generation {
            tracing::debug!(
                "Dropping stale {what} from {:?} (now {:?})",
                generation,
                self.state.generation
            );
            return false;
        }
        true
    }

    /// Apply an asynchronous result
    pub fn handle_event(&mut self, event: SessionEvent, now: Instant, map: &mut dyn MapView) {
        match event {
            SessionEvent::PeriodsListed { result } => match result {
                Ok(periods) => {
                    tracing::debug!("{} periods available", periods.len());
                    self.state.periods = periods;
                }
                Err(e) => tracing::warn!("Could not list periods: {e}"),
            },
            SessionEvent::RouteLoaded { generation, result } => {
                if self.is_current(generation, "route") {
                    self.on_route_loaded(result, now, map);
                }
            }
            SessionEvent::PathResolved { generation, result } => {
                if self.is_current(generation, "path") {
                    self.on_path_resolved(result, now, map);
                }
            }
            SessionEvent::Position { generation, result } => {
                if self.is_current(generation, "position") {
                    self.on_position(result, now, map);
                }
            }
        }
    }

    fn on_route_loaded(&mut self, result: Result<Route>, now: Instant, map: &mut dyn MapView) {
        let generation = self.state.generation;
        let Some(historical) = self.state.historical.as_mut() else {
            return;
        };
        if historical.status != LoadStatus::LoadingRoute {
            return;
        }

        let route = match result {
            Ok(route) => route,
            Err(e) => return self.fail_historical(e, now, map),
        };

        tracing::info!(
            "Showing route {} ({} waypoints)",
            route.period(),
            route.points().len()
        );
        historical.start_marker = Some(map.add_marker(route.start(), MarkerIcon::Start));
        historical.end_marker = Some(map.add_marker(route.end(), MarkerIcon::End));
        historical.vehicle = Some(map.add_marker(route.start(), MarkerIcon::Vehicle));
        historical.status = LoadStatus::ResolvingPath;

        self.requests.push(Request::ResolvePath {
            generation,
            waypoints: route.points().to_vec(),
        });
        historical.route = Some(route);
    }

    fn on_path_resolved(
        &mut self,
        result: Result<ResolvedPath>,
        now: Instant,
        map: &mut dyn MapView,
    ) {
        let Some(historical) = self.state.historical.as_mut() else {
            return;
        };
        if historical.status != LoadStatus::ResolvingPath {
            return;
        }
        let Some(vehicle) = historical.vehicle else {
            return;
        };

        let path = match result {
            Ok(path) => Arc::new(path),
            Err(e) => return self.fail_historical(e, now, map),
        };

        tracing::info!(
            "Route {} resolved to {} points ({:.2} km)",
            historical.period,
            path.len(),
            path.total_distance_km()
        );
        historical.path_layer = Some(map.add_path(path.points()));
        map.fit_bounds(path.bounds(), self.config.fit_padding);
        historical.path = Some(path.clone());
        historical.status = LoadStatus::Ready;
        let autostart = std::mem::take(&mut historical.autostart);

        self.state.animator.reset(path.clone(), vehicle, map);
        if autostart {
            self.state.animator.start(path, 0, vehicle, now, map);
        }
    }

    fn on_position(&mut self, result: Result<PositionFix>, now: Instant, map: &mut dyn MapView) {
        let Some(live) = self.state.live.as_mut() else {
            return;
        };

        match result {
            Ok(fix) => {
                tracing::debug!(
                    "Position fix {} (±{:.0} m)",
                    fix.point.format_short(),
                    fix.accuracy_m
                );
                live.remove_layers(map);
                live.marker = Some(map.add_marker(fix.point, MarkerIcon::LivePosition));
                live.circle = Some(map.add_circle(fix.point, fix.accuracy_m));
                live.last_fix = Some(fix);
                map.fit_bounds(point::circle_bounds(fix.point, fix.accuracy_m), 0.0);
            }
            Err(e) => self.fail_live(e, now, map),
        }
    }

    /// Advance time: animation ticks, notification expiry, location timeout
    pub fn poll(&mut self, now: Instant, map: &mut dyn MapView) {
        profiling::scope!("ModeController::poll");

        self.state.notifier.expire(now);

        if self.mode() == Mode::Historical {
            self.state.animator.poll(now, map);
        }

        let timed_out = self.state.live.as_ref().is_some_and(|live| {
            live.waiting_for_fix()
                && now.saturating_duration_since(live.requested_at)
                    >= self.config.position_options.timeout
        });
        if timed_out {
            self.fail_live(TrackError::LocationTimeout, now, map);
        }
    }

    /// Earliest instant at which [`Self::poll`] has something to do
    pub fn next_wakeup(&self) -> Option<Instant> {
        let live_deadline = self.state.live.as_ref().and_then(|live| {
            live.waiting_for_fix()
                .then(|| live.requested_at + self.config.position_options.timeout)
        });
        [
            self.state.animator.next_due(),
            self.state.notifier.deadline(),
            live_deadline,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Start or resume playback (historical mode only)
    pub fn start_animation(&mut self, now: Instant, map: &mut dyn MapView) {
        let Selection::Historical(period) = self.state.selection.clone() else {
            tracing::debug!("Ignoring start in live mode");
            return;
        };
        let Some(historical) = self.state.historical.as_mut() else {
            return;
        };

        match historical.status {
            LoadStatus::Ready => {
                if let (Some(path), Some(vehicle)) = (historical.path.clone(), historical.vehicle)
                {
                    let from = self.state.animator.state().current_index;
                    self.state.animator.start(path, from, vehicle, now, map);
                }
            }
            LoadStatus::LoadingRoute | LoadStatus::ResolvingPath => {
                tracing::debug!("Route still loading, playback will start when ready");
                historical.autostart = true;
            }
            LoadStatus::Failed => {
                tracing::info!("Reloading {period} to start playback");
                self.apply_selection(Selection::Historical(period), true, now, map);
            }
        }
    }

    pub fn stop_animation(&mut self) {
        self.state.animator.stop();
        if let Some(historical) = self.state.historical.as_mut() {
            historical.autostart = false;
        }
    }

    /// Rewind playback to the start of the path (historical mode only)
    pub fn reset_animation(&mut self, now: Instant, map: &mut dyn MapView) {
        let Selection::Historical(period) = self.state.selection.clone() else {
            return;
        };
        let Some(historical) = self.state.historical.as_mut() else {
            return;
        };

        match historical.status {
            LoadStatus::Ready => {
                if let (Some(path), Some(vehicle)) = (historical.path.clone(), historical.vehicle)
                {
                    self.state.animator.reset(path, vehicle, map);
                }
            }
            LoadStatus::LoadingRoute | LoadStatus::ResolvingPath => {
                historical.autostart = false;
            }
            LoadStatus::Failed => {
                self.apply_selection(Selection::Historical(period), false, now, map);
            }
        }
    }

    /// Apply a speed slider value; returns the multiplier to display
    pub fn set_speed(&mut self, value: u32) -> f64 {
        self.state.animator.set_speed(value)
    }

    /// Click on the vehicle marker: open its information popup or close it
    pub fn toggle_vehicle_popup(&mut self, map: &mut dyn MapView) {
        if self.mode() == Mode::Live {
            return;
        }
        let Some(vehicle) = self.vehicle_marker() else {
            return;
        };

        if map.is_popup_open(vehicle) {
            map.close_popup(vehicle);
        } else if let Some(info) = self.vehicle_info(map) {
            map.open_popup(vehicle, info.render());
        }
    }

    fn vehicle_info(&self, map: &dyn MapView) -> Option<VehicleInfo> {
        if let Some(info) = self.state.animator.vehicle_info(map) {
            return Some(info);
        }
        // Path not resolved yet: describe the raw route start
        let historical = self.state.historical.as_ref()?;
        let route = historical.route.as_ref()?;
        let current = historical
            .vehicle
            .and_then(|v| map.marker_position(v))
            .unwrap_or_else(|| route.start());
        Some(VehicleInfo {
            timestamp: chrono::Local::now(),
            start: route.start(),
            current,
            total_distance_km: 0.0,
        })
    }

    /// Drain blocking work queued since the last call
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    pub fn dismiss_notification(&mut self) {
        self.state.notifier.dismiss();
    }

    pub fn mode(&self) -> Mode {
        self.state.selection.mode()
    }

    pub fn selection(&self) -> &Selection {
        &self.state.selection
    }

    pub fn generation(&self) -> Generation {
        self.state.generation
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Periods listed by the route data, sorted by name
    pub fn periods(&self) -> &[Period] {
        &self.state.periods
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.state.notifier.current()
    }

    pub fn notification_duration(&self) -> Duration {
        self.state.notifier.duration()
    }

    pub fn animation(&self) -> &AnimationState {
        self.state.animator.state()
    }

    pub fn speed_value(&self) -> u32 {
        self.state.animator.speed_value()
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.state.animator.multiplier()
    }

    /// Whether a route or path lookup is in flight
    pub fn is_loading(&self) -> bool {
        self.state.historical.as_ref().is_some_and(|h| {
            matches!(
                h.status,
                LoadStatus::LoadingRoute | LoadStatus::ResolvingPath
            )
        })
    }

    pub fn vehicle_marker(&self) -> Option<LayerHandle> {
        self.state.historical.as_ref().and_then(|h| h.vehicle)
    }

    /// Number of points in the resolved path, once available
    pub fn path_len(&self) -> Option<usize> {
        self.state
            .historical
            .as_ref()
            .and_then(|h| h.path.as_ref())
            .map(|p| p.len())
    }

    /// Last live position fix, in live mode
    pub fn live_fix(&self) -> Option<PositionFix> {
        self.state.live.as_ref().and_then(|l| l.last_fix)
    }

    /// Whether a geolocation watch is held
    pub fn has_live_watch(&self) -> bool {
        self.state.live.as_ref().is_some_and(|l| l.watch.is_some())
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        if let Some(watch) = self.state.live.as_mut().and_then(|l| l.watch.take()) {
            self.geolocation.clear_watch(watch);
        }
    }
}
