//! Application module
//!
//! One window: the map fills the central panel, controls sit in a side panel and
//! notifications float over the map. Each frame the app
//! - drains session events delivered by the executor and the geolocation source,
//! - advances the controller clock (animation ticks, timeouts, toast expiry),
//! - applies the user's actions, submits new requests and applies camera moves,
//! - draws the map and schedules the next repaint for the controller's next deadline.

mod executor;
mod plugin;
pub(crate) mod settings;
mod ui_panels;

use crate::app::executor::Executor;
use crate::app::plugin::{MapFeedback, ScenePlugin};
use crate::app::settings::Settings;
use crate::app::ui_panels::UiAction;
use eframe::egui;
use geo::Rect;
use instant::Instant;
use std::sync::{Arc, PoisonError, RwLock};
use taxi_track_lib::{CameraCommand, GeoPoint, MapScene, ModeController, SessionEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use walkers::{HttpTiles, Map, MapMemory, sources::OpenStreetMap};

/// Pixel size of one map tile
const TILE_SIZE: f64 = 256.0;

const MIN_ZOOM: f64 = 1.0;
const MAX_ZOOM: f64 = 18.0;

/// Main application structure
pub struct TaxiTrackViewerApp {
    /// Session state machine
    controller: ModeController,

    /// Layers drawn on the map, shared with the map plugin
    scene: Arc<RwLock<MapScene>>,

    /// Results from the executor and the geolocation source
    events: UnboundedReceiver<SessionEvent>,

    executor: Executor,

    /// Map tiles provider (OpenStreetMap)
    tiles: HttpTiles,

    /// Map state (camera position, zoom, etc.)
    map_memory: MapMemory,

    /// Written by the plugin each frame
    feedback: Arc<tokio::sync::RwLock<MapFeedback>>,
}

impl TaxiTrackViewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, settings: Settings) -> Self {
        let (tx, events) = mpsc::unbounded_channel();

        let executor = Executor::new(
            settings.route_repository(),
            settings.routing_provider(),
            tx.clone(),
        )
        .with_repaint(cc.egui_ctx.clone());
        tracing::info!("Routes from {}", executor.describe());

        let config = settings.session_config();
        let mut map_memory = MapMemory::default();
        map_memory.center_at(walkers::lat_lon(
            config.default_center.lat,
            config.default_center.lng,
        ));
        let _ = map_memory.set_zoom(config.default_zoom);

        let mut controller = ModeController::new(config, settings.geolocation(), tx);
        let mut scene = MapScene::new();
        controller.initialize(settings.initial_selection(), Instant::now(), &mut scene);

        let mut app = Self {
            controller,
            scene: Arc::new(RwLock::new(scene)),
            events,
            executor,
            tiles: HttpTiles::new(OpenStreetMap, cc.egui_ctx.clone()),
            map_memory,
            feedback: Arc::new(tokio::sync::RwLock::new(MapFeedback::default())),
        };
        app.flush();
        app
    }

    /// Feed pending events and the clock into the controller
    fn process_events(&mut self, now: Instant) {
        profiling::scope!("process_events");
        let scene = self.scene.clone();
        let mut scene = scene.write().unwrap_or_else(PoisonError::into_inner);

        while let Ok(event) = self.events.try_recv() {
            self.controller.handle_event(event, now, &mut *scene);
        }

        let clicked = self
            .feedback
            .try_write()
            .ok()
            .and_then(|mut feedback| feedback.clicked_vehicle.take());
        if clicked.is_some() && clicked == self.controller.vehicle_marker() {
            self.controller.toggle_vehicle_popup(&mut *scene);
        }

        self.controller.poll(now, &mut *scene);
    }

    fn apply_actions(&mut self, actions: Vec<UiAction>, now: Instant) {
        if actions.is_empty() {
            return;
        }
        let scene = self.scene.clone();
        let mut scene = scene.write().unwrap_or_else(PoisonError::into_inner);

        for action in actions {
            tracing::debug!("UI action {action:?}");
            match action {
                UiAction::Select(selection) => self.controller.select(selection, now, &mut *scene),
                UiAction::Start => self.controller.start_animation(now, &mut *scene),
                UiAction::Stop => self.controller.stop_animation(),
                UiAction::Reset => self.controller.reset_animation(now, &mut *scene),
                UiAction::SetSpeed(value) => {
                    let multiplier = self.controller.set_speed(value);
                    tracing::debug!("Speed {value} ({multiplier:.1}x)");
                }
                UiAction::DismissNotification => self.controller.dismiss_notification(),
                UiAction::AnswerLocationPrompt(allow) => {
                    self.controller.answer_location_prompt(allow, now, &mut *scene)
                }
            }
        }
    }

    /// Submit queued requests and apply the pending camera move
    fn flush(&mut self) {
        for request in self.controller.take_requests() {
            self.executor.submit(request);
        }

        let camera = self
            .scene
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take_camera();
        if let Some(command) = camera {
            self.apply_camera(command);
        }
    }

    fn apply_camera(&mut self, command: CameraCommand) {
        let (center, zoom) = match command {
            CameraCommand::SetView { center, zoom } => (center, zoom),
            CameraCommand::FitBounds { bounds, padding } => {
                let viewport = self
                    .feedback
                    .try_read()
                    .ok()
                    .and_then(|feedback| feedback.viewport)
                    .map(|rect| rect.size());
                fit_view(bounds, padding, viewport)
            }
        };

        self.map_memory
            .center_at(walkers::lat_lon(center.lat, center.lng));
        let _ = self.map_memory.set_zoom(zoom);

        tracing::trace!(
            "Camera moved to ({:.4}, {:.4}), zoom: {:.1}",
            center.lat,
            center.lng,
            zoom
        );
    }

    fn keyboard_actions(&self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        if ctx.wants_keyboard_input() {
            return;
        }
        ctx.input(|i| {
            if i.key_pressed(egui::Key::Space) {
                actions.push(if self.controller.animation().running {
                    UiAction::Stop
                } else {
                    UiAction::Start
                });
            }
            if i.key_pressed(egui::Key::R) {
                actions.push(UiAction::Reset);
            }
        });
    }
}

/// Web Mercator y of a latitude, in degrees of longitude
fn mercator_y(lat: f64) -> f64 {
    let lat = lat.clamp(-85.0511, 85.0511).to_radians();
    (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln().to_degrees()
}

/// Center and zoom that frame `bounds` with `padding` pixels to spare on every side
///
/// Without a known viewport the zoom is a rough estimate from the span alone.
fn fit_view(bounds: Rect<f64>, padding: f32, viewport: Option<egui::Vec2>) -> (GeoPoint, f64) {
    let center = bounds.center();
    let center = GeoPoint::new(center.y, center.x);

    let lon_span = bounds.width();
    let lat_span = mercator_y(bounds.max().y) - mercator_y(bounds.min().y);
    let max_span = lon_span.max(lat_span);
    if max_span <= 0.0 {
        return (center, MAX_ZOOM);
    }

    let zoom = match viewport {
        Some(size) => {
            let usable = (size.x.min(size.y) - 2.0 * padding).max(1.0) as f64;
            (usable * 360.0 / (TILE_SIZE * max_span)).log2()
        }
        None => (4.0 * 360.0 / max_span).log2() - 0.5,
    };
    (center, zoom.clamp(MIN_ZOOM, MAX_ZOOM))
}

impl eframe::App for TaxiTrackViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        profiling::scope!("TaxiTrackViewerApp::update");
        let now = Instant::now();

        self.process_events(now);

        let mut actions = Vec::new();
        self.keyboard_actions(ctx, &mut actions);
        ui_panels::control_panel(ctx, &self.controller, &mut actions);
        ui_panels::location_prompt(ctx, &self.controller, &mut actions);
        ui_panels::notification_toast(ctx, &self.controller, now, &mut actions);
        self.apply_actions(actions, now);
        self.flush();

        let default_center = self.controller.config().default_center;
        let plugin = ScenePlugin::new(self.scene.clone(), self.feedback.clone());

        // Central panel: Map view (full screen)
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                profiling::scope!("map_panel");

                let map = Map::new(
                    Some(&mut self.tiles),
                    &mut self.map_memory,
                    walkers::lat_lon(default_center.lat, default_center.lng),
                )
                .with_plugin(plugin);
                ui.add(map);

                ui_panels::attribution(ui);
            });

        // Sinks may have queued events synchronously; otherwise sleep until the next deadline
        if !self.events.is_empty() {
            ctx.request_repaint();
        } else if let Some(due) = self.controller.next_wakeup() {
            ctx.request_repaint_after(due.saturating_duration_since(Instant::now()));
        }
    }
}
