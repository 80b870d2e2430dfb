//! Walkers plugin drawing the session's map layers
//!
//! The plugin paints whatever is in the shared [`MapScene`]: the resolved path, the
//! accuracy circle, markers and open popups. Clicks on the vehicle marker and the map's
//! screen rectangle are written back through [`MapFeedback`] for the next frame.

use egui::{Color32, FontId, Pos2, Stroke};
use std::sync::{Arc, RwLock};
use taxi_track_lib::{GeoPoint, Layer, LayerHandle, MapScene, Marker, MarkerIcon};
use walkers::{Plugin, Projector};

const MARKER_RADIUS: f32 = 9.0;

/// Extra pixels around a marker that still count as a hit
const HIT_SLOP: f32 = 4.0;

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

const PATH_COLOR: Color32 = Color32::from_rgb(70, 130, 220);

/// What the map reported during the last frame
#[derive(Debug, Default, Clone)]
pub struct MapFeedback {
    /// Screen rectangle the map was drawn into
    pub viewport: Option<egui::Rect>,
    /// Vehicle marker clicked since the app last looked
    pub clicked_vehicle: Option<LayerHandle>,
}

pub struct ScenePlugin {
    scene: Arc<RwLock<MapScene>>,
    feedback: Arc<tokio::sync::RwLock<MapFeedback>>,
}

impl ScenePlugin {
    pub fn new(
        scene: Arc<RwLock<MapScene>>,
        feedback: Arc<tokio::sync::RwLock<MapFeedback>>,
    ) -> Self {
        Self { scene, feedback }
    }
}

fn to_screen(projector: &Projector, point: GeoPoint) -> Pos2 {
    projector
        .project(walkers::lat_lon(point.lat, point.lng))
        .to_pos2()
}

/// Radius in pixels of a circle `radius_m` meters wide around `center`
fn radius_px(projector: &Projector, center: GeoPoint, radius_m: f64) -> f32 {
    let north = GeoPoint::new(center.lat + radius_m / METERS_PER_DEGREE_LAT, center.lng);
    (to_screen(projector, north) - to_screen(projector, center)).length()
}

fn draw_marker(painter: &egui::Painter, pos: Pos2, icon: MarkerIcon) {
    let (fill, glyph) = match icon {
        MarkerIcon::Vehicle => (Color32::from_rgb(250, 200, 30), Some("T")),
        MarkerIcon::Start => (Color32::from_rgb(40, 170, 80), Some("A")),
        MarkerIcon::End => (Color32::from_rgb(210, 60, 50), Some("B")),
        MarkerIcon::LivePosition => (PATH_COLOR, None),
    };

    painter.circle(pos, MARKER_RADIUS, fill, Stroke::new(2.0, Color32::WHITE));
    if let Some(glyph) = glyph {
        painter.text(
            pos,
            egui::Align2::CENTER_CENTER,
            glyph,
            FontId::proportional(11.0),
            Color32::BLACK,
        );
    }
}

/// Text bubble above a marker
fn draw_bubble(painter: &egui::Painter, anchor: Pos2, text: &str) {
    let galley = painter.layout(
        text.to_string(),
        FontId::proportional(12.0),
        Color32::BLACK,
        260.0,
    );
    let size = galley.size();
    let min = anchor + egui::vec2(-size.x / 2.0, -size.y - MARKER_RADIUS - 12.0);
    let rect = egui::Rect::from_min_size(min, size).expand(6.0);

    painter.rect_filled(rect, 4.0, Color32::from_white_alpha(240));
    painter.rect_stroke(
        rect,
        4.0,
        Stroke::new(1.0, Color32::GRAY),
        egui::StrokeKind::Outside,
    );
    painter.galley(min, galley, Color32::BLACK);
}

fn hits(pos: Pos2, pointer: Option<Pos2>) -> bool {
    pointer.is_some_and(|p| p.distance(pos) <= MARKER_RADIUS + HIT_SLOP)
}

impl Plugin for ScenePlugin {
    fn run(
        self: Box<Self>,
        ui: &mut egui::Ui,
        response: &egui::Response,
        projector: &Projector,
        _map_memory: &walkers::MapMemory,
    ) {
        profiling::scope!("ScenePlugin::run");

        let Ok(scene) = self.scene.read() else {
            return;
        };
        let painter = ui.painter();

        for (_, layer) in scene.layers() {
            match layer {
                Layer::Path { points } if points.len() >= 2 => {
                    let screen: Vec<Pos2> =
                        points.iter().map(|p| to_screen(projector, *p)).collect();
                    painter.add(egui::Shape::line(screen, Stroke::new(4.0, PATH_COLOR)));
                }
                Layer::Circle { center, radius_m } => {
                    let pos = to_screen(projector, *center);
                    let radius = radius_px(projector, *center, *radius_m);
                    painter.circle(
                        pos,
                        radius,
                        Color32::from_rgba_unmultiplied(70, 130, 220, 40),
                        Stroke::new(1.5, PATH_COLOR),
                    );
                }
                _ => {}
            }
        }

        let hover = response.hover_pos();
        let click = response
            .clicked()
            .then(|| response.interact_pointer_pos())
            .flatten();
        let mut clicked_vehicle = None;
        let mut bubbles: Vec<(Pos2, &str)> = Vec::new();

        for (handle, layer) in scene.layers() {
            let Layer::Marker(Marker {
                position,
                icon,
                popup,
            }) = layer
            else {
                continue;
            };
            let pos = to_screen(projector, *position);
            draw_marker(painter, pos, *icon);

            if *icon == MarkerIcon::Vehicle && hits(pos, click) {
                clicked_vehicle = Some(handle);
            }
            if let Some(content) = popup {
                bubbles.push((pos, content.as_str()));
            } else if let Some(label) = icon.label()
                && hits(pos, hover)
            {
                bubbles.push((pos, label));
            }
        }

        // Popups go on top of every marker
        for (pos, text) in bubbles {
            draw_bubble(painter, pos, text);
        }

        if let Ok(mut feedback) = self.feedback.try_write() {
            feedback.viewport = Some(response.rect);
            if clicked_vehicle.is_some() {
                feedback.clicked_vehicle = clicked_vehicle;
                ui.ctx().request_repaint();
            }
        }
    }
}
