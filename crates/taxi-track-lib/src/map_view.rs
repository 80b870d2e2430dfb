//! The map surface seen by the controller
//!
//! [`MapView`] is everything the session needs from a map: markers, an accuracy circle,
//! a path line, popups and camera moves. [`MapScene`] implements it as a plain layer
//! table that a renderer draws each frame and that tests can inspect directly.

use crate::GeoPoint;
use geo::Rect;
use std::collections::BTreeMap;

/// Identifies a layer added to a map
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerHandle(pub u64);

/// Marker appearance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerIcon {
    Vehicle,
    Start,
    End,
    LivePosition,
}

impl MarkerIcon {
    /// Static popup text bound to a marker kind, if any
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Start => Some("Start Point"),
            Self::End => Some("End Point"),
            Self::Vehicle | Self::LivePosition => None,
        }
    }
}

/// Map operations used by the session
pub trait MapView {
    fn add_marker(&mut self, position: GeoPoint, icon: MarkerIcon) -> LayerHandle;

    /// Circle with a radius in meters
    fn add_circle(&mut self, center: GeoPoint, radius_m: f64) -> LayerHandle;

    fn add_path(&mut self, points: &[GeoPoint]) -> LayerHandle;

    /// Remove a layer; returns whether it was present
    fn remove_layer(&mut self, handle: LayerHandle) -> bool;

    fn has_layer(&self, handle: LayerHandle) -> bool;

    fn set_marker_position(&mut self, handle: LayerHandle, position: GeoPoint);

    fn marker_position(&self, handle: LayerHandle) -> Option<GeoPoint>;

    fn open_popup(&mut self, handle: LayerHandle, content: String);

    fn close_popup(&mut self, handle: LayerHandle);

    fn is_popup_open(&self, handle: LayerHandle) -> bool;

    /// Replace the content of an open popup; closed popups are left alone
    fn set_popup_content(&mut self, handle: LayerHandle, content: String);

    /// Frame a region, keeping `padding` pixels free on every side
    fn fit_bounds(&mut self, bounds: Rect<f64>, padding: f32);

    fn set_view(&mut self, center: GeoPoint, zoom: f64);
}

/// A marker layer
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub position: GeoPoint,
    pub icon: MarkerIcon,
    /// Content of the popup while it is open
    pub popup: Option<String>,
}

/// One drawable layer
#[derive(Clone, Debug, PartialEq)]
pub enum Layer {
    Marker(Marker),
    Circle { center: GeoPoint, radius_m: f64 },
    Path { points: Vec<GeoPoint> },
}

/// Camera change requested by the session, applied by the renderer
#[derive(Clone, Debug, PartialEq)]
pub enum CameraCommand {
    FitBounds { bounds: Rect<f64>, padding: f32 },
    SetView { center: GeoPoint, zoom: f64 },
}

/// In-memory [`MapView`]
#[derive(Clone, Debug, Default)]
pub struct MapScene {
    layers: BTreeMap<LayerHandle, Layer>,
    next_id: u64,
    camera: Option<CameraCommand>,
}

impl MapScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, layer: Layer) -> LayerHandle {
        self.next_id += 1;
        let handle = LayerHandle(self.next_id);
        self.layers.insert(handle, layer);
        handle
    }

    fn marker_mut(&mut self, handle: LayerHandle) -> Option<&mut Marker> {
        match self.layers.get_mut(&handle) {
            Some(Layer::Marker(marker)) => Some(marker),
            _ => None,
        }
    }

    /// Layers in insertion order (later layers draw on top)
    pub fn layers(&self) -> impl Iterator<Item = (LayerHandle, &Layer)> {
        self.layers.iter().map(|(h, l)| (*h, l))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// All markers with a given icon
    pub fn markers_with_icon(&self, icon: MarkerIcon) -> Vec<(LayerHandle, &Marker)> {
        self.layers
            .iter()
            .filter_map(|(h, l)| match l {
                Layer::Marker(m) if m.icon == icon => Some((*h, m)),
                _ => None,
            })
            .collect()
    }

    pub fn circle_count(&self) -> usize {
        self.layers
            .values()
            .filter(|l| matches!(l, Layer::Circle { .. }))
            .count()
    }

    pub fn path_count(&self) -> usize {
        self.layers
            .values()
            .filter(|l| matches!(l, Layer::Path { .. }))
            .count()
    }

    /// Last camera command not yet applied
    pub fn camera(&self) -> Option<&CameraCommand> {
        self.camera.as_ref()
    }

    /// Hand the pending camera command to the renderer
    pub fn take_camera(&mut self) -> Option<CameraCommand> {
        self.camera.take()
    }
}

impl MapView for MapScene {
    fn add_marker(&mut self, position: GeoPoint, icon: MarkerIcon) -> LayerHandle {
        self.insert(Layer::Marker(Marker {
            position,
            icon,
            popup: None,
        }))
    }

    fn add_circle(&mut self, center: GeoPoint, radius_m: f64) -> LayerHandle {
        self.insert(Layer::Circle { center, radius_m })
    }

    fn add_path(&mut self, points: &[GeoPoint]) -> LayerHandle {
        self.insert(Layer::Path {
            points: points.to_vec(),
        })
    }

    fn remove_layer(&mut self, handle: LayerHandle) -> bool {
        self.layers.remove(&handle).is_some()
    }

    fn has_layer(&self, handle: LayerHandle) -> bool {
        self.layers.contains_key(&handle)
    }

    fn set_marker_position(&mut self, handle: LayerHandle, position: GeoPoint) {
        if let Some(marker) = self.marker_mut(handle) {
            marker.position = position;
        }
    }

    fn marker_position(&self, handle: LayerHandle) -> Option<GeoPoint> {
        match self.layers.get(&handle) {
            Some(Layer::Marker(marker)) => Some(marker.position),
            _ => None,
        }
    }

    fn open_popup(&mut self, handle: LayerHandle, content: String) {
        if let Some(marker) = self.marker_mut(handle) {
            marker.popup = Some(content);
        }
    }

    fn close_popup(&mut self, handle: LayerHandle) {
        if let Some(marker) = self.marker_mut(handle) {
            marker.popup = None;
        }
    }

    fn is_popup_open(&self, handle: LayerHandle) -> bool {
        matches!(
            self.layers.get(&handle),
            Some(Layer::Marker(Marker { popup: Some(_), .. }))
        )
    }

    fn set_popup_content(&mut self, handle: LayerHandle, content: String) {
        if let Some(marker) = self.marker_mut(handle)
            && marker.popup.is_some()
        {
            marker.popup = Some(content);
        }
    }

    fn fit_bounds(&mut self, bounds: Rect<f64>, padding: f32) {
        self.camera = Some(CameraCommand::FitBounds { bounds, padding });
    }

    fn set_view(&mut self, center: GeoPoint, zoom: f64) {
        self.camera = Some(CameraCommand::SetView { center, zoom });
    }
}
