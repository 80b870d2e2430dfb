//! Taxi Track Viewer - Application Library
//!
//! Wires the tracking core from `taxi-track-lib` to a `walkers` slippy map in an
//! eframe window: controls, notifications, the vehicle popup and the background
//! executor for route and path lookups.

mod app;
mod entrypoints;

pub use app::TaxiTrackViewerApp;
pub use app::settings::Settings;
pub use entrypoints::native_main;
