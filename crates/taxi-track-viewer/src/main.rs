#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use taxi_track_viewer::{Settings, TaxiTrackViewerApp, native_main};

fn main() {
    let settings = Settings::from_cli();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    rt.block_on(async {
        native_main("Taxi Track Viewer", move |cc| {
            Box::new(TaxiTrackViewerApp::new(cc, settings))
        })
        .await;
    });
}
