//! Native entry point: logging, CLI parsing and the eframe window

use clap::Parser;

/// Filter used when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str =
    "info,taxi_track_lib=debug,walkers=info,eframe::native=warn,egui::context=warn";

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise [`DEFAULT_LOG_FILTER`] applies.
pub fn setup_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cfg!(debug_assertions) {
            DEFAULT_LOG_FILTER
        } else {
            "info,eframe::native=warn,egui::context=warn"
        })
    });

    let fmt_layer = fmt::layer().with_filter(filter);
    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Parses the command line arguments
pub fn parse_args<T: Parser>() -> Result<T, clap::Error> {
    T::try_parse()
}

pub fn log_version_info() {
    tracing::info!(
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
}

/// Open the main window and run the app until it is closed
pub async fn native_main(
    app_name: &str,
    app_creator: impl FnOnce(&eframe::CreationContext<'_>) -> Box<dyn eframe::App>,
) {
    setup_logging();
    log_version_info();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_title(app_name),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(
        app_name,
        native_options,
        Box::new(move |cc| Ok(app_creator(cc))),
    ) {
        tracing::error!("{app_name} exited with an error: {e}");
    }
}
