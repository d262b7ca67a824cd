//! Sorensen DCS Desktop Application
//!
//! Finds a Sorensen DCS bench supply on a serial port, shows its live output,
//! programs setpoints and logs readings to CSV.

mod app;
mod settings;

use anyhow::{anyhow, Context};
use app::DcsApp;
use eframe::NativeOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sorensen_dcs=info,dcs_protocol=info,dcs_detect=info,dcs_control=info,dcs_sim=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sorensen DCS control");

    // Supply I/O runs on this runtime; the UI thread only polls channels
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 560.0])
            .with_min_inner_size([560.0, 440.0])
            .with_title("Sorensen DCS Control"),
        ..Default::default()
    };

    eframe::run_native(
        "Sorensen DCS",
        options,
        Box::new(move |cc| Ok(Box::new(DcsApp::new(cc, runtime)))),
    )
    .map_err(|e| anyhow!("GUI error: {}", e))
}
