//! Streamer Application
//!
//! Runs one streaming session against a digitizer and archives the
//! segments as JSON lines. Ctrl+C requests a clean stop.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use acq_stream::{
    config::AppConfig,
    session::StreamController,
    sink::JsonLinesSink,
    ui::StatusServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ACQ streamer");

    // Config path from args, else the per-user file, else defaults
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    let descriptor = config.descriptor().context("Invalid configuration")?;

    println!("\n=== Session ===");
    println!("  Digitizer: {}", descriptor.address());
    println!(
        "  Channels: {} ({} enabled)",
        descriptor.channel_count(),
        descriptor.channels.iter().filter(|c| c.enabled).count()
    );
    println!("  Frequency: {} Hz", descriptor.frequency);
    println!("  Max segments: {}", descriptor.max_segments);
    println!("  Output: {}", config.sink.output.display());
    println!();

    let sink = Arc::new(
        JsonLinesSink::create(&config.sink.output)
            .with_context(|| format!("Failed to open {}", config.sink.output.display()))?,
    );
    let controller = Arc::new(StreamController::new(sink));

    if config.status.enabled {
        let _status_handle = StatusServer::new(config.status.clone(), controller.clone())
            .start_background();
    }

    controller.start(descriptor)?;

    let stopper = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, stopping");
            stopper.request_stop();
        }
    });

    let waiter = controller.clone();
    let report = tokio::task::spawn_blocking(move || waiter.wait()).await??;

    println!("\n=== Session {} ===", report.session_id);
    println!("  Outcome: {}", report.outcome);
    println!("  Segments: {}", report.segments);
    if let Some(trigger) = report.trigger_time {
        println!(
            "  Trigger: {:.6} ({})",
            trigger.seconds(),
            trigger.to_ctime().unwrap_or_default()
        );
    }
    println!(
        "  Received: {:.1} MB, {} read timeouts, {} fresh buffers",
        report.stats.bytes_received as f64 / (1024.0 * 1024.0),
        report.stats.read_timeouts,
        report.stats.fresh_buffers
    );
    if report.stats.sink_errors > 0 {
        tracing::warn!("{} sink writes failed", report.stats.sink_errors);
    }

    report.into_result().context("Session ended early")?;
    Ok(())
}
