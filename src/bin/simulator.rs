//! Digitizer Simulator
//!
//! Serves the digitizer's streaming data port with synthetic interleaved
//! samples so the streamer can be exercised without hardware.
//!
//! Usage: simulator [bind-address] [sites] [frequency-hz]

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use acq_stream::{
    constants::{CHANNELS_PER_SITE, DEFAULT_DATA_PORT, DEFAULT_FREQUENCY},
    protocol::encode_sample,
};

/// Samples per channel sent in one write
const BLOCK_SAMPLES: usize = 256;

/// One block of interleaved samples: a sine per channel, pitched by channel
fn render_block(channels: usize, frequency: f64, first_sample: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(BLOCK_SAMPLES * channels * 2);
    for k in 0..BLOCK_SAMPLES as u64 {
        let t = (first_sample + k) as f64 / frequency;
        for c in 0..channels {
            let tone = 10.0 * (c + 1) as f64;
            let value = (t * tone * 2.0 * std::f64::consts::PI).sin() * 16_000.0;
            bytes.extend_from_slice(&encode_sample(value as i16));
        }
    }
    bytes
}

async fn stream_to(mut conn: TcpStream, channels: usize, frequency: f64) -> std::io::Result<()> {
    let block_period = Duration::from_secs_f64(BLOCK_SAMPLES as f64 / frequency);
    let mut ticker = tokio::time::interval(block_period);
    let started = Instant::now();
    let mut sample: u64 = 0;

    loop {
        ticker.tick().await;
        conn.write_all(&render_block(channels, frequency, sample)).await?;
        sample += BLOCK_SAMPLES as u64;

        if sample % (frequency as u64 * 10).max(1) < BLOCK_SAMPLES as u64 {
            tracing::info!(
                "Sent {} samples/channel in {:.1}s",
                sample,
                started.elapsed().as_secs_f64()
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let bind = args
        .next()
        .unwrap_or_else(|| format!("0.0.0.0:{}", DEFAULT_DATA_PORT));
    let sites: usize = match args.next() {
        Some(s) => s.parse().context("Invalid site count")?,
        None => 1,
    };
    let frequency: f64 = match args.next() {
        Some(f) => f.parse().context("Invalid frequency")?,
        None => DEFAULT_FREQUENCY,
    };
    anyhow::ensure!(sites > 0, "Site count must be positive");
    anyhow::ensure!(frequency > 0.0, "Frequency must be positive");

    let channels = sites * CHANNELS_PER_SITE;
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    tracing::info!(
        "Simulating {} channels at {} Hz on {}",
        channels,
        frequency,
        bind
    );

    loop {
        let (conn, peer) = listener.accept().await?;
        tracing::info!("Streaming to {}", peer);
        tokio::spawn(async move {
            if let Err(e) = stream_to(conn, channels, frequency).await {
                tracing::info!("Client {} disconnected: {}", peer, e);
            }
        });
    }
}
