//! Replays a capture of location reports through the full ingest pipeline.
//!
//! Input is JSON lines, one delivery per line:
//!
//! ```json
//! {"routing_key": "site/site-001/device/badge-17/location", "payload": {"zone_id": "dock-a", "timestamp": "2025-06-12T08:00:00Z"}}
//! ```
//!
//! Deliveries are pushed through the same competing-consumer worker pool the
//! live broker connection would feed, so replaying a capture exercises the
//! real transition, retry, and acknowledgment paths.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use zonetrack_core::services::ingest::{ChannelSource, Delivery, Resolution};
use zonetrack_core::Core;

#[derive(Debug, Parser)]
#[command(name = "replay", about = "Replay captured location reports into a zonetrack store")]
struct Args {
    /// JSON-lines capture file
    input: PathBuf,

    /// Data directory holding the config and database
    #[arg(long, env = "ZONETRACK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Channel capacity between the reader and the workers
    #[arg(long, default_value_t = 256)]
    buffer: usize,
}

#[derive(Debug, serde::Deserialize)]
struct CaptureLine {
    routing_key: String,
    payload: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let core = match args.data_dir {
        Some(dir) => Core::new_with_config(dir).await?,
        None => Core::new().await?,
    };

    let (tx, source) = ChannelSource::new(args.buffer);
    let service = core.start_ingest(Arc::new(source)).await?;

    let file = File::open(&args.input)
        .await
        .with_context(|| format!("opening capture {:?}", args.input))?;
    let mut lines = BufReader::new(file).lines();

    let mut sent = 0u64;
    let mut receipts = Vec::new();
    let mut line_no = 0u64;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let capture: CaptureLine = match serde_json::from_str(&line) {
            Ok(capture) => capture,
            Err(err) => {
                warn!("Skipping line {line_no}: {err}");
                continue;
            }
        };
        let (delivery, receipt) =
            Delivery::new(capture.routing_key, capture.payload.to_string());
        tx.send(delivery).await.context("workers stopped early")?;
        receipts.push(receipt);
        sent += 1;
    }

    // Closing the channel drains the workers
    drop(tx);
    service.join().await;

    let mut acked = 0u64;
    let mut rejected = 0u64;
    let mut redeliverable = 0u64;
    for receipt in receipts {
        match receipt.await {
            Ok(Resolution::Ack) => acked += 1,
            Ok(Resolution::Reject) => rejected += 1,
            Err(_) => redeliverable += 1,
        }
    }

    let stats = service.stats();
    println!("replayed {sent} deliveries");
    println!("  acked:         {acked}");
    println!("  dead-lettered: {rejected}");
    println!("  redeliverable: {redeliverable}");
    println!(
        "  applied {} / discarded {} (out of order)",
        stats.applied.load(std::sync::atomic::Ordering::Relaxed),
        stats.discarded.load(std::sync::atomic::Ordering::Relaxed),
    );

    core.shutdown().await?;
    Ok(())
}
