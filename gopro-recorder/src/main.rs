//! GoPro recorder service.
//!
//! Advertises `camera/record` on a local bus and drives it from stdin: type
//! `start` or `stop`, one per line. Content identifiers announced on
//! `camera/thumbnail` and `camera/video` are logged.
//!
//! ```bash
//! # Use an in-memory store instead of a local IPFS node
//! IPFS_API_URL=memory RUST_LOG=gopro_recorder=debug gopro-recorder
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use gopro_recorder::{
    Config, ContentStore, HttpCamera, IpfsStore, LocalBus, MemoryStore, RecordingController,
    StoreBackend, RECORD_SERVICE, THUMBNAIL_TOPIC, VIDEO_TOPIC,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "gopro_recorder=info";

/// `RUST_LOG` when it parses, otherwise info for this crate.
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

async fn log_announcements(topic: &'static str, mut rx: broadcast::Receiver<String>) {
    loop {
        match rx.recv().await {
            Ok(cid) => info!(topic, %cid, "Announced"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(topic, skipped, "Announcement log fell behind")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        control = %config.control_url,
        media = %config.media_url,
        policy = ?config.publish_policy,
        "Starting recorder"
    );

    let client = config.http_client()?;
    let camera = HttpCamera::with_client(
        client.clone(),
        config.control_url.clone(),
        config.media_url.clone(),
    );
    let store: Arc<dyn ContentStore> = match &config.store {
        StoreBackend::Ipfs(api) => Arc::new(IpfsStore::with_client(client, api.clone())),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    let bus = LocalBus::new();
    tokio::spawn(log_announcements(
        THUMBNAIL_TOPIC,
        bus.subscribe(THUMBNAIL_TOPIC).await,
    ));
    tokio::spawn(log_announcements(VIDEO_TOPIC, bus.subscribe(VIDEO_TOPIC).await));

    let controller = RecordingController::new(
        Arc::new(camera),
        store,
        Arc::new(bus.publisher(THUMBNAIL_TOPIC).await),
        Arc::new(bus.publisher(VIDEO_TOPIC).await),
    )
    .with_policy(config.publish_policy);

    let server = bus.advertise(RECORD_SERVICE).await;
    let serving = controller.clone();
    tokio::spawn(async move { serving.serve(server).await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };

        let enable = match line.trim() {
            "start" => true,
            "stop" => false,
            "" => continue,
            other => {
                warn!(command = other, "Expected `start` or `stop`");
                continue;
            }
        };

        let ack = bus.call(RECORD_SERVICE, enable).await?;
        if ack.success {
            info!(enable, "Recording request accepted");
        } else {
            warn!(enable, message = %ack.message, "Recording request failed");
        }
    }

    info!("Shutting down");
    tokio::select! {
        _ = controller.shutdown() => {}
        _ = tokio::signal::ctrl_c() => warn!("Abandoning running media publishes"),
    }
    Ok(())
}
