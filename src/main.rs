//! Birdwatch headless monitor: scan cameras, stream the selected one and
//! save snapshots until Ctrl-C or the feed ends.

use std::path::PathBuf;

use birdwatch::{capture, stream, CameraSession, Config, Selection};
use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("birdwatch=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Birdwatch launching...");

    // Load configuration
    let config_path = std::env::var_os("BIRDWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("birdwatch.toml"));
    let config = Config::load(Some(config_path.as_path()))?;

    let backend = capture::backend_from_config(&config.capture);
    let depth = config.stream.channel_depth;
    let session = CameraSession::new(backend, config);

    let registry = session.rescan();
    info!(
        "Cameras available: {}, working {:?}, not working {:?}, unreadable {:?}",
        registry.available_count,
        registry.working_indices,
        registry.non_working_indices,
        registry.unreadable_indices
    );

    if session.selection() == Selection::NoCameraAvailable {
        return Err(eyre!("No camera available"));
    }

    // No detection model is linked into this binary
    let frames = session.open_stream(None)?;
    let mut feed = stream::spawn(frames, depth);

    let mut chunks = 0u64;
    let mut bytes = 0u64;
    loop {
        tokio::select! {
            chunk = feed.chunks.recv_async() => match chunk {
                Ok(chunk) => {
                    chunks += 1;
                    bytes += chunk.len() as u64;
                }
                Err(_) => {
                    warn!("Camera feed ended");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // Dropping the receiver stops the worker and releases the camera
    drop(feed.chunks);
    feed.worker.await?;

    info!("Birdwatch shutting down after {} chunks ({} bytes)", chunks, bytes);
    Ok(())
}
