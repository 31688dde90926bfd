//! Bird-feeder camera monitor: camera discovery, a pull-based capture loop
//! that streams multipart JPEG chunks, and cooldown-limited snapshots when
//! the detector sees a bird.

pub mod auth;
pub mod capture;
pub mod detect;
pub mod error;
pub mod session;
pub mod snapshot;
pub mod stream;

use std::path::{Path, PathBuf};

use capture::frame::PixelFormat;
use capture::synthetic::SyntheticPort;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

pub use error::CaptureError;
pub use session::{CameraSession, Selection};
pub use stream::FrameStream;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub scan: ScanConfig,
    pub snapshot: SnapshotConfig,
    pub stream: StreamConfig,
    pub detect: DetectConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    V4l2,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub backend: BackendKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// A read blocking longer than this ends the stream
    pub read_timeout_ms: u64,
    /// Port layout for the synthetic backend
    pub synthetic_ports: Vec<SyntheticPort>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_consecutive_failures: u32,
    pub max_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Png,
    Jpeg,
}

impl SnapshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Png => "png",
            SnapshotFormat::Jpeg => "jpg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            SnapshotFormat::Png => image::ImageFormat::Png,
            SnapshotFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub directory: PathBuf,
    pub format: SnapshotFormat,
    /// Minimum gap between two detection-triggered snapshots
    pub cooldown_secs: u64,
    /// Save the frame with detection boxes drawn instead of the raw frame
    pub annotate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Run the detector on every frame; needs a detector to be supplied
    pub ai_mode: bool,
    pub jpeg_quality: u8,
    /// Chunks buffered between the capture worker and the consumer
    pub channel_depth: usize,
    /// How long a manual capture waits for the live stream to answer
    pub capture_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub target_label: String,
    pub min_score: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::V4l2,
            width: 640,
            height: 480,
            fps: 30,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
            read_timeout_ms: 5_000,
            synthetic_ports: vec![SyntheticPort::Working { frames: None }],
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 6,
            max_index: 64,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("images"),
            format: SnapshotFormat::Png,
            cooldown_secs: 5,
            annotate: false,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ai_mode: false,
            jpeg_quality: 80,
            channel_depth: 4,
            capture_timeout_ms: 5_000,
        }
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            target_label: "bird".into(),
            min_score: 0.5,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file at `path` if it exists, then
    /// `BIRDWATCH__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("BIRDWATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
