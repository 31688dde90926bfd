use thiserror::Error;

use crate::capture::frame::PixelFormat;

/// Errors raised by the capture layer: opening devices, decoding and
/// encoding frames, writing snapshots.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera {index} could not be opened: {reason}")]
    Open { index: u32, reason: String },
    #[error("camera {0} is already open")]
    Busy(u32),
    #[error("no camera available")]
    NoCameraAvailable,
    #[error("camera {0} is not in the working camera list")]
    UnknownCamera(u32),
    #[error("unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("frame buffer does not match {width}x{height}")]
    BadDimensions { width: u32, height: u32 },
    #[error("image encode failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// True when only the frame at hand is spoiled (a corrupt or truncated
    /// buffer) and the device can still deliver the next one.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            CaptureError::Decode(_) | CaptureError::BadDimensions { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
