use bytes::Bytes;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{CaptureError, Result};

/// Decoded RGB24 frame. Cloning is cheap: pixel data and metadata are shared.
#[derive(Clone)]
pub struct Frame {
    /// Immutable RGB24 pixel data, row-major, `width * 3` bytes per row
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// When the frame left the device, for capture-to-encode latency
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Format the device delivered before decoding
    pub source_format: PixelFormat,
}

/// Pixel formats a device may deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Nv12,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails when the buffer length does not match
    /// the dimensions.
    pub fn from_rgb(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        sequence: u64,
        source_format: PixelFormat,
    ) -> Result<Self> {
        let data = data.into();
        if data.len() != (width as usize) * (height as usize) * 3 {
            return Err(CaptureError::BadDimensions { width, height });
        }

        Ok(Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence,
                width,
                height,
                source_format,
            }),
            timestamp: Instant::now(),
        })
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    /// Copy into an owned `image` buffer for encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width(), self.height(), self.data.to_vec()).ok_or(
            CaptureError::BadDimensions {
                width: self.width(),
                height: self.height(),
            },
        )
    }

    /// Same frame with its pixels replaced, metadata kept.
    pub fn with_pixels(&self, data: Vec<u8>) -> Result<Self> {
        if data.len() != self.data.len() {
            return Err(CaptureError::BadDimensions {
                width: self.width(),
                height: self.height(),
            });
        }

        Ok(Self {
            data: Bytes::from(data),
            meta: Arc::clone(&self.meta),
            timestamp: self.timestamp,
        })
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("width", &self.meta.width)
            .field("height", &self.meta.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
