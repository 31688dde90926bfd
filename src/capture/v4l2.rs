//! V4L2 capture: device index `n` is `/dev/videoN`, frames are pulled
//! through memory-mapped buffers and decoded to RGB24.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::decoder::decode_frame;
use crate::capture::device::{CameraBackend, CameraHandle, FrameRead, HandleState};
use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::error::{CaptureError, Result};
use crate::CaptureConfig;

/// Corrupt frames dropped in a row before the device counts as failed
const MAX_SKIPPED_FRAMES: u32 = 30;

fn fourcc_for(format: PixelFormat) -> Result<FourCC> {
    match format {
        PixelFormat::Mjpeg => Ok(FourCC::new(b"MJPG")),
        PixelFormat::Yuyv4 => Ok(FourCC::new(b"YUYV")),
        PixelFormat::Rgb24 => Ok(FourCC::new(b"RGB3")),
        PixelFormat::Bgr24 => Ok(FourCC::new(b"BGR3")),
        PixelFormat::Nv12 => Err(CaptureError::UnsupportedFormat(format)),
    }
}

fn format_for(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"MJPG" => Some(PixelFormat::Mjpeg),
        b"YUYV" => Some(PixelFormat::Yuyv4),
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"BGR3" => Some(PixelFormat::Bgr24),
        _ => None,
    }
}

/// Pull until a frame decodes. Corrupt buffers are dropped and the next one
/// dequeued; device errors and timeouts pass straight through.
fn skip_corrupt(mut next: impl FnMut() -> Result<Option<Frame>>) -> Result<Option<Frame>> {
    let mut skipped = 0;
    loop {
        match next() {
            Err(e) if e.is_frame_local() && skipped < MAX_SKIPPED_FRAMES => {
                skipped += 1;
                warn!("Dropping corrupt frame: {}", e);
                counter!("birdwatch_frames_dropped_total").increment(1);
            }
            other => return other,
        }
    }
}

/// Opens `/dev/video{index}` devices with the configured format.
pub struct V4l2Backend {
    config: CaptureConfig,
}

impl V4l2Backend {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl CameraBackend for V4l2Backend {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn open(&self, index: u32) -> Result<Box<dyn CameraHandle>> {
        Ok(Box::new(V4l2Capture::open(index, &self.config)?))
    }
}

/// Memory-mapped V4L2 capture bound to one device index
pub struct V4l2Capture {
    index: u32,
    // Field order matters: the stream must be dropped before the device.
    stream: Option<MmapStream<'static>>,
    device: Option<Box<Device>>,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: u64,
    failed: bool,
}

impl V4l2Capture {
    /// Open the device, negotiate the format and start streaming
    pub fn open(index: u32, config: &CaptureConfig) -> Result<Self> {
        let path = format!("/dev/video{}", index);
        let open_err = |reason: String| CaptureError::Open { index, reason };

        let device = Device::with_path(&path).map_err(|e| open_err(e.to_string()))?;

        // Query capabilities
        let caps = device.query_caps().map_err(|e| open_err(e.to_string()))?;
        debug!("Device {}: {} ({})", path, caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(open_err("device doesn't support video capture".into()));
        }

        // Set format; the driver may adjust what we ask for
        let mut fmt = device.format().map_err(|e| open_err(e.to_string()))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc_for(config.format)?;
        let fmt = device
            .set_format(&fmt)
            .map_err(|e| open_err(e.to_string()))?;

        let format = format_for(fmt.fourcc)
            .ok_or_else(|| open_err(format!("driver selected unsupported format {}", fmt.fourcc)))?;

        if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
            warn!("{} refused {} fps: {}", path, config.fps, e);
        }

        let mut stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count)
                .map_err(|e| open_err(e.to_string()))?;
        stream.set_timeout(Duration::from_millis(config.read_timeout_ms));

        info!(
            "Opened {} at {}x{} {:?} with {} buffers",
            path, fmt.width, fmt.height, format, config.buffer_count
        );

        Ok(Self {
            index,
            stream: Some(stream),
            device: Some(Box::new(device)),
            width: fmt.width,
            height: fmt.height,
            format,
            sequence: 0,
            failed: false,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        // Blocks up to the configured timeout
        let (buf, meta) = stream.next()?;
        let timestamp = Instant::now();
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        let rgb = decode_frame(&buf[..used], self.format, self.width, self.height)?;

        self.sequence += 1;

        let frame_meta = Arc::new(FrameMetadata {
            sequence: self.sequence,
            width: self.width,
            height: self.height,
            source_format: self.format,
        });

        Ok(Some(Frame {
            data: Bytes::from(rgb),
            meta: frame_meta,
            timestamp,
        }))
    }
}

impl CameraHandle for V4l2Capture {
    fn index(&self) -> u32 {
        self.index
    }

    fn state(&self) -> HandleState {
        match (&self.device, self.failed) {
            (None, _) => HandleState::Closed,
            (Some(_), true) => HandleState::OpenFailed,
            (Some(_), false) => HandleState::OpenReadable,
        }
    }

    #[instrument(skip(self), fields(index = self.index))]
    fn read(&mut self) -> FrameRead {
        if self.failed {
            return FrameRead::EndOfStream;
        }

        match skip_corrupt(|| self.next_frame()) {
            Ok(Some(frame)) => FrameRead::Frame(frame),
            Ok(None) => FrameRead::EndOfStream,
            Err(e) => {
                warn!("error with camera feed, no frame detected: {}", e);
                self.failed = true;
                FrameRead::EndOfStream
            }
        }
    }

    fn close(&mut self) {
        if self.device.is_none() {
            return;
        }
        self.stream.take();
        self.device.take();
        debug!("Released /dev/video{}", self.index);
    }
}

impl Drop for V4l2Capture {
    fn drop(&mut self) {
        self.close();
    }
}
