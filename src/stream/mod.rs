//! The capture loop, as a lazy sequence of multipart JPEG chunks.
//!
//! Each pull runs strictly in order: read a frame, run the detector (AI
//! mode), let the debouncer decide, maybe write a snapshot, answer pending
//! manual captures, encode. Nothing overlaps, so the debouncer only ever
//! sees one detection at a time.

pub mod bridge;

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use metrics::{counter, histogram};
use tracing::{debug, error, info, warn};

use crate::capture::{CameraHandle, Frame, FrameRead, SharedCamera};
use crate::detect::Detector;
use crate::error::Result;
use crate::session::SelectionGuard;
use crate::snapshot::{CaptureStatus, Debouncer, Decision, SnapshotWriter};
use crate::Config;

pub use bridge::{spawn, LiveFeed};

/// Multipart boundary token.
pub const BOUNDARY: &str = "frame";

/// MIME type of the full response body.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Frame the JPEG bytes as one multipart part.
pub fn encode_chunk(jpeg: &[u8]) -> Bytes {
    const HEAD: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let mut chunk = BytesMut::with_capacity(HEAD.len() + jpeg.len() + 2);
    chunk.put_slice(HEAD);
    chunk.put_slice(jpeg);
    chunk.put_slice(b"\r\n");
    chunk.freeze()
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let image = frame.to_rgb_image()?;
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&image)?;
    Ok(jpeg)
}

/// A manual snapshot request served by the live stream. A request whose
/// requester stopped waiting is dropped without writing anything.
pub struct CaptureRequest {
    pub reply: flume::Sender<CaptureStatus>,
}

/// Infinite, non-restartable chunk sequence over one open camera. Ends
/// quietly when the camera stops delivering frames; dropping it releases
/// the camera.
pub struct FrameStream {
    camera: SharedCamera,
    detector: Option<Box<dyn Detector>>,
    debouncer: Debouncer,
    writer: SnapshotWriter,
    jpeg_quality: u8,
    annotate_snapshots: bool,
    requests: Option<flume::Receiver<CaptureRequest>>,
    selection: Option<SelectionGuard>,
    finished: bool,
}

impl FrameStream {
    /// Stream `camera` without detection. Use [`FrameStream::with_detector`]
    /// to turn on AI mode.
    pub fn new(camera: Box<dyn CameraHandle>, config: &Config) -> Self {
        Self {
            camera: SharedCamera::new(camera),
            detector: None,
            debouncer: Debouncer::new(Duration::from_secs(config.snapshot.cooldown_secs)),
            writer: SnapshotWriter::new(&config.snapshot),
            jpeg_quality: config.stream.jpeg_quality,
            annotate_snapshots: config.snapshot.annotate,
            requests: None,
            selection: None,
            finished: false,
        }
    }

    /// Run `detector` over every frame and save cooldown-limited snapshots
    /// when it fires.
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub(crate) fn with_capture_requests(mut self, requests: flume::Receiver<CaptureRequest>) -> Self {
        self.requests = Some(requests);
        self
    }

    pub(crate) fn bound_to(mut self, guard: SelectionGuard) -> Self {
        self.selection = Some(guard);
        self
    }

    /// Another owner of the camera, able to close it from outside.
    pub(crate) fn camera(&self) -> SharedCamera {
        self.camera.clone()
    }

    pub fn camera_index(&self) -> u32 {
        self.camera.index()
    }

    pub fn ai_mode(&self) -> bool {
        self.detector.is_some()
    }

    fn finish(&mut self) {
        self.finished = true;
        self.camera.close();
    }

    /// Detection, debounce and maybe-save. Returns the frame to show.
    fn detect(&mut self, frame: &Frame) -> Frame {
        let Some(detector) = self.detector.as_mut() else {
            return frame.clone();
        };

        let event = match detector.infer(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Detector failed on frame {}, treating as empty: {}", frame.sequence(), e);
                counter!("birdwatch_detector_errors_total").increment(1);
                return frame.clone();
            }
        };

        if event.detected {
            counter!("birdwatch_detections_total").increment(1);
        }

        match self.debouncer.observe(event.detected, event.timestamp) {
            Decision::Save => {
                let to_save = if self.annotate_snapshots {
                    &event.annotated_frame
                } else {
                    frame
                };
                match self.writer.write(to_save, true) {
                    Ok(_) => counter!("birdwatch_snapshots_saved_total").increment(1),
                    Err(e) => {
                        error!("Snapshot of frame {} failed: {}", frame.sequence(), e);
                        counter!("birdwatch_snapshot_errors_total").increment(1);
                    }
                }
            }
            Decision::Suppressed => {
                debug!("Detection on frame {} inside cooldown", frame.sequence());
                counter!("birdwatch_snapshots_suppressed_total").increment(1);
            }
            Decision::Idle => {}
        }

        event.annotated_frame
    }

    fn serve_capture_requests(&self, frame: &Frame) {
        let Some(requests) = &self.requests else {
            return;
        };
        for request in requests.try_iter() {
            if request.reply.is_disconnected() {
                debug!("Dropping capture request nobody is waiting for");
                continue;
            }

            let written = self.writer.write(frame, false);
            if written.is_err() {
                counter!("birdwatch_snapshot_errors_total").increment(1);
            }
            let status = CaptureStatus::from(written);
            if let Err(flume::SendError(CaptureStatus::Saved(path))) = request.reply.send(status) {
                // The requester gave up while the file was being written
                // and has already been told the capture failed.
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("Could not remove unclaimed capture {}: {}", path.display(), e);
                }
            }
        }
    }
}

impl Iterator for FrameStream {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(guard) = &self.selection {
                if !guard.is_current() {
                    info!("Camera {} deselected, closing stream", self.camera.index());
                    self.finish();
                    return None;
                }
            }

            let frame = match self.camera.read() {
                FrameRead::Frame(frame) => frame,
                FrameRead::EndOfStream => {
                    info!("Camera {} feed ended", self.camera.index());
                    self.finish();
                    return None;
                }
            };

            let shown = self.detect(&frame);
            self.serve_capture_requests(&frame);

            match encode_jpeg(&shown, self.jpeg_quality) {
                Ok(jpeg) => {
                    counter!("birdwatch_frames_streamed_total").increment(1);
                    histogram!("birdwatch_frame_latency_seconds")
                        .record(frame.timestamp.elapsed().as_secs_f64());
                    return Some(encode_chunk(&jpeg));
                }
                // Skip this frame, keep the feed alive
                Err(e) => warn!("Failed to encode frame {}: {}", frame.sequence(), e),
            }
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.camera.close();
    }
}
