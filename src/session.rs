//! Which camera is selected, and the single live stream bound to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::capture::{CameraBackend, CameraRegistry, FrameRead, PortScanner, SharedCamera};
use crate::detect::Detector;
use crate::error::{CaptureError, Result};
use crate::snapshot::{CaptureStatus, SnapshotWriter};
use crate::stream::{CaptureRequest, FrameStream};
use crate::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Camera(u32),
    /// The last scan found no working camera and none was chosen by hand.
    NoCameraAvailable,
}

/// Lets a stream notice that its camera was deselected.
#[derive(Debug, Clone)]
pub struct SelectionGuard {
    generation: Arc<AtomicU64>,
    bound: u64,
}

impl SelectionGuard {
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::Acquire) == self.bound
    }
}

/// Manual captures queued for the live stream beyond this are refused.
const CAPTURE_QUEUE_DEPTH: usize = 4;

/// The session's side of the stream it handed out last.
struct LiveStream {
    requests: flume::Sender<CaptureRequest>,
    camera: SharedCamera,
}

struct SessionState {
    selected: Option<u32>,
    live: Option<LiveStream>,
}

impl SessionState {
    /// Release the live stream's camera. The stream itself ends at its
    /// next pull.
    fn supersede(&mut self) {
        if let Some(live) = self.live.take() {
            live.camera.close();
            info!("Released camera {} held by the previous stream", live.camera.index());
        }
    }
}

/// Camera selection and live-stream bookkeeping, passed explicitly to
/// whatever serves the feed.
///
/// The registry is rebuilt only by [`CameraSession::rescan`]. A camera held
/// open by the live stream shows up as not working in a rescan; the
/// selection is kept regardless.
pub struct CameraSession {
    backend: Arc<dyn CameraBackend>,
    config: Config,
    registry: ArcSwap<CameraRegistry>,
    state: Mutex<SessionState>,
    generation: Arc<AtomicU64>,
}

impl CameraSession {
    pub fn new(backend: Arc<dyn CameraBackend>, config: Config) -> Self {
        Self {
            backend,
            config,
            registry: ArcSwap::from_pointee(CameraRegistry::default()),
            state: Mutex::new(SessionState {
                selected: None,
                live: None,
            }),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Probe ports again. Selects the first working camera if nothing is
    /// selected yet.
    pub fn rescan(&self) -> Arc<CameraRegistry> {
        let registry = Arc::new(PortScanner::new(&self.config.scan).scan(self.backend.as_ref()));
        self.registry.store(Arc::clone(&registry));

        let mut state = self.state();
        if state.selected.is_none() {
            state.selected = registry.first();
            match state.selected {
                Some(index) => info!("Camera {} selected", index),
                None => warn!("No working camera found"),
            }
        }
        registry
    }

    /// Result of the last scan.
    pub fn registry(&self) -> Arc<CameraRegistry> {
        self.registry.load_full()
    }

    pub fn selection(&self) -> Selection {
        self.state()
            .selected
            .map_or(Selection::NoCameraAvailable, Selection::Camera)
    }

    /// Switch to `index`, which must be in the last scan's working list.
    /// A stream on the previous camera loses it right away and ends at its
    /// next pull.
    pub fn select(&self, index: u32) -> Result<()> {
        if !self.registry().contains(index) {
            return Err(CaptureError::UnknownCamera(index));
        }

        let mut state = self.state();
        if state.selected != Some(index) {
            self.generation.fetch_add(1, Ordering::AcqRel);
            state.supersede();
            state.selected = Some(index);
            info!("Camera {} has now been selected", index);
        }
        Ok(())
    }

    /// Open the selected camera and wrap it in a stream. Any earlier stream
    /// from this session has its camera closed first, so at most one handle
    /// is ever open through the session.
    ///
    /// `detector` only takes effect when `stream.ai_mode` is on.
    pub fn open_stream(&self, detector: Option<Box<dyn Detector>>) -> Result<FrameStream> {
        let mut state = self.state();
        let index = state.selected.ok_or(CaptureError::NoCameraAvailable)?;

        let bound = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        state.supersede();

        let camera = self.backend.open(index)?;
        let (tx, rx) = flume::bounded(CAPTURE_QUEUE_DEPTH);

        let mut stream = FrameStream::new(camera, &self.config)
            .with_capture_requests(rx)
            .bound_to(SelectionGuard {
                generation: Arc::clone(&self.generation),
                bound,
            });
        state.live = Some(LiveStream {
            requests: tx,
            camera: stream.camera(),
        });

        match detector {
            Some(detector) if self.config.stream.ai_mode => {
                stream = stream.with_detector(detector);
            }
            Some(_) => info!("AI mode is off, streaming without detection"),
            None if self.config.stream.ai_mode => {
                warn!("AI mode is on but no detector was supplied")
            }
            None => {}
        }

        info!("Streaming camera {} (ai_mode={})", index, stream.ai_mode());
        Ok(stream)
    }

    /// Save what the selected camera sees right now, not marked as AI.
    ///
    /// Served by the live stream when there is one, otherwise the camera is
    /// opened for a single frame.
    pub fn capture_image(&self) -> CaptureStatus {
        let (selected, live) = {
            let state = self.state();
            (
                state.selected,
                state.live.as_ref().map(|live| live.requests.clone()),
            )
        };

        if let Some(live) = live {
            let (reply_tx, reply_rx) = flume::bounded(1);
            match live.try_send(CaptureRequest { reply: reply_tx }) {
                Ok(()) => {
                    let timeout = Duration::from_millis(self.config.stream.capture_timeout_ms);
                    // Dropping `reply_rx` on timeout withdraws the request
                    return reply_rx.recv_timeout(timeout).unwrap_or_else(|e| {
                        warn!("Live stream did not answer capture request: {}", e);
                        CaptureStatus::Failed
                    });
                }
                Err(flume::TrySendError::Full(_)) => {
                    warn!("Too many captures waiting on the live stream");
                    return CaptureStatus::Failed;
                }
                // Stream ended; fall back to a direct read
                Err(flume::TrySendError::Disconnected(_)) => {
                    let mut state = self.state();
                    if state
                        .live
                        .as_ref()
                        .is_some_and(|current| current.requests.same_channel(&live))
                    {
                        state.live = None;
                    }
                }
            }
        }

        let Some(index) = selected else {
            warn!("Capture requested with no camera available");
            return CaptureStatus::Failed;
        };
        self.capture_direct(index).into()
    }

    fn capture_direct(&self, index: u32) -> Result<std::path::PathBuf> {
        let mut camera = self.backend.open(index)?;
        let read = camera.read();
        camera.close();

        match read {
            FrameRead::Frame(frame) => SnapshotWriter::new(&self.config.snapshot).write(&frame, false),
            FrameRead::EndOfStream => {
                warn!("Camera {} gave no frame for capture", index);
                Err(CaptureError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "camera returned no frame",
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SyntheticBackend, SyntheticPort};

    fn session(ports: Vec<SyntheticPort>) -> CameraSession {
        CameraSession::new(Arc::new(SyntheticBackend::new(ports, 8, 8)), Config::default())
    }

    #[test]
    fn empty_scan_means_no_camera() {
        let session = session(vec![]);
        assert!(session.rescan().is_empty());
        assert_eq!(session.selection(), Selection::NoCameraAvailable);
        assert!(matches!(
            session.open_stream(None),
            Err(CaptureError::NoCameraAvailable)
        ));
        assert_eq!(session.capture_image(), CaptureStatus::Failed);
        assert_eq!(session.capture_image().to_string(), "error");
    }

    #[test]
    fn first_working_camera_is_selected() {
        let session = session(vec![
            SyntheticPort::Unopenable,
            SyntheticPort::Working { frames: None },
            SyntheticPort::Working { frames: None },
        ]);
        session.rescan();
        assert_eq!(session.selection(), Selection::Camera(1));
    }

    #[test]
    fn only_scanned_cameras_can_be_selected() {
        let session = session(vec![SyntheticPort::Working { frames: None }]);
        session.rescan();
        assert!(matches!(session.select(5), Err(CaptureError::UnknownCamera(5))));
        assert_eq!(session.selection(), Selection::Camera(0));
    }

    #[test]
    fn rescan_keeps_manual_selection() {
        let session = session(vec![SyntheticPort::Working { frames: None }; 3]);
        session.rescan();
        session.select(2).unwrap();
        session.rescan();
        assert_eq!(session.selection(), Selection::Camera(2));
    }
}
