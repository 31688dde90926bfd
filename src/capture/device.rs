//! Camera backend seam: open a device by index, read frames, close.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::frame::Frame;
use crate::error::Result;

/// Lifecycle of a [`CameraHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Released, or never produced a frame source.
    Closed,
    /// Streaming and able to deliver frames.
    OpenReadable,
    /// Opened, but the device stopped delivering frames.
    OpenFailed,
}

/// Result of one blocking read.
#[derive(Debug)]
pub enum FrameRead {
    Frame(Frame),
    /// The device failed, stalled past its timeout, or ran out of frames.
    EndOfStream,
}

/// A family of cameras addressed by sequential device index.
pub trait CameraBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn open(&self, index: u32) -> Result<Box<dyn CameraHandle>>;
}

/// One open camera. Owned exclusively by whoever opened it.
pub trait CameraHandle: Send {
    fn index(&self) -> u32;

    fn state(&self) -> HandleState;

    /// Block until the next frame is available or the device gives up.
    /// Once this returns [`FrameRead::EndOfStream`] the handle moves to
    /// [`HandleState::OpenFailed`] and every further read does the same.
    fn read(&mut self) -> FrameRead;

    /// Release the device. Calling this on a closed handle is a no-op.
    fn close(&mut self);
}

/// A handle that more than one owner may close. The stream reads through
/// it; the session keeps a clone so it can release the device when the
/// selection moves on, whether or not the stream is pulled again.
#[derive(Clone)]
pub struct SharedCamera {
    index: u32,
    handle: Arc<Mutex<Box<dyn CameraHandle>>>,
}

impl SharedCamera {
    pub fn new(handle: Box<dyn CameraHandle>) -> Self {
        Self {
            index: handle.index(),
            handle: Arc::new(Mutex::new(handle)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn CameraHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn state(&self) -> HandleState {
        self.lock().state()
    }

    pub fn read(&self) -> FrameRead {
        self.lock().read()
    }

    /// Waits for a read in progress to return, then releases the device.
    pub fn close(&self) {
        self.lock().close();
    }
}

impl std::fmt::Debug for SharedCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCamera").field("index", &self.index).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticBackend;

    #[test]
    fn any_clone_can_close_the_device() {
        let backend = SyntheticBackend::working(1, 4, 4);
        let camera = SharedCamera::new(backend.open(0).unwrap());
        let reader = camera.clone();

        assert!(matches!(reader.read(), FrameRead::Frame(_)));
        camera.close();

        assert!(!backend.is_open(0));
        assert_eq!(reader.state(), HandleState::Closed);
        assert!(matches!(reader.read(), FrameRead::EndOfStream));
    }
}
