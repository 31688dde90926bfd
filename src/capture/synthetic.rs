//! Test-pattern camera bank. Each index is scripted to be working,
//! unopenable or unreadable; working ports render a moving gradient.
//! Opens are exclusive per index, like a real capture device.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::device::{CameraBackend, CameraHandle, FrameRead, HandleState};
use crate::capture::frame::{Frame, PixelFormat};
use crate::error::{CaptureError, Result};

/// Scripted behaviour of one synthetic port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticPort {
    /// Delivers frames; `frames` caps how many before end-of-stream.
    Working { frames: Option<u64> },
    /// `open` fails.
    Unopenable,
    /// `open` succeeds but no frame is ever delivered.
    Unreadable,
}

type OpenSet = Arc<Mutex<HashSet<u32>>>;

pub struct SyntheticBackend {
    ports: Vec<SyntheticPort>,
    width: u32,
    height: u32,
    open: OpenSet,
}

impl SyntheticBackend {
    /// Indices past the end of `ports` are unopenable.
    pub fn new(ports: Vec<SyntheticPort>, width: u32, height: u32) -> Self {
        Self {
            ports,
            width,
            height,
            open: Arc::default(),
        }
    }

    /// `count` endless working ports starting at index 0.
    pub fn working(count: usize, width: u32, height: u32) -> Self {
        Self::new(
            vec![SyntheticPort::Working { frames: None }; count],
            width,
            height,
        )
    }

    /// Whether some handle currently holds `index` open.
    pub fn is_open(&self, index: u32) -> bool {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&index)
    }
}

impl CameraBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, index: u32) -> Result<Box<dyn CameraHandle>> {
        let port = self
            .ports
            .get(index as usize)
            .copied()
            .unwrap_or(SyntheticPort::Unopenable);

        let remaining = match port {
            SyntheticPort::Unopenable => {
                return Err(CaptureError::Open {
                    index,
                    reason: "no such device".into(),
                })
            }
            SyntheticPort::Working { frames } => frames,
            SyntheticPort::Unreadable => Some(0),
        };

        if !self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index)
        {
            return Err(CaptureError::Busy(index));
        }
        debug!("Synthetic camera {} opened", index);

        Ok(Box::new(SyntheticCapture {
            index,
            width: self.width,
            height: self.height,
            remaining,
            sequence: 0,
            failed: false,
            open: Some(Arc::clone(&self.open)),
        }))
    }
}

struct SyntheticCapture {
    index: u32,
    width: u32,
    height: u32,
    remaining: Option<u64>,
    sequence: u64,
    failed: bool,
    open: Option<OpenSet>,
}

impl SyntheticCapture {
    fn render(&self) -> Vec<u8> {
        let shift = (self.sequence * 4) as u32;
        let mut pixels = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push(((x + shift) % 256) as u8);
                pixels.push(((y + shift) % 256) as u8);
                pixels.push((self.index * 64 % 256) as u8);
            }
        }
        pixels
    }
}

impl CameraHandle for SyntheticCapture {
    fn index(&self) -> u32 {
        self.index
    }

    fn state(&self) -> HandleState {
        match (&self.open, self.failed) {
            (None, _) => HandleState::Closed,
            (Some(_), true) => HandleState::OpenFailed,
            (Some(_), false) => HandleState::OpenReadable,
        }
    }

    fn read(&mut self) -> FrameRead {
        if self.open.is_none() || self.failed {
            return FrameRead::EndOfStream;
        }
        if self.remaining == Some(0) {
            self.failed = true;
            return FrameRead::EndOfStream;
        }

        self.sequence += 1;
        if let Some(left) = self.remaining.as_mut() {
            *left -= 1;
        }

        match Frame::from_rgb(
            self.render(),
            self.width,
            self.height,
            self.sequence,
            PixelFormat::Rgb24,
        ) {
            Ok(frame) => FrameRead::Frame(frame),
            Err(_) => {
                self.failed = true;
                FrameRead::EndOfStream
            }
        }
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.index);
            debug!("Synthetic camera {} released", self.index);
        }
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_budget_ends_stream() {
        let backend = SyntheticBackend::new(vec![SyntheticPort::Working { frames: Some(2) }], 4, 4);
        let mut cam = backend.open(0).unwrap();
        assert!(matches!(cam.read(), FrameRead::Frame(_)));
        assert!(matches!(cam.read(), FrameRead::Frame(_)));
        assert!(matches!(cam.read(), FrameRead::EndOfStream));
        assert_eq!(cam.state(), HandleState::OpenFailed);
        assert!(matches!(cam.read(), FrameRead::EndOfStream));
    }

    #[test]
    fn open_is_exclusive_until_closed() {
        let backend = SyntheticBackend::working(1, 4, 4);
        let mut cam = backend.open(0).unwrap();
        assert!(matches!(backend.open(0), Err(CaptureError::Busy(0))));

        cam.close();
        assert_eq!(cam.state(), HandleState::Closed);
        assert!(!backend.is_open(0));
        assert!(backend.open(0).is_ok());
    }

    #[test]
    fn close_is_idempotent() {
        let backend = SyntheticBackend::working(1, 4, 4);
        let mut cam = backend.open(0).unwrap();
        cam.close();
        cam.close();
        assert_eq!(cam.state(), HandleState::Closed);
        assert!(matches!(cam.read(), FrameRead::EndOfStream));
    }

    #[test]
    fn drop_releases_the_port() {
        let backend = SyntheticBackend::working(1, 4, 4);
        drop(backend.open(0).unwrap());
        assert!(!backend.is_open(0));
    }

    #[test]
    fn unknown_index_is_unopenable() {
        let backend = SyntheticBackend::working(1, 4, 4);
        assert!(matches!(backend.open(3), Err(CaptureError::Open { index: 3, .. })));
    }
}
