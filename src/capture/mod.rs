pub mod decoder;
pub mod device;
pub mod frame;
pub mod scanner;
pub mod synthetic;
pub mod v4l2;

pub use device::{CameraBackend, CameraHandle, FrameRead, HandleState, SharedCamera};
pub use frame::{Frame, PixelFormat};
pub use scanner::{scan, CameraRegistry, PortScanner};
pub use synthetic::{SyntheticBackend, SyntheticPort};
pub use v4l2::{V4l2Backend, V4l2Capture};

use std::sync::Arc;

use crate::{BackendKind, CaptureConfig};

/// Build the backend named in the configuration.
pub fn backend_from_config(config: &CaptureConfig) -> Arc<dyn CameraBackend> {
    match config.backend {
        BackendKind::V4l2 => Arc::new(V4l2Backend::new(config.clone())),
        BackendKind::Synthetic => Arc::new(SyntheticBackend::new(
            config.synthetic_ports.clone(),
            config.width,
            config.height,
        )),
    }
}
