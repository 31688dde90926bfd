pub mod debounce;
pub mod writer;

use std::fmt;
use std::path::PathBuf;

pub use debounce::{Debouncer, Decision};
pub use writer::{snapshot_name, SnapshotWriter};

/// User-facing result of a capture request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStatus {
    Saved(PathBuf),
    Failed,
}

impl<E> From<Result<PathBuf, E>> for CaptureStatus {
    fn from(result: Result<PathBuf, E>) -> Self {
        match result {
            Ok(path) => CaptureStatus::Saved(path),
            Err(_) => CaptureStatus::Failed,
        }
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStatus::Saved(path) => write!(f, "image saved to {}", path.display()),
            CaptureStatus::Failed => f.write_str("error"),
        }
    }
}
