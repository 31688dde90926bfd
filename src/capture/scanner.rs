//! Camera port discovery.

use serde::Serialize;
use tracing::{info, warn};

use crate::capture::device::{CameraBackend, FrameRead};
use crate::ScanConfig;

/// Snapshot of which device indices answered the last scan. Stale until the
/// next scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CameraRegistry {
    pub available_count: usize,
    pub working_indices: Vec<u32>,
    pub non_working_indices: Vec<u32>,
    /// Opened fine but never delivered a frame.
    pub unreadable_indices: Vec<u32>,
}

impl CameraRegistry {
    pub fn is_empty(&self) -> bool {
        self.working_indices.is_empty()
    }

    pub fn contains(&self, index: u32) -> bool {
        self.working_indices.contains(&index)
    }

    /// First working index, if any camera answered.
    pub fn first(&self) -> Option<u32> {
        self.working_indices.first().copied()
    }
}

/// Probes indices 0, 1, 2, … until `max_consecutive_failures` opens in a
/// row have failed, or `max_index` is passed.
#[derive(Debug, Clone, Copy)]
pub struct PortScanner {
    pub max_consecutive_failures: u32,
    pub max_index: u32,
}

impl PortScanner {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            max_consecutive_failures: config.max_consecutive_failures,
            max_index: config.max_index,
        }
    }

    pub fn scan(&self, backend: &dyn CameraBackend) -> CameraRegistry {
        let mut registry = CameraRegistry::default();
        let mut failure_run = 0;
        let mut index = 0;

        info!("Scanning {} camera ports", backend.name());

        while failure_run < self.max_consecutive_failures && index <= self.max_index {
            match backend.open(index) {
                Err(e) => {
                    info!("Port {} is not working: {}", index, e);
                    registry.non_working_indices.push(index);
                    failure_run += 1;
                }
                Ok(mut camera) => {
                    failure_run = 0;
                    match camera.read() {
                        FrameRead::Frame(frame) => {
                            info!(
                                "Port {} is working and reads images ({} x {})",
                                index,
                                frame.height(),
                                frame.width()
                            );
                            registry.working_indices.push(index);
                        }
                        FrameRead::EndOfStream => {
                            warn!("Port {} is present but does not read", index);
                            registry.unreadable_indices.push(index);
                        }
                    }
                    camera.close();
                }
            }
            index += 1;
        }

        registry.available_count = registry.working_indices.len();
        info!(
            "Cameras available: {} {:?}",
            registry.available_count, registry.working_indices
        );
        registry
    }
}

/// Scan with the default index ceiling.
pub fn scan(backend: &dyn CameraBackend, max_consecutive_failures: u32) -> CameraRegistry {
    PortScanner {
        max_consecutive_failures,
        max_index: ScanConfig::default().max_index,
    }
    .scan(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::synthetic::{SyntheticBackend, SyntheticPort};

    const WORKING: SyntheticPort = SyntheticPort::Working { frames: None };

    #[test]
    fn halts_after_consecutive_failures() {
        let backend = SyntheticBackend::new(vec![WORKING, WORKING], 4, 4);
        let registry = scan(&backend, 6);

        assert_eq!(registry.working_indices, vec![0, 1]);
        assert_eq!(registry.non_working_indices, vec![2, 3, 4, 5, 6, 7]);
        assert_eq!(registry.available_count, 2);
    }

    #[test]
    fn run_resets_on_an_opened_port() {
        use SyntheticPort::Unopenable;
        let backend = SyntheticBackend::new(
            vec![Unopenable, Unopenable, WORKING, Unopenable, SyntheticPort::Unreadable, WORKING],
            4,
            4,
        );
        let registry = scan(&backend, 3);

        assert_eq!(registry.working_indices, vec![2, 5]);
        assert_eq!(registry.unreadable_indices, vec![4]);
        assert_eq!(registry.non_working_indices, vec![0, 1, 3, 6, 7, 8]);
    }

    #[test]
    fn no_cameras_is_not_an_error() {
        let backend = SyntheticBackend::new(vec![], 4, 4);
        let registry = scan(&backend, 6);

        assert!(registry.is_empty());
        assert_eq!(registry.first(), None);
        assert_eq!(registry.non_working_indices.len(), 6);
    }

    #[test]
    fn probed_handles_are_released() {
        let backend = SyntheticBackend::working(2, 4, 4);
        scan(&backend, 2);
        assert!(!backend.is_open(0));
        assert!(!backend.is_open(1));
    }

    #[test]
    fn index_ceiling_bounds_the_scan() {
        let backend = SyntheticBackend::working(100, 4, 4);
        let registry = PortScanner {
            max_consecutive_failures: 6,
            max_index: 9,
        }
        .scan(&backend);
        assert_eq!(registry.working_indices, (0..=9).collect::<Vec<_>>());
    }
}
