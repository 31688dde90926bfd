use std::time::{Duration, SystemTime};

/// What the debouncer decided for one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Save a snapshot; the cooldown restarts at this detection.
    Save,
    /// Inside the cooldown window of the previous save.
    Suppressed,
    /// Nothing was detected, state unchanged.
    Idle,
}

/// Cooldown between detection-triggered snapshots.
///
/// Owned by exactly one capture loop. Each camera stream needs its own
/// instance, otherwise a detection on one camera would mute another.
#[derive(Debug, Clone)]
pub struct Debouncer {
    cooldown: Duration,
    last_saved: Option<SystemTime>,
}

impl Debouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_saved: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_saved(&self) -> Option<SystemTime> {
        self.last_saved
    }

    pub fn observe(&mut self, detected: bool, at: SystemTime) -> Decision {
        if !detected {
            return Decision::Idle;
        }

        let qualified = match self.last_saved {
            None => true,
            // A clock that stepped backwards counts as "long enough ago".
            Some(last) => at
                .duration_since(last)
                .map_or(true, |elapsed| elapsed >= self.cooldown),
        };

        if qualified {
            self.last_saved = Some(at);
            Decision::Save
        } else {
            Decision::Suppressed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn qualified(cooldown: u64, times: &[u64]) -> Vec<u64> {
        let mut debouncer = Debouncer::new(Duration::from_secs(cooldown));
        times
            .iter()
            .copied()
            .filter(|&t| debouncer.observe(true, at(t)) == Decision::Save)
            .collect()
    }

    #[test]
    fn saves_once_per_cooldown_window() {
        assert_eq!(qualified(5, &[0, 2, 4, 6, 11]), vec![0, 6, 11]);
    }

    #[test]
    fn exact_cooldown_boundary_qualifies() {
        assert_eq!(qualified(5, &[0, 5, 9, 10]), vec![0, 5, 10]);
    }

    #[test]
    fn first_detection_always_saves() {
        assert_eq!(qualified(3600, &[42]), vec![42]);
    }

    #[test]
    fn no_detection_leaves_state_alone() {
        let mut debouncer = Debouncer::new(Duration::from_secs(5));
        assert_eq!(debouncer.observe(false, at(0)), Decision::Idle);
        assert_eq!(debouncer.last_saved(), None);

        assert_eq!(debouncer.observe(true, at(1)), Decision::Save);
        assert_eq!(debouncer.observe(false, at(10)), Decision::Idle);
        assert_eq!(debouncer.last_saved(), Some(at(1)));
    }

    #[test]
    fn backwards_clock_qualifies() {
        let mut debouncer = Debouncer::new(Duration::from_secs(5));
        assert_eq!(debouncer.observe(true, at(100)), Decision::Save);
        assert_eq!(debouncer.observe(true, at(50)), Decision::Save);
        assert_eq!(debouncer.last_saved(), Some(at(50)));
        assert_eq!(debouncer.observe(true, at(52)), Decision::Suppressed);
    }
}
