//! Byte-based progress for one run

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Running byte counter against the sizing-pass total.
///
/// Workers add bytes concurrently; publication goes through one lock so the
/// percentages observed by listeners never decrease.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: AtomicU64,
    done: AtomicU64,
    last: Mutex<Option<u8>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Denominator from the sizing pass
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::SeqCst)
    }

    /// Add processed bytes; returns the resulting percentage
    pub fn add(&self, bytes: u64) -> u8 {
        let done = self
            .done
            .fetch_add(bytes, Ordering::SeqCst)
            .saturating_add(bytes);
        percent_of(done, self.total())
    }

    /// Current percentage
    pub fn percent(&self) -> u8 {
        percent_of(self.done(), self.total())
    }

    /// Last percentage handed to a publisher, if any
    pub fn last_published(&self) -> Option<u8> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call `publish` with `percent` if it is above everything published so far.
    pub fn publish_if_advanced(&self, percent: u8, publish: impl FnOnce(u8)) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.map_or(true, |previous| percent > previous) {
            *last = Some(percent);
            publish(percent);
            true
        } else {
            false
        }
    }
}

/// `round(done * 100 / total)`, clamped to 100; a zero total counts as complete.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let total = u128::from(total);
    let scaled = (u128::from(done) * 100 + total / 2) / total;
    scaled.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_and_clamps() {
        assert_eq!(percent_of(0, 0), 100);
        assert_eq!(percent_of(0, 15), 0);
        assert_eq!(percent_of(5, 15), 33);
        assert_eq!(percent_of(10, 15), 67);
        assert_eq!(percent_of(15, 15), 100);
        assert_eq!(percent_of(40, 15), 100);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_add_accumulates() {
        let tracker = ProgressTracker::new();
        tracker.set_total(200);
        assert_eq!(tracker.add(50), 25);
        assert_eq!(tracker.add(50), 50);
        assert_eq!(tracker.done(), 100);
        assert_eq!(tracker.percent(), 50);
    }

    #[test]
    fn test_publication_never_goes_backwards() {
        let tracker = ProgressTracker::new();
        let mut seen = Vec::new();

        for percent in [0, 10, 10, 5, 60, 100, 100] {
            tracker.publish_if_advanced(percent, |p| seen.push(p));
        }

        assert_eq!(seen, vec![0, 10, 60, 100]);
        assert_eq!(tracker.last_published(), Some(100));
    }
}
