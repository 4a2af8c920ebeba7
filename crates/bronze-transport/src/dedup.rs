//! Sequence-number deduplication for the push receiver.
//!
//! The platform retries webhook deliveries it considers failed, so the same
//! `sn` can arrive more than once. A frame is dropped when its `sn` was
//! already accepted within the window. Expired entries are evicted by
//! [`DedupWindow::sweep`], which also runs opportunistically once the map
//! grows past a high-water mark.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

/// Default deduplication window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(600);

/// Entry count above which `check_and_record` sweeps before inserting.
pub const HIGH_WATER: usize = 4096;

/// Map from sequence number to the instant it was last accepted.
#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    seen: HashMap<u64, Instant>,
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl DedupWindow {
    /// Creates an empty window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Returns `true` and records `sn` if it was not seen within the window.
    pub fn check_and_record(&mut self, sn: u64, now: Instant) -> bool {
        if let Some(&last) = self.seen.get(&sn)
            && now.saturating_duration_since(last) < self.window
        {
            trace!(sn, "Duplicate frame dropped");
            return false;
        }

        if self.seen.len() >= HIGH_WATER {
            self.sweep(now);
        }
        self.seen.insert(sn, now);
        true
    }

    /// Drops every entry older than the window; returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.seen.len();
        let window = self.window;
        self.seen
            .retain(|_, last| now.saturating_duration_since(*last) < window);
        before - self.seen.len()
    }

    /// Number of tracked sequence numbers.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_within_window_is_rejected() {
        let mut dedup = DedupWindow::default();
        let t0 = Instant::now();
        assert!(dedup.check_and_record(7, t0));
        assert!(!dedup.check_and_record(7, t0 + Duration::from_secs(599)));
        assert!(dedup.check_and_record(7, t0 + Duration::from_secs(601)));
    }

    #[test]
    fn sweep_evicts_expired_entries() {
        let mut dedup = DedupWindow::new(Duration::from_secs(10));
        let t0 = Instant::now();
        dedup.check_and_record(1, t0);
        dedup.check_and_record(2, t0 + Duration::from_secs(8));

        assert_eq!(dedup.sweep(t0 + Duration::from_secs(12)), 1);
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn high_water_triggers_sweep() {
        let mut dedup = DedupWindow::new(Duration::from_secs(1));
        let t0 = Instant::now();
        for sn in 0..HIGH_WATER as u64 {
            dedup.check_and_record(sn, t0);
        }
        assert_eq!(dedup.len(), HIGH_WATER);

        dedup.check_and_record(u64::MAX, t0 + Duration::from_secs(5));
        assert_eq!(dedup.len(), 1);
    }
}
