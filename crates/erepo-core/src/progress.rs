//! Logarithmic progress throttle shared by ingestion and redo draining.

use crate::primitives::INITIAL_PROGRESS_INTERVAL;

/// Decides when a running count deserves a progress report.
///
/// Reports fire on multiples of the current interval. The interval grows
/// tenfold once the count exceeds ten times the interval, so a large run
/// reports early and often, then less and less.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressInterval {
    interval: u64,
}

impl Default for ProgressInterval {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressInterval {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_initial(INITIAL_PROGRESS_INTERVAL)
    }

    /// Start from a custom interval (zero is treated as one).
    #[must_use]
    pub const fn with_initial(interval: u64) -> Self {
        Self {
            interval: if interval == 0 { 1 } else { interval },
        }
    }

    #[must_use]
    pub const fn current(&self) -> u64 {
        self.interval
    }

    /// Observe the running count. Returns `true` when a report is due.
    pub fn tick(&mut self, count: u64) -> bool {
        if count > self.interval.saturating_mul(10) {
            self.interval = self.interval.saturating_mul(10);
        }
        count > 0 && count % self.interval == 0
    }
}
