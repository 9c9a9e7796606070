//! Lock-free monitor counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the monitor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    /// Updates installed as target.
    pub accepted: u64,
    /// Targets replaced before the worker took them.
    pub superseded: u64,
    /// Configurations applied and promoted to current.
    pub applied: u64,
    /// Configurations rejected by the filter.
    pub skipped: u64,
    /// Applies that returned an error or panicked.
    pub apply_failures: u64,
    /// Filter or apply panics caught by the worker.
    pub handler_panics: u64,
    /// Times the version counter went back to zero.
    pub version_resets: u64,
    /// Events lost to full subscriber buffers.
    pub dropped_events: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub accepted: AtomicU64,
    pub superseded: AtomicU64,
    pub applied: AtomicU64,
    pub skipped: AtomicU64,
    pub apply_failures: AtomicU64,
    pub handler_panics: AtomicU64,
    pub version_resets: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, dropped_events: u64) -> MonitorStats {
        MonitorStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            apply_failures: self.apply_failures.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            version_resets: self.version_resets.load(Ordering::Relaxed),
            dropped_events,
        }
    }
}
