//! Hang monitoring hooks for the owner thread.
//!
//! The pump brackets every executed entry with
//! [`activity_begin`](HangMonitor::activity_begin) and
//! [`activity_end`](HangMonitor::activity_end), and calls
//! [`suspend`](HangMonitor::suspend) right before it blocks waiting for work,
//! so an idle thread is never mistaken for a hung one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::DEFAULT_HANG_THRESHOLD;
use crate::event::ActivityKind;

/// Receives activity notifications from a pump.
pub trait HangMonitor: Send + Sync {
    /// An entry of the given activity kind is about to run.
    fn activity_begin(&self, activity: ActivityKind);

    /// The entry announced by the last `activity_begin` finished.
    fn activity_end(&self);

    /// The thread is about to block waiting for work.
    fn suspend(&self) {}
}

/// A monitor that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHangMonitor;

impl HangMonitor for NoopHangMonitor {
    fn activity_begin(&self, _activity: ActivityKind) {}

    fn activity_end(&self) {}
}

/// A monitor that logs entries running longer than a threshold.
#[derive(Debug)]
pub struct TracingHangMonitor {
    threshold: Duration,
    started: Mutex<Option<(ActivityKind, Instant)>>,
    hangs: AtomicU64,
}

impl TracingHangMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            started: Mutex::new(None),
            hangs: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Number of entries that exceeded the threshold so far.
    pub fn hang_count(&self) -> u64 {
        self.hangs.load(Ordering::Relaxed)
    }

    /// Whether an entry is currently running.
    pub fn is_active(&self) -> bool {
        self.started.lock().is_some()
    }
}

impl Default for TracingHangMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HANG_THRESHOLD)
    }
}

impl HangMonitor for TracingHangMonitor {
    fn activity_begin(&self, activity: ActivityKind) {
        *self.started.lock() = Some((activity, Instant::now()));
    }

    fn activity_end(&self) {
        let Some((activity, started)) = self.started.lock().take() else {
            return;
        };
        let elapsed = started.elapsed();
        if elapsed >= self.threshold {
            self.hangs.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                target: "horizon_lattice_dispatch::pump",
                ?activity,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                "owner thread hang detected"
            );
        }
    }

    fn suspend(&self) {
        self.started.lock().take();
    }
}
