//! The native event pump driving one owner thread.
//!
//! A [`NativeEventPump`] drains its owner's [`EventQueue`](crate::EventQueue)
//! and, when the queue is empty, gives an optional [`NativeEventSource`] a
//! chance to run before blocking. Native sources have their own notification
//! path; when they get work while the pump is blocked they wake it with
//! [`EventQueue::signal`](crate::EventQueue::signal).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use horizon_lattice_dispatch::{NativeEventPump, OwnerHandle};
//!
//! let owner = OwnerHandle::new("ui");
//! let mut pump = NativeEventPump::new(owner.clone());
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! for _ in 0..3 {
//!     let hits = hits.clone();
//!     owner.post_fn(move || {
//!         hits.fetch_add(1, Ordering::SeqCst);
//!     });
//! }
//!
//! assert_eq!(pump.process_pending(), 3);
//! assert_eq!(hits.load(Ordering::SeqCst), 3);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DispatchConfig;
use crate::event::QueuedEvent;
use crate::logging::{PerfSpan, span_names};
use crate::monitor::{HangMonitor, NoopHangMonitor, TracingHangMonitor};
use crate::owner::OwnerHandle;
use crate::thread_check::ThreadAffinity;

/// A platform event source polled by the pump when its queue runs dry.
pub trait NativeEventSource: Send {
    /// Handle at most one batch of native events without blocking.
    ///
    /// Returns `true` if there was anything to do.
    fn pump_once(&mut self) -> bool;
}

impl<F> NativeEventSource for F
where
    F: FnMut() -> bool + Send,
{
    fn pump_once(&mut self) -> bool {
        self()
    }
}

/// Drains one owner's queue on the owner thread.
///
/// Creating a pump binds the calling thread to the owner. Dropping it tears
/// the owner down: every pending entry is discarded with a warning.
pub struct NativeEventPump {
    owner: OwnerHandle,
    source: Option<Box<dyn NativeEventSource>>,
    monitor: Arc<dyn HangMonitor>,
    affinity: ThreadAffinity,
    idle_poll: Option<Duration>,
    closed: bool,
}

impl NativeEventPump {
    /// Create a pump for `owner`, bound to the calling thread.
    pub fn new(owner: OwnerHandle) -> Self {
        owner.bind_current_thread();
        Self {
            owner,
            source: None,
            monitor: Arc::new(NoopHangMonitor),
            affinity: ThreadAffinity::current(),
            idle_poll: None,
            closed: false,
        }
    }

    /// Create an owner from `config` and a pump for it on the calling thread.
    ///
    /// Entries running longer than the configured hang threshold are logged.
    pub fn with_config(config: &DispatchConfig) -> Self {
        let mut pump = Self::new(OwnerHandle::with_config(config))
            .with_hang_monitor(Arc::new(TracingHangMonitor::new(config.hang_threshold)));
        pump.idle_poll = config.idle_poll;
        pump
    }

    /// Poll `source` whenever the queue is empty.
    pub fn with_native_source<S: NativeEventSource + 'static>(mut self, source: S) -> Self {
        self.set_native_source(source);
        self
    }

    /// Report activity to `monitor`.
    pub fn with_hang_monitor(mut self, monitor: Arc<dyn HangMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Bound each idle wait so the native source is polled periodically.
    pub fn with_idle_poll(mut self, interval: Duration) -> Self {
        self.idle_poll = Some(interval);
        self
    }

    pub fn set_native_source<S: NativeEventSource + 'static>(&mut self, source: S) {
        self.source = Some(Box::new(source));
    }

    pub fn set_hang_monitor(&mut self, monitor: Arc<dyn HangMonitor>) {
        self.monitor = monitor;
    }

    pub fn owner(&self) -> &OwnerHandle {
        &self.owner
    }

    /// Whether the pump has torn its owner down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Process at most one entry.
    ///
    /// Takes the head entry if there is one. Otherwise, with `may_block`, polls
    /// the native source once and, if that had nothing to do either, blocks
    /// until an entry arrives, the queue is signaled, or shutdown begins.
    /// Returns whether anything was processed. Nothing runs once shutdown has
    /// been requested.
    pub fn process_one(&mut self, may_block: bool) -> bool {
        self.affinity
            .debug_assert_same_thread_with_msg("event pump driven from a foreign thread");

        let queue = Arc::clone(self.owner.queue());
        if !queue.is_open() {
            return false;
        }

        let mut event = queue.pop(false);
        if event.is_none() && may_block {
            if let Some(source) = self.source.as_mut() {
                if source.pump_once() {
                    return true;
                }
            }
            self.monitor.suspend();
            event = match self.idle_poll {
                Some(interval) => queue.pop_timeout(interval),
                None => queue.pop(true),
            };
        }

        let Some(event) = event else {
            return false;
        };
        if !queue.is_open() {
            self.discard(event);
            return false;
        }
        self.run_event(event);
        true
    }

    /// Process every entry that is ready without blocking.
    ///
    /// Returns the number of entries run.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while self.process_one(false) {
            processed += 1;
        }
        processed
    }

    /// Pump until the owner is shut down, then tear it down.
    ///
    /// Returns the number of entries discarded at teardown.
    pub fn run(&mut self) -> usize {
        let _span = tracing::debug_span!(
            target: "horizon_lattice_dispatch::pump",
            "pump",
            operation = span_names::PUMP,
            owner = %self.owner.name()
        )
        .entered();
        tracing::debug!(target: "horizon_lattice_dispatch::pump", "pump started");

        while self.owner.queue().is_open() {
            self.process_one(true);
        }
        self.close()
    }

    /// Tear the owner down.
    ///
    /// Requests shutdown, marks the owner gone so synchronous callers are
    /// released, closes the queue and discards whatever is left in it.
    /// Returns the number of discarded entries; later calls return 0.
    pub fn close(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;

        self.owner.shutdown();
        self.owner.mark_gone();
        let leftovers = self.owner.queue().close();
        let discarded = leftovers.len();
        for event in leftovers {
            self.discard(event);
        }
        tracing::debug!(
            target: "horizon_lattice_dispatch::pump",
            owner = %self.owner.name(),
            discarded,
            "pump closed"
        );
        discarded
    }

    fn run_event(&self, event: QueuedEvent) {
        let activity = event.activity();
        let _span = PerfSpan::for_event(event.kind(), activity);
        self.monitor.activity_begin(activity);
        event.run();
        self.monitor.activity_end();
    }

    fn discard(&self, event: QueuedEvent) {
        tracing::warn!(
            target: "horizon_lattice_dispatch::pump",
            owner = %self.owner.name(),
            kind = %event.kind(),
            "Discarded event on shutdown"
        );
        drop(event);
    }
}

impl Drop for NativeEventPump {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for NativeEventPump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEventPump")
            .field("owner", &self.owner)
            .field("has_native_source", &self.source.is_some())
            .field("idle_poll", &self.idle_poll)
            .field("closed", &self.closed)
            .finish()
    }
}
