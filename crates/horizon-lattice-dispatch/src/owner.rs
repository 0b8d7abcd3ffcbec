//! Owner handles and the process-wide shutdown broadcast.
//!
//! An [`OwnerHandle`] names one owner thread: its event queue plus the
//! liveness state that synchronous callers wait on. Handles are cheap to clone
//! and are what producers hold on to; there is no global "current owner".
//!
//! Liveness moves through two one-way flags:
//!
//! - `quit` is raised by [`OwnerHandle::shutdown`]. The queue moves to
//!   [`QueueState::ShuttingDown`](crate::QueueState::ShuttingDown) and every
//!   blocked synchronous caller is woken.
//! - `alive` is cleared by the pump once it has stopped executing entries.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use parking_lot::{Condvar, Mutex};

use crate::config::DispatchConfig;
use crate::deferred::DeferredCall;
use crate::event::{EventKind, QueuedEvent};
use crate::queue::EventQueue;

#[derive(Debug)]
pub(crate) struct LivenessState {
    pub(crate) alive: bool,
    pub(crate) quit: bool,
}

impl LivenessState {
    pub(crate) fn is_live(&self) -> bool {
        self.alive && !self.quit
    }
}

/// Liveness flags and the condition synchronous callers wait on.
///
/// Kept apart from the owner itself so queued entries can refer to it without
/// keeping the queue alive.
#[derive(Debug)]
pub(crate) struct Liveness {
    pub(crate) state: Mutex<LivenessState>,
    pub(crate) finished: Condvar,
}

impl Liveness {
    fn new() -> Self {
        Self {
            state: Mutex::new(LivenessState {
                alive: true,
                quit: false,
            }),
            finished: Condvar::new(),
        }
    }
}

pub(crate) struct OwnerShared {
    name: String,
    queue: Arc<EventQueue>,
    liveness: Arc<Liveness>,
    thread: Mutex<Option<ThreadId>>,
}

/// A cloneable handle to one owner thread and its queue.
#[derive(Clone)]
pub struct OwnerHandle {
    shared: Arc<OwnerShared>,
}

impl OwnerHandle {
    /// Create an owner with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(&DispatchConfig::with_name(name))
    }

    /// Create an owner whose queue follows `config`.
    pub fn with_config(config: &DispatchConfig) -> Self {
        Self {
            shared: Arc::new(OwnerShared {
                name: config.name.clone(),
                queue: Arc::new(EventQueue::with_config(config)),
                liveness: Arc::new(Liveness::new()),
                thread: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The owner's event queue.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.shared.queue
    }

    /// Post an entry to the owner. Returns `false` if the queue is closed.
    pub fn post(&self, event: QueuedEvent) -> bool {
        self.shared.queue.post(event)
    }

    /// Post a deferred call as an entry of the given kind.
    pub fn post_call(&self, kind: EventKind, call: DeferredCall) -> bool {
        self.post(QueuedEvent::new(kind, call))
    }

    /// Post a closure as a general entry.
    pub fn post_fn<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(QueuedEvent::general(f))
    }

    /// Whether the owner still executes entries and has not been asked to quit.
    pub fn is_alive(&self) -> bool {
        self.shared.liveness.state.lock().is_live()
    }

    /// Whether [`shutdown`](Self::shutdown) has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.liveness.state.lock().quit
    }

    /// Whether the calling thread is the one bound to this owner.
    pub fn is_current(&self) -> bool {
        *self.shared.thread.lock() == Some(std::thread::current().id())
    }

    /// The thread currently bound to this owner, if any.
    pub fn thread_id(&self) -> Option<ThreadId> {
        *self.shared.thread.lock()
    }

    /// Bind the calling thread as this owner's thread.
    ///
    /// Done by [`NativeEventPump::new`](crate::NativeEventPump::new); only one
    /// thread should ever drain a queue.
    pub fn bind_current_thread(&self) {
        let current = std::thread::current().id();
        let previous = self.shared.thread.lock().replace(current);
        if previous.is_some_and(|id| id != current) {
            crate::dispatch_warn!(owner = %self.shared.name, "owner rebound to a different thread");
        }
    }

    /// Ask the owner to stop.
    ///
    /// Raises the quit flag, wakes every blocked synchronous caller and moves
    /// the queue to shutting down. Pending entries stay queued until the pump
    /// discards them.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.liveness.state.lock();
            if !state.quit {
                state.quit = true;
                tracing::debug!(
                    target: "horizon_lattice_dispatch::owner",
                    owner = %self.shared.name,
                    "owner shutdown requested"
                );
            }
            self.shared.liveness.finished.notify_all();
        }
        self.shared.queue.shutdown();
    }

    /// Record that the owner no longer executes entries.
    pub(crate) fn mark_gone(&self) {
        let mut state = self.shared.liveness.state.lock();
        state.alive = false;
        self.shared.liveness.finished.notify_all();
    }

    pub(crate) fn liveness(&self) -> &Arc<Liveness> {
        &self.shared.liveness
    }

    fn downgrade(&self) -> Weak<OwnerShared> {
        Arc::downgrade(&self.shared)
    }

    /// Whether two handles refer to the same owner.
    pub fn same_owner(&self, other: &OwnerHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for OwnerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerHandle")
            .field("name", &self.shared.name)
            .field("queue", &self.shared.queue.state())
            .field("pending", &self.shared.queue.len())
            .finish()
    }
}

/// A one-shot broadcast that shuts down every subscribed owner.
///
/// Owners subscribing after the signal fired are shut down immediately.
#[derive(Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    owners: Mutex<Vec<Weak<OwnerShared>>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shut `owner` down when the signal fires.
    pub fn subscribe(&self, owner: &OwnerHandle) {
        let mut owners = self.owners.lock();
        if self.triggered.load(Ordering::Acquire) {
            drop(owners);
            owner.shutdown();
            return;
        }
        owners.retain(|weak| weak.strong_count() > 0);
        owners.push(owner.downgrade());
    }

    /// Fire the signal. Returns `false` if it had already fired.
    pub fn trigger(&self) -> bool {
        let owners = {
            let mut owners = self.owners.lock();
            if self.triggered.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *owners)
        };

        let mut notified = 0usize;
        for shared in owners.iter().filter_map(Weak::upgrade) {
            OwnerHandle { shared }.shutdown();
            notified += 1;
        }
        tracing::info!(
            target: "horizon_lattice_dispatch::owner",
            owners = notified,
            "process shutdown broadcast"
        );
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Number of live owners waiting on the signal.
    pub fn subscriber_count(&self) -> usize {
        self.owners
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("triggered", &self.is_triggered())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
