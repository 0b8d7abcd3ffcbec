//! Synchronous cross-thread calls.
//!
//! [`OwnerHandle::sync_run`] posts a call to an owner and blocks until the
//! owner has run it, or until the owner shuts down first. The call is wrapped
//! in a completion tracker that re-checks the owner's liveness on the owner
//! thread before running anything, so a caller released by shutdown can rely
//! on its call never starting afterwards.
//!
//! Each caller gets its own completion status; concurrent callers share only
//! the owner's liveness lock and condition. Every status change happens under
//! that lock, and the caller checks the status under it before each wait, so
//! no wake-up is lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::deferred::DeferredCall;
use crate::event::{EventKind, QueuedEvent};
use crate::logging::span_names;
use crate::owner::{Liveness, OwnerHandle};
use crate::queue::Rejected;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETED: u8 = 2;
const ABANDONED: u8 = 3;

/// How a synchronous call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The owner ran the call.
    Completed,
    /// The owner no longer executes entries; nothing was posted.
    OwnerGone,
    /// The owner shut down before the call started; it will never run.
    ShutDown,
}

impl SyncOutcome {
    pub fn is_completed(self) -> bool {
        self == SyncOutcome::Completed
    }
}

/// Tracks one synchronous call on the owner side.
///
/// Dropping it without settling, as happens when the wrapper is discarded at
/// teardown, marks the call abandoned and wakes the caller.
struct CallCompletion {
    liveness: Arc<Liveness>,
    status: Arc<AtomicU8>,
    settled: bool,
}

impl CallCompletion {
    fn run(mut self, call: DeferredCall) {
        {
            let state = self.liveness.state.lock();
            if !state.is_live() {
                drop(state);
                self.settle(ABANDONED);
                return;
            }
            self.status.store(RUNNING, Ordering::Release);
        }
        // The lock is not held while the call runs, so the call may itself post,
        // make synchronous calls or shut the owner down.
        call.run();
        self.settle(COMPLETED);
    }

    fn settle(&mut self, status: u8) {
        let _state = self.liveness.state.lock();
        self.status.store(status, Ordering::Release);
        self.settled = true;
        self.liveness.finished.notify_all();
    }
}

impl Drop for CallCompletion {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(ABANDONED);
        }
    }
}

impl OwnerHandle {
    /// Run `call` on the owner thread and wait for it.
    ///
    /// Called on the owner thread itself, the call runs inline. Otherwise it is
    /// posted as a [`EventKind::General`] entry that is never coalesced away,
    /// and the caller blocks until one of the following happens:
    ///
    /// - the owner ran the call ([`SyncOutcome::Completed`])
    /// - the owner shut down before starting it ([`SyncOutcome::ShutDown`])
    ///
    /// Once the owner has started the call, the caller waits for it to finish
    /// even if shutdown is requested meanwhile.
    pub fn sync_run(&self, call: DeferredCall) -> SyncOutcome {
        if self.is_current() {
            {
                let state = self.liveness().state.lock();
                if !state.alive {
                    return SyncOutcome::OwnerGone;
                }
                if state.quit {
                    return SyncOutcome::ShutDown;
                }
            }
            call.run();
            return SyncOutcome::Completed;
        }

        let _span = tracing::trace_span!(
            target: "horizon_lattice_dispatch::sync",
            "sync_call",
            operation = span_names::SYNC_CALL,
            owner = %self.name()
        )
        .entered();

        let liveness = Arc::clone(self.liveness());
        {
            let state = liveness.state.lock();
            if !state.alive {
                tracing::debug!(
                    target: "horizon_lattice_dispatch::sync",
                    owner = %self.name(),
                    "synchronous call to departed owner skipped"
                );
                return SyncOutcome::OwnerGone;
            }
            if state.quit {
                return SyncOutcome::ShutDown;
            }
        }

        let status = Arc::new(AtomicU8::new(PENDING));
        let completion = CallCompletion {
            liveness: Arc::clone(&liveness),
            status: Arc::clone(&status),
            settled: false,
        };
        let wrapper =
            QueuedEvent::from_fn(EventKind::General, move || completion.run(call)).pinned();

        if let Err(Rejected(wrapper)) = self.queue().try_post(wrapper) {
            // Dropping the wrapper settles it as abandoned.
            drop(wrapper);
            return SyncOutcome::OwnerGone;
        }

        let mut state = liveness.state.lock();
        loop {
            match status.load(Ordering::Acquire) {
                COMPLETED => return SyncOutcome::Completed,
                ABANDONED => return SyncOutcome::ShutDown,
                RUNNING => {}
                _ => {
                    if !state.is_live() {
                        tracing::debug!(
                            target: "horizon_lattice_dispatch::sync",
                            owner = %self.name(),
                            "synchronous caller released by shutdown"
                        );
                        return SyncOutcome::ShutDown;
                    }
                }
            }
            liveness.finished.wait(&mut state);
        }
    }

    /// Run a closure on the owner thread and wait for it.
    pub fn sync_run_fn<F>(&self, f: F) -> SyncOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        self.sync_run(DeferredCall::from_fn(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    /// Drain `owner`'s queue on a helper thread until it shuts down.
    fn spawn_consumer(owner: OwnerHandle) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            owner.bind_current_thread();
            while let Some(event) = owner.queue().pop(true) {
                event.run();
            }
        })
    }

    #[test]
    fn test_sync_run_completes() {
        let owner = OwnerHandle::new("sync-complete");
        let consumer = spawn_consumer(owner.clone());

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let outcome = owner.sync_run_fn(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(outcome, SyncOutcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        owner.shutdown();
        consumer.join().unwrap();
    }

    #[test]
    fn test_sync_run_on_owner_thread_runs_inline() {
        let owner = OwnerHandle::new("inline");
        owner.bind_current_thread();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let outcome = owner.sync_run_fn(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(outcome.is_completed());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(owner.queue().is_empty());
    }

    #[test]
    fn test_sync_run_against_gone_owner() {
        let owner = OwnerHandle::new("gone");
        owner.mark_gone();
        let outcome = owner.sync_run_fn(|| unreachable!());
        assert_eq!(outcome, SyncOutcome::OwnerGone);
        assert!(owner.queue().is_empty());
    }

    #[test]
    fn test_sync_run_against_shut_down_owner() {
        let owner = OwnerHandle::new("shut");
        owner.shutdown();
        assert_eq!(owner.sync_run_fn(|| {}), SyncOutcome::ShutDown);
    }

    #[test]
    fn test_shutdown_releases_waiting_caller() {
        let owner = OwnerHandle::new("never-pumped");
        let ran = Arc::new(AtomicUsize::new(0));

        let caller = {
            let owner = owner.clone();
            let ran = ran.clone();
            thread::spawn(move || {
                owner.sync_run_fn(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
            })
        };

        while owner.queue().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        owner.shutdown();

        assert_eq!(caller.join().unwrap(), SyncOutcome::ShutDown);

        // The abandoned wrapper never runs its payload, even if popped later.
        let wrapper = owner.queue().pop(false).unwrap();
        wrapper.run();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_discarded_wrapper_releases_caller() {
        let owner = OwnerHandle::new("discarded");
        let caller = {
            let owner = owner.clone();
            thread::spawn(move || owner.sync_run_fn(|| {}))
        };

        while owner.queue().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        // Close without marking the owner gone: only the drop wakes the caller.
        drop(owner.queue().close());

        assert_eq!(caller.join().unwrap(), SyncOutcome::ShutDown);
    }

    #[test]
    fn test_wrapper_survives_general_coalescing() {
        let config = crate::config::DispatchConfigBuilder::new()
            .name("coalescing-general")
            .coalescing_rules(
                crate::event::CoalescingRules::default()
                    .with_policy(EventKind::General, crate::event::CoalescePolicy::Stream),
            )
            .build()
            .unwrap();
        let owner = OwnerHandle::with_config(&config);
        let ran = Arc::new(AtomicUsize::new(0));

        let caller = {
            let owner = owner.clone();
            let ran = ran.clone();
            thread::spawn(move || {
                owner.sync_run_fn(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
            })
        };

        while owner.queue().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        // A later general post must not replace the pending wrapper.
        owner.post_fn(|| {});
        assert_eq!(owner.queue().len(), 2);

        let consumer = spawn_consumer(owner.clone());
        assert_eq!(caller.join().unwrap(), SyncOutcome::Completed);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(owner.is_alive());

        owner.shutdown();
        consumer.join().unwrap();
    }

    #[test]
    fn test_started_call_finishes_before_caller_returns() {
        let owner = OwnerHandle::new("started");
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let finished = Arc::new(AtomicUsize::new(0));

        let consumer = spawn_consumer(owner.clone());
        let caller = {
            let owner = owner.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                let finished_in_call = finished.clone();
                let outcome = owner.sync_run_fn(move || {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(30));
                    finished_in_call.fetch_add(1, Ordering::SeqCst);
                });
                (outcome, finished.load(Ordering::SeqCst))
            })
        };

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        owner.shutdown();

        let (outcome, finished_at_return) = caller.join().unwrap();
        assert_eq!(outcome, SyncOutcome::Completed);
        assert_eq!(finished_at_return, 1);
        consumer.join().unwrap();
    }
}
