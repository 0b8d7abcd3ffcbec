//! Cross-thread deferred calls and native event dispatch for Horizon Lattice.
//!
//! This crate provides the plumbing that moves work between threads:
//!
//! - **Deferred calls**: bound, cancelable units of work ([`DeferredCall`]),
//!   with callee lifetime policies ([`Retained`], [`Unretained`]) and bulk
//!   revocation through [`ScopedTaskFactory`]
//! - **Event queue**: a per-owner FIFO with per-kind coalescing ([`EventQueue`])
//! - **Native event pump**: drains a queue on its owner thread and polls the
//!   platform's own event source when idle ([`NativeEventPump`])
//! - **Synchronous calls**: run something on another owner and wait, without
//!   hanging when that owner shuts down ([`OwnerHandle::sync_run`])
//! - **Controller redirection**: route input to a controller thread without
//!   blocking the caller ([`ControllerRedirector`])
//!
//! # Posting Example
//!
//! ```
//! use horizon_lattice_dispatch::{DispatchConfig, OwnerThread, SyncOutcome};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let worker = OwnerThread::spawn(DispatchConfig::with_name("worker")).unwrap();
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..3 {
//!     let hits = hits.clone();
//!     worker.handle().post_fn(move || {
//!         hits.fetch_add(1, Ordering::SeqCst);
//!     });
//! }
//!
//! // Entries run in posting order, so this returns after the three above.
//! assert_eq!(worker.handle().sync_run_fn(|| {}), SyncOutcome::Completed);
//! assert_eq!(hits.load(Ordering::SeqCst), 3);
//!
//! worker.shutdown_and_join().unwrap();
//! ```
//!
//! # Revocation Example
//!
//! ```
//! use horizon_lattice_dispatch::{EventKind, NativeEventPump, OwnerHandle, ScopedTaskFactory};
//! use horizon_lattice_dispatch::task::RunnableFunction;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let owner = OwnerHandle::new("ui");
//! let mut pump = NativeEventPump::new(owner.clone());
//! let factory = ScopedTaskFactory::new();
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..3 {
//!     let hits = hits.clone();
//!     let bump = move || {
//!         hits.fetch_add(1, Ordering::SeqCst);
//!     };
//!     owner.post_call(EventKind::General, factory.new_call(RunnableFunction::new(bump, ())));
//! }
//!
//! // Revoking turns every queued call into a no-op.
//! factory.revoke_all();
//! assert_eq!(pump.process_pending(), 3);
//! assert_eq!(hits.load(Ordering::SeqCst), 0);
//! ```

pub mod callee;
pub mod config;
pub mod deferred;
mod error;
pub mod event;
pub mod logging;
pub mod monitor;
pub mod owner;
pub mod owner_thread;
pub mod pump;
pub mod queue;
pub mod redirect;
pub mod revocable;
pub mod sync_call;
pub mod task;
pub mod thread_check;

pub use callee::{CalleeBinding, Retained, Unretained};
pub use config::{DispatchConfig, DispatchConfigBuilder};
pub use deferred::{CancelHandle, DeferredCall};
pub use error::{DispatchError, Result};
pub use event::{
    ActivityKind, CoalescePolicy, CoalescingRules, EventKind, MotionAction, MotionSample,
    QueuedEvent,
};
pub use logging::{PerfSpan, QueueSnapshot};
pub use monitor::{HangMonitor, NoopHangMonitor, TracingHangMonitor};
pub use owner::{OwnerHandle, ShutdownSignal};
pub use owner_thread::OwnerThread;
pub use pump::{NativeEventPump, NativeEventSource};
pub use queue::{EventQueue, Posted, QueueState, Rejected};
pub use redirect::{
    ControllerRedirector, ControllerResult, DispatchOutcome, EventStatus, InputController,
};
pub use revocable::{Revocable, RevocableStore, ScopedTask, ScopedTaskFactory};
pub use sync_call::SyncOutcome;
pub use task::{CancelableTask, DropTask, Task};
pub use thread_check::ThreadAffinity;

static_assertions::assert_impl_all!(EventQueue: Send, Sync);
static_assertions::assert_impl_all!(OwnerHandle: Send, Sync);
static_assertions::assert_impl_all!(ShutdownSignal: Send, Sync);
static_assertions::assert_impl_all!(OwnerThread: Send, Sync);
static_assertions::assert_impl_all!(DeferredCall: Send);
static_assertions::assert_impl_all!(NativeEventPump: Send);
