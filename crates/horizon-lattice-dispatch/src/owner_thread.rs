//! Dedicated owner threads.
//!
//! An [`OwnerThread`] spawns a named thread that creates a
//! [`NativeEventPump`] for a fresh owner and runs it until the owner is shut
//! down. This is how controller threads are usually set up.
//!
//! # Example
//!
//! ```
//! use horizon_lattice_dispatch::{DispatchConfig, OwnerThread, SyncOutcome};
//!
//! let controller = OwnerThread::spawn(DispatchConfig::with_name("controller")).unwrap();
//!
//! let outcome = controller.handle().sync_run_fn(|| {
//!     assert_eq!(std::thread::current().name(), Some("controller"));
//! });
//! assert_eq!(outcome, SyncOutcome::Completed);
//!
//! controller.shutdown_and_join().unwrap();
//! ```

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use parking_lot::Mutex;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};
use crate::monitor::TracingHangMonitor;
use crate::owner::OwnerHandle;
use crate::pump::NativeEventPump;

/// A thread running a pump for its own owner.
pub struct OwnerThread {
    owner: OwnerHandle,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl OwnerThread {
    /// Spawn an owner thread configured by `config`.
    pub fn spawn(config: DispatchConfig) -> Result<Self> {
        Self::spawn_with(config, |_| {})
    }

    /// Spawn an owner thread, running `setup` on the new pump before it starts.
    ///
    /// `setup` runs on the owner thread and can install a native source or a
    /// different hang monitor. This returns once `setup` has finished, so the
    /// owner is bound to its thread by the time the caller sees the handle.
    pub fn spawn_with<S>(config: DispatchConfig, setup: S) -> Result<Self>
    where
        S: FnOnce(&mut NativeEventPump) + Send + 'static,
    {
        config.validate()?;

        let owner = OwnerHandle::with_config(&config);
        let thread_owner = owner.clone();
        let (ready_sender, ready_receiver) = bounded(1);

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let hang_threshold = config.hang_threshold;
        let idle_poll = config.idle_poll;
        let handle = builder
            .spawn(move || {
                let mut pump = NativeEventPump::new(thread_owner)
                    .with_hang_monitor(Arc::new(TracingHangMonitor::new(hang_threshold)));
                if let Some(interval) = idle_poll {
                    pump = pump.with_idle_poll(interval);
                }
                setup(&mut pump);
                let _ = ready_sender.send(());

                let discarded = pump.run();
                if discarded > 0 {
                    crate::dispatch_debug!(discarded, "owner thread exiting with discarded entries");
                }
            })
            .map_err(|source| DispatchError::thread_spawn(config.name.clone(), source))?;

        if ready_receiver.recv().is_err() {
            // The thread died during setup; its pump already tore the owner down.
            let _ = handle.join();
            return Err(DispatchError::OwnerGone);
        }

        tracing::info!(
            target: "horizon_lattice_dispatch::owner",
            owner = %config.name,
            "owner thread started"
        );

        Ok(Self {
            owner,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// A handle for posting to this thread.
    pub fn handle(&self) -> &OwnerHandle {
        &self.owner
    }

    pub fn name(&self) -> &str {
        self.owner.name()
    }

    /// Whether the thread has exited, or was already joined.
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    /// Ask the owner to stop. Does not wait for the thread to exit.
    pub fn shutdown(&self) {
        self.owner.shutdown();
    }

    /// Wait for the thread to exit.
    ///
    /// Call [`shutdown`](Self::shutdown) first, or arrange for it to happen.
    /// Joining twice is a no-op.
    pub fn join(&self) -> Result<()> {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| DispatchError::OwnerPanicked {
                name: self.owner.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Shut the owner down and wait for the thread to exit.
    pub fn shutdown_and_join(&self) -> Result<()> {
        self.shutdown();
        self.join()
    }
}

impl Drop for OwnerThread {
    fn drop(&mut self) {
        self.shutdown();
        // Don't block in drop - just request shutdown
    }
}

impl fmt::Debug for OwnerThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerThread")
            .field("owner", &self.owner)
            .field("finished", &self.is_finished())
            .finish()
    }
}
