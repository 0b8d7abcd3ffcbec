//! Owner thread affinity checks.
//!
//! Queue entries only ever run on the thread that owns the queue. The pump
//! records that thread in a [`ThreadAffinity`] when it is created and checks
//! it whenever it is driven:
//!
//! ```
//! use horizon_lattice_dispatch::thread_check::ThreadAffinity;
//!
//! let affinity = ThreadAffinity::current();
//! assert!(affinity.is_same_thread());
//!
//! let elsewhere = std::thread::spawn(move || affinity.is_same_thread())
//!     .join()
//!     .unwrap();
//! assert!(!elsewhere);
//! ```
//!
//! [`ThreadAffinity::assert_same_thread_with_msg`] always checks;
//! [`ThreadAffinity::debug_assert_same_thread_with_msg`], which the pump uses,
//! compiles to nothing in release builds.

use std::thread::ThreadId;

/// Records the thread an owner is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl ThreadAffinity {
    /// Bind to the calling thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// Check if the calling thread is the bound thread.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Assert that we are on the bound thread, with a custom message.
    ///
    /// # Panics
    ///
    /// Panics if called from a different thread.
    pub fn assert_same_thread_with_msg(&self, msg: &str) {
        if !self.is_same_thread() {
            self.panic_wrong_thread(msg);
        }
    }

    /// Debug-only assertion with a custom message.
    #[inline]
    pub fn debug_assert_same_thread_with_msg(&self, msg: &str) {
        #[cfg(debug_assertions)]
        self.assert_same_thread_with_msg(msg);
    }

    #[cold]
    #[inline(never)]
    fn panic_wrong_thread(&self, msg: &str) -> ! {
        let current = std::thread::current();
        let current_name = current.name().unwrap_or("<unnamed>");
        let current_id = current.id();

        panic!(
            "\n\
            ══════════════════════════════════════════════════════════════════════\n\
            OWNER THREAD VIOLATION\n\
            ══════════════════════════════════════════════════════════════════════\n\
            \n\
            {msg}\n\
            \n\
            Owner thread: {:?}\n\
            Current thread: \"{current_name}\" (ID: {current_id:?})\n\
            \n\
            Event queues are drained only by the thread that owns them. Other\n\
            threads hand work over instead:\n\
            \n\
            1. OwnerHandle::post() to run it asynchronously\n\
            2. OwnerHandle::sync_run() to run it and wait for completion\n\
            \n\
            ══════════════════════════════════════════════════════════════════════",
            self.thread_id
        )
    }
}
