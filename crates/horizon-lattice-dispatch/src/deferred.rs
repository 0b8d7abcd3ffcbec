//! The deferred call: a cancelable unit of work posted to an owner thread.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::task::{CancelableTask, new_runnable_function};

/// Cancels a [`DeferredCall`] from any thread, even after it was posted.
///
/// A call canceled this way never runs. Its bound arguments and callee are
/// released when the queue entry holding it is dropped.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    canceled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Mark the call canceled. Returns `true` if this call flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.canceled.swap(true, Ordering::AcqRel)
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

/// A bound piece of work that runs at most once.
///
/// Running a canceled call does nothing.
pub struct DeferredCall {
    task: Option<Box<dyn CancelableTask>>,
    canceled: Arc<AtomicBool>,
}

impl DeferredCall {
    /// Wrap a task.
    pub fn new<T: CancelableTask + 'static>(task: T) -> Self {
        Self {
            task: Some(Box::new(task)),
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wrap a closure taking no arguments.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(new_runnable_function(f, ()))
    }

    /// A handle that can cancel this call after it has been handed off.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            canceled: Arc::clone(&self.canceled),
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Cancel in place, releasing bound arguments and callee immediately.
    pub fn cancel(&mut self) {
        self.canceled.store(true, Ordering::Release);
        if let Some(mut task) = self.task.take() {
            task.cancel();
        }
    }

    /// Run the call unless it was canceled.
    pub fn run(mut self) {
        if self.is_canceled() {
            return;
        }
        if let Some(task) = self.task.take() {
            task.run();
        }
    }
}

impl fmt::Debug for DeferredCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCall")
            .field("canceled", &self.is_canceled())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callee::Retained;
    use crate::task::new_runnable_method;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_run_executes_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let call = DeferredCall::from_fn(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!call.is_canceled());
        call.run();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_in_place() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut call = DeferredCall::new(new_runnable_method(
            Retained::new(&counter),
            |c: &AtomicUsize, n: usize| {
                c.fetch_add(n, Ordering::SeqCst);
            },
            (4,),
        ));
        assert_eq!(Arc::strong_count(&counter), 2);

        call.cancel();
        assert!(call.is_canceled());
        assert_eq!(Arc::strong_count(&counter), 1);

        call.run();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_handle_from_another_thread() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let call = DeferredCall::from_fn(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        let handle = call.cancel_handle();

        std::thread::spawn(move || {
            assert!(handle.cancel());
            assert!(!handle.cancel());
        })
        .join()
        .unwrap();

        assert!(call.is_canceled());
        call.run();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        // The closure, and its clone of the counter, went away with the call.
        assert_eq!(Arc::strong_count(&counter), 1);
    }
}
