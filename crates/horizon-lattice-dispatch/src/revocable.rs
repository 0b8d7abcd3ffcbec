//! Bulk revocation of deferred calls.
//!
//! A [`ScopedTaskFactory`] is typically owned by the object whose methods the
//! tasks call. Dropping the factory, or calling
//! [`revoke_all`](ScopedTaskFactory::revoke_all), turns every task it produced
//! so far into a no-op. Tasks produced afterwards are unaffected.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::callee::CalleeBinding;
use crate::deferred::DeferredCall;
use crate::task::{
    Callable, CancelableTask, MethodCallable, RunnableFunction, RunnableMethod, Task,
};

/// Issues [`Revocable`] tokens that can all be revoked at once.
///
/// Each generation of tokens shares one flag. Revoking flips that flag and
/// starts a new generation.
#[derive(Debug)]
pub struct RevocableStore {
    current: Mutex<Arc<AtomicBool>>,
}

impl RevocableStore {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(AtomicBool::new(false))),
        }
    }

    /// A token tied to the current generation.
    pub fn token(&self) -> Revocable {
        Revocable {
            revoked: self.current.lock().clone(),
        }
    }

    /// Revoke every token issued so far.
    pub fn revoke_all(&self) {
        let mut current = self.current.lock();
        current.store(true, Ordering::Release);
        *current = Arc::new(AtomicBool::new(false));
    }

    /// Number of live tokens from the current generation.
    pub fn pending(&self) -> usize {
        let current = self.current.lock();
        Arc::strong_count(&*current) - 1
    }

    /// Whether no tokens from the current generation are alive.
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }
}

impl Default for RevocableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RevocableStore {
    fn drop(&mut self) {
        self.current.get_mut().store(true, Ordering::Release);
    }
}

/// A token that reports whether its store revoked it.
#[derive(Debug, Clone)]
pub struct Revocable {
    revoked: Arc<AtomicBool>,
}

impl Revocable {
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }
}

/// Wraps a task so it only runs while its token is unrevoked.
pub struct ScopedTask<T: ?Sized> {
    revocable: Revocable,
    inner: Box<T>,
}

impl<T: Task> ScopedTask<T> {
    pub fn new(revocable: Revocable, inner: T) -> Self {
        Self {
            revocable,
            inner: Box::new(inner),
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revocable.is_revoked()
    }
}

impl<T: Task> Task for ScopedTask<T> {
    fn run(self: Box<Self>) {
        if self.revocable.is_revoked() {
            crate::dispatch_trace!("skipping revoked task");
            return;
        }
        self.inner.run();
    }
}

impl<T: CancelableTask> CancelableTask for ScopedTask<T> {
    fn cancel(&mut self) {
        self.inner.cancel();
    }
}

/// Produces tasks that can be revoked together.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// use horizon_lattice_dispatch::revocable::ScopedTaskFactory;
/// use horizon_lattice_dispatch::task::Task;
///
/// let ran = Arc::new(AtomicBool::new(false));
/// let factory = ScopedTaskFactory::new();
/// let flag = ran.clone();
/// let task = factory.new_function(move || flag.store(true, Ordering::SeqCst), ());
/// assert_eq!(factory.pending(), 1);
///
/// factory.revoke_all();
/// Box::new(task).run();
/// assert!(!ran.load(Ordering::SeqCst));
/// ```
#[derive(Debug, Default)]
pub struct ScopedTaskFactory {
    store: RevocableStore,
}

impl ScopedTaskFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing task.
    pub fn new_task<T: Task>(&self, task: T) -> ScopedTask<T> {
        ScopedTask::new(self.store.token(), task)
    }

    /// A revocable task calling `function` with `args`.
    pub fn new_function<F, A>(&self, function: F, args: A) -> ScopedTask<RunnableFunction<F, A>>
    where
        F: Callable<A>,
        A: Send + 'static,
    {
        self.new_task(RunnableFunction::new(function, args))
    }

    /// A revocable task calling `method` on the callee of `binding`.
    pub fn new_method<B, M, A>(
        &self,
        binding: B,
        method: M,
        args: A,
    ) -> ScopedTask<RunnableMethod<B, M, A>>
    where
        B: CalleeBinding,
        M: MethodCallable<B::Callee, A>,
        A: Send + 'static,
    {
        self.new_task(RunnableMethod::new(binding, method, args))
    }

    /// A revocable [`DeferredCall`] wrapping `task`, ready to post.
    pub fn new_call<T>(&self, task: T) -> DeferredCall
    where
        T: CancelableTask + 'static,
    {
        DeferredCall::new(self.new_task(task))
    }

    /// Revoke every task produced so far.
    pub fn revoke_all(&self) {
        self.store.revoke_all();
    }

    /// Whether no unrevoked task from this factory is still alive.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Number of unrevoked tasks from this factory still alive.
    pub fn pending(&self) -> usize {
        self.store.pending()
    }
}
