//! Runnable units of deferred work.
//!
//! A [`Task`] is a generic runnable thing, usually used for running code on a
//! different thread. Tasks consume themselves when run, so a task executes at
//! most once. [`CancelableTask`]s can additionally be canceled before they run;
//! canceling drops the bound arguments and releases the callee right away.
//!
//! Arguments are bound by value when the task is created, never at run time:
//!
//! ```
//! use horizon_lattice_dispatch::task::{new_runnable_function, Task};
//!
//! let mut greeting = String::from("hello");
//! let task = new_runnable_function(
//!     |text: String, times: usize| assert_eq!(text.repeat(times), "hellohello"),
//!     (greeting.clone(), 2),
//! );
//! greeting.push_str(" world"); // the task keeps its own copy
//! Box::new(task).run();
//! ```

use crate::callee::CalleeBinding;

/// A unit of work that runs once, on whatever thread consumes it.
pub trait Task: Send {
    /// Execute the task, consuming it.
    fn run(self: Box<Self>);
}

/// A task that can be told not to run.
pub trait CancelableTask: Task {
    /// Drop the bound work so a later [`Task::run`] does nothing.
    ///
    /// Calling this more than once is harmless.
    fn cancel(&mut self);
}

/// A free function or closure that can be invoked with an argument tuple.
///
/// Implemented for every `FnOnce` taking up to six arguments; the tuple is
/// spread into positional arguments.
pub trait Callable<Args>: Send + 'static {
    fn call(self, args: Args);
}

/// A method-like callable invoked with a callee reference and an argument tuple.
///
/// Implemented for every `FnOnce(&T, ...)` taking up to six further arguments,
/// which includes method paths such as `Counter::add`.
pub trait MethodCallable<T: ?Sized, Args>: Send + 'static {
    fn call_method(self, callee: &T, args: Args);
}

macro_rules! impl_callable {
    ($($arg:ident),*) => {
        impl<Func, $($arg,)*> Callable<($($arg,)*)> for Func
        where
            Func: FnOnce($($arg),*) + Send + 'static,
            $($arg: Send + 'static,)*
        {
            #[allow(non_snake_case, clippy::unused_unit)]
            fn call(self, ($($arg,)*): ($($arg,)*)) {
                self($($arg),*)
            }
        }

        impl<Func, Callee: ?Sized, $($arg,)*> MethodCallable<Callee, ($($arg,)*)> for Func
        where
            Func: FnOnce(&Callee, $($arg),*) + Send + 'static,
            $($arg: Send + 'static,)*
        {
            #[allow(non_snake_case)]
            fn call_method(self, callee: &Callee, ($($arg,)*): ($($arg,)*)) {
                self(callee, $($arg),*)
            }
        }
    };
}

impl_callable!();
impl_callable!(A);
impl_callable!(A, B);
impl_callable!(A, B, C);
impl_callable!(A, B, C, D);
impl_callable!(A, B, C, D, E);
impl_callable!(A, B, C, D, E, F);

/// A task that calls a function with bound arguments.
pub struct RunnableFunction<F, A> {
    call: Option<(F, A)>,
}

impl<F, A> RunnableFunction<F, A>
where
    F: Callable<A>,
    A: Send + 'static,
{
    pub fn new(function: F, args: A) -> Self {
        Self {
            call: Some((function, args)),
        }
    }

    /// Whether the task has been canceled.
    pub fn is_canceled(&self) -> bool {
        self.call.is_none()
    }
}

impl<F, A> Task for RunnableFunction<F, A>
where
    F: Callable<A>,
    A: Send + 'static,
{
    fn run(mut self: Box<Self>) {
        if let Some((function, args)) = self.call.take() {
            function.call(args);
        }
    }
}

impl<F, A> CancelableTask for RunnableFunction<F, A>
where
    F: Callable<A>,
    A: Send + 'static,
{
    fn cancel(&mut self) {
        self.call = None;
    }
}

/// Create a task that calls `function` with `args` spread as its arguments.
pub fn new_runnable_function<F, A>(function: F, args: A) -> RunnableFunction<F, A>
where
    F: Callable<A>,
    A: Send + 'static,
{
    RunnableFunction::new(function, args)
}

/// A task that calls a method on a callee held through a [`CalleeBinding`].
///
/// The binding is released right after the method returns, when the task is
/// canceled, or when the task is dropped without having run, whichever comes
/// first.
pub struct RunnableMethod<B, M, A> {
    binding: B,
    call: Option<(M, A)>,
}

impl<B, M, A> RunnableMethod<B, M, A>
where
    B: CalleeBinding,
    M: MethodCallable<B::Callee, A>,
    A: Send + 'static,
{
    pub fn new(binding: B, method: M, args: A) -> Self {
        Self {
            binding,
            call: Some((method, args)),
        }
    }

    /// Whether the callee is still held by this task.
    pub fn holds_callee(&self) -> bool {
        !self.binding.is_released()
    }
}

impl<B, M, A> Task for RunnableMethod<B, M, A>
where
    B: CalleeBinding,
    M: MethodCallable<B::Callee, A>,
    A: Send + 'static,
{
    fn run(mut self: Box<Self>) {
        if let Some((method, args)) = self.call.take() {
            if let Some(callee) = self.binding.callee() {
                method.call_method(callee, args);
            }
        }
        self.binding.release();
    }
}

impl<B, M, A> CancelableTask for RunnableMethod<B, M, A>
where
    B: CalleeBinding,
    M: MethodCallable<B::Callee, A>,
    A: Send + 'static,
{
    fn cancel(&mut self) {
        self.call = None;
        self.binding.release();
    }
}

/// Create a task that calls `method` on the callee of `binding` with `args`.
pub fn new_runnable_method<B, M, A>(binding: B, method: M, args: A) -> RunnableMethod<B, M, A>
where
    B: CalleeBinding,
    M: MethodCallable<B::Callee, A>,
    A: Send + 'static,
{
    RunnableMethod::new(binding, method, args)
}

/// A task that drops a value on the thread that runs it.
///
/// Useful for releasing an object on its owner thread. Canceling keeps the
/// value alive until the task itself is dropped.
pub struct DropTask<T: Send> {
    value: Option<T>,
    canceled: bool,
}

impl<T: Send> DropTask<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Some(value),
            canceled: false,
        }
    }
}

impl<T: Send> Task for DropTask<T> {
    fn run(mut self: Box<Self>) {
        if !self.canceled {
            drop(self.value.take());
        }
    }
}

impl<T: Send> CancelableTask for DropTask<T> {
    fn cancel(&mut self) {
        self.canceled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callee::{Retained, Unretained};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        value: AtomicUsize,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                value: AtomicUsize::new(0),
            }
        }

        fn add(&self, amount: usize) {
            self.value.fetch_add(amount, Ordering::SeqCst);
        }

        fn add_product(&self, a: usize, b: usize, label: String) {
            assert_eq!(label, "product");
            self.value.fetch_add(a * b, Ordering::SeqCst);
        }

        fn get(&self) -> usize {
            self.value.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_function_binds_arguments_at_creation() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut items = vec![1, 2, 3];

        let seen_clone = seen.clone();
        let task = new_runnable_function(
            move |items: Vec<i32>, extra: i32| {
                seen_clone.lock().extend(items);
                seen_clone.lock().push(extra);
            },
            (items.clone(), 4),
        );
        items.push(99);

        Box::new(task).run();
        assert_eq!(*seen.lock(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_argument_function() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let task = new_runnable_function(
            move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            },
            (),
        );
        Box::new(task).run();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_function_with_six_arguments() {
        let total = Arc::new(AtomicUsize::new(0));
        let total_clone = total.clone();
        let task = new_runnable_function(
            move |a: usize, b: usize, c: usize, d: usize, e: usize, label: &'static str| {
                assert_eq!(label, "sum");
                total_clone.fetch_add(a + b + c + d + e, Ordering::SeqCst);
            },
            (1, 2, 3, 4, 5, "sum"),
        );
        Box::new(task).run();
        assert_eq!(total.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_canceled_function_does_nothing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let mut task = new_runnable_function(
            move |n: usize| {
                counter_clone.fetch_add(n, Ordering::SeqCst);
            },
            (5,),
        );
        task.cancel();
        task.cancel();
        assert!(task.is_canceled());
        Box::new(task).run();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_drops_arguments() {
        let payload = Arc::new(());
        let mut task = new_runnable_function(|_payload: Arc<()>| {}, (payload.clone(),));
        assert_eq!(Arc::strong_count(&payload), 2);
        task.cancel();
        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn test_method_with_retained_callee() {
        let counter = Arc::new(Counter::new());
        let task = new_runnable_method(Retained::new(&counter), Counter::add, (3,));
        assert_eq!(Arc::strong_count(&counter), 2);
        assert!(task.holds_callee());

        Box::new(task).run();
        assert_eq!(counter.get(), 3);
        assert_eq!(Arc::strong_count(&counter), 1);
    }

    #[test]
    fn test_method_with_several_arguments() {
        let counter = Arc::new(Counter::new());
        let task = new_runnable_method(
            Retained::new(&counter),
            Counter::add_product,
            (6, 7, "product".to_string()),
        );
        Box::new(task).run();
        assert_eq!(counter.get(), 42);
    }

    #[test]
    fn test_cancel_releases_callee_immediately() {
        let counter = Arc::new(Counter::new());
        let mut task = new_runnable_method(Retained::new(&counter), Counter::add, (3,));
        task.cancel();
        assert_eq!(Arc::strong_count(&counter), 1);
        assert!(!task.holds_callee());

        // Run after cancel is a no-op and does not release twice.
        Box::new(task).run();
        assert_eq!(counter.get(), 0);
        assert_eq!(Arc::strong_count(&counter), 1);
    }

    #[test]
    fn test_drop_without_run_releases_callee() {
        let counter = Arc::new(Counter::new());
        let task = new_runnable_method(Retained::new(&counter), Counter::add, (3,));
        drop(task);
        assert_eq!(Arc::strong_count(&counter), 1);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_method_with_unretained_callee() {
        static COUNTER: Counter = Counter {
            value: AtomicUsize::new(0),
        };
        let task = new_runnable_method(Unretained::from_static(&COUNTER), Counter::add, (2,));
        Box::new(task).run();
        assert_eq!(COUNTER.get(), 2);
    }

    #[test]
    fn test_drop_task() {
        let value = Arc::new(());
        let task = DropTask::new(value.clone());
        assert_eq!(Arc::strong_count(&value), 2);
        Box::new(task).run();
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn test_canceled_drop_task_keeps_value_until_dropped() {
        let value = Arc::new(());
        let mut task = DropTask::new(value.clone());
        task.cancel();
        assert_eq!(Arc::strong_count(&value), 2);
        Box::new(task).run();
        assert_eq!(Arc::strong_count(&value), 1);
    }
}
