//! How a method task holds on to the object it will be called on.
//!
//! [`Retained`] keeps the callee alive for as long as the task exists, which
//! is the default for anything reference counted. [`Unretained`] skips that
//! and puts the lifetime burden on the caller.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Policy for holding the callee of a method task.
///
/// Implementations must make [`release`](CalleeBinding::release) idempotent:
/// after the first call the callee is gone and [`callee`](CalleeBinding::callee)
/// returns `None`.
pub trait CalleeBinding: Send {
    /// The type the bound method is invoked on.
    type Callee: ?Sized;

    /// The callee, or `None` once released.
    fn callee(&self) -> Option<&Self::Callee>;

    /// Give up the hold on the callee.
    fn release(&mut self);

    /// Whether [`release`](CalleeBinding::release) has already happened.
    fn is_released(&self) -> bool;
}

/// Holds a strong reference to the callee until released.
pub struct Retained<T: ?Sized + Send + Sync> {
    callee: Option<Arc<T>>,
}

impl<T: ?Sized + Send + Sync> Retained<T> {
    /// Retain `callee` for the lifetime of the binding.
    pub fn new(callee: &Arc<T>) -> Self {
        Self {
            callee: Some(Arc::clone(callee)),
        }
    }

    /// Take ownership of an existing strong reference.
    pub fn from_arc(callee: Arc<T>) -> Self {
        Self {
            callee: Some(callee),
        }
    }
}

impl<T: ?Sized + Send + Sync> CalleeBinding for Retained<T> {
    type Callee = T;

    fn callee(&self) -> Option<&T> {
        self.callee.as_deref()
    }

    fn release(&mut self) {
        self.callee = None;
    }

    fn is_released(&self) -> bool {
        self.callee.is_none()
    }
}

impl<T: ?Sized + Send + Sync> fmt::Debug for Retained<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retained")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Refers to the callee without keeping it alive.
pub struct Unretained<T: ?Sized> {
    callee: Option<NonNull<T>>,
}

impl<T: ?Sized + Sync> Unretained<T> {
    /// Bind `callee` without retaining it.
    ///
    /// # Safety
    ///
    /// The callee must outlive every task built from this binding, or those
    /// tasks must be canceled or dropped before the callee goes away.
    pub unsafe fn new(callee: &T) -> Self {
        Self {
            callee: Some(NonNull::from(callee)),
        }
    }

    /// Bind a callee that lives for the rest of the program.
    pub fn from_static(callee: &'static T) -> Self {
        Self {
            callee: Some(NonNull::from(callee)),
        }
    }
}

// SAFETY: only shared references are ever handed out, and `T: Sync` makes
// those usable from the thread that runs the task.
unsafe impl<T: ?Sized + Sync> Send for Unretained<T> {}

impl<T: ?Sized + Sync> CalleeBinding for Unretained<T> {
    type Callee = T;

    fn callee(&self) -> Option<&T> {
        // SAFETY: the constructor's contract keeps the pointee alive while the
        // binding is unreleased.
        self.callee.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    fn release(&mut self) {
        self.callee = None;
    }

    fn is_released(&self) -> bool {
        self.callee.is_none()
    }
}

impl<T: ?Sized> fmt::Debug for Unretained<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unretained")
            .field("released", &self.callee.is_none())
            .finish()
    }
}
