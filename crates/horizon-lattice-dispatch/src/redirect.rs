//! Redirecting input processing to a controller thread.
//!
//! Input arrives on whatever thread the platform delivers it on, but must be
//! processed by an [`InputController`] on its controller thread. A
//! [`ControllerRedirector`] runs the controller inline when already on that
//! thread. Otherwise it hands the input over and returns at once; the
//! controller's result is delivered to the main thread as a follow-up entry.
//!
//! A [`EventStatus::ConsumeNoDefault`] result is final: no follow-up is posted
//! for it.

use std::fmt;
use std::sync::Arc;

use crate::event::{EventKind, QueuedEvent};
use crate::owner::OwnerHandle;

/// What a handler did with an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventStatus {
    /// Not handled.
    #[default]
    Ignore,
    /// Handled; default processing should still happen.
    ConsumeDoDefault,
    /// Handled; no further processing.
    ConsumeNoDefault,
}

impl EventStatus {
    /// Whether nothing further should happen with the event.
    pub fn is_terminal(self) -> bool {
        self == EventStatus::ConsumeNoDefault
    }
}

/// The controller's verdict on one input, plus the target it resolved, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerResult<T> {
    pub status: EventStatus,
    pub target: Option<T>,
}

impl<T> ControllerResult<T> {
    pub fn new(status: EventStatus, target: Option<T>) -> Self {
        Self { status, target }
    }

    /// A result with no resolved target.
    pub fn status(status: EventStatus) -> Self {
        Self {
            status,
            target: None,
        }
    }
}

/// Processes input on the controller thread.
pub trait InputController: Send + Sync + 'static {
    /// The input event type. The controller may adjust it in place.
    type Input: Send + 'static;
    /// What the controller resolves the input to.
    type Target: Send + 'static;

    fn receive_input(&self, input: &mut Self::Input) -> ControllerResult<Self::Target>;
}

/// Result of [`ControllerRedirector::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Processed on the calling thread.
    Inline(EventStatus),
    /// Handed over to the controller thread.
    Redirected,
}

impl DispatchOutcome {
    /// The status to report to the platform right now.
    ///
    /// A redirected event is reported as consumed with default processing,
    /// since its real result is not known yet.
    pub fn status(self) -> EventStatus {
        match self {
            DispatchOutcome::Inline(status) => status,
            DispatchOutcome::Redirected => EventStatus::ConsumeDoDefault,
        }
    }
}

type FollowUp<C> = dyn Fn(<C as InputController>::Input, ControllerResult<<C as InputController>::Target>) -> EventStatus
    + Send
    + Sync;

/// Routes input to a controller on its own thread.
pub struct ControllerRedirector<C: InputController> {
    controller: Arc<C>,
    controller_thread: OwnerHandle,
    main_thread: OwnerHandle,
    follow_up: Arc<FollowUp<C>>,
}

impl<C: InputController> ControllerRedirector<C> {
    /// Create a redirector.
    ///
    /// `follow_up` receives the input together with the controller's result.
    /// It runs on the main thread for redirected input, and inline for input
    /// dispatched on the controller thread.
    pub fn new<H>(
        controller: Arc<C>,
        controller_thread: OwnerHandle,
        main_thread: OwnerHandle,
        follow_up: H,
    ) -> Self
    where
        H: Fn(C::Input, ControllerResult<C::Target>) -> EventStatus + Send + Sync + 'static,
    {
        Self {
            controller,
            controller_thread,
            main_thread,
            follow_up: Arc::new(follow_up),
        }
    }

    pub fn controller(&self) -> &Arc<C> {
        &self.controller
    }

    pub fn controller_thread(&self) -> &OwnerHandle {
        &self.controller_thread
    }

    pub fn main_thread(&self) -> &OwnerHandle {
        &self.main_thread
    }

    /// Dispatch one input event.
    ///
    /// Never waits for the controller thread.
    pub fn dispatch(&self, mut input: C::Input) -> DispatchOutcome {
        if self.controller_thread.is_current() {
            let result = self.controller.receive_input(&mut input);
            if result.status.is_terminal() {
                return DispatchOutcome::Inline(result.status);
            }
            return DispatchOutcome::Inline((self.follow_up)(input, result));
        }

        let controller = Arc::clone(&self.controller);
        let main_thread = self.main_thread.clone();
        let follow_up = Arc::clone(&self.follow_up);
        let posted = self
            .controller_thread
            .post(QueuedEvent::from_fn(EventKind::Input, move || {
                let result = controller.receive_input(&mut input);
                if result.status.is_terminal() {
                    tracing::trace!(
                        target: "horizon_lattice_dispatch::redirect",
                        "input consumed on controller thread"
                    );
                    return;
                }
                main_thread.post(QueuedEvent::from_fn(EventKind::Input, move || {
                    follow_up(input, result);
                }));
            }));

        if posted {
            tracing::trace!(
                target: "horizon_lattice_dispatch::redirect",
                controller = %self.controller_thread.name(),
                "input redirected to controller thread"
            );
        }
        DispatchOutcome::Redirected
    }
}

impl<C: InputController> fmt::Debug for ControllerRedirector<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRedirector")
            .field("controller_thread", &self.controller_thread.name())
            .field("main_thread", &self.main_thread.name())
            .finish()
    }
}
