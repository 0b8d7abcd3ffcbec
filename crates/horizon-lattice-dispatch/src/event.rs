//! Queue entry types for the Horizon Lattice dispatch core.
//!
//! A [`QueuedEvent`] pairs a [`DeferredCall`] with the metadata the queue and
//! the pump need: an [`EventKind`] tag used for coalescing and "same kind"
//! queries, and an [`ActivityKind`] reported to the hang monitor.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::deferred::{CancelHandle, DeferredCall};

/// Tag identifying the logical stream an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Ordinary deferred work.
    General,
    /// Completion callbacks from native code. Transparent to stream coalescing.
    Callback,
    /// Viewport updates. Only the newest one matters.
    Viewport,
    /// Pointer/touch motion samples.
    Motion,
    /// Other input events (keys, wheel, controller follow-ups).
    Input,
    /// Application-defined stream.
    Custom(u32),
}

impl EventKind {
    /// Activity classification used when an entry does not specify one.
    pub fn default_activity(self) -> ActivityKind {
        match self {
            Self::Motion | Self::Input => ActivityKind::UiInput,
            _ => ActivityKind::General,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::Callback => write!(f, "callback"),
            Self::Viewport => write!(f, "viewport"),
            Self::Motion => write!(f, "motion"),
            Self::Input => write!(f, "input"),
            Self::Custom(id) => write!(f, "custom({id})"),
        }
    }
}

/// Activity classification reported to the hang monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActivityKind {
    /// Work triggered directly by user input.
    UiInput,
    /// Everything else.
    #[default]
    General,
}

/// Phase of a pointer motion sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionAction {
    Down,
    Move,
    Up,
    Cancel,
}

/// Payload carried by pointer motion entries, consulted when coalescing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    /// Pointer (finger, pen, mouse) identifier.
    pub pointer_id: u32,
    /// Phase of the motion.
    pub action: MotionAction,
    /// Bitmask of pressed buttons.
    pub buttons: u32,
    /// Position in window coordinates.
    pub x: f32,
    pub y: f32,
}

impl MotionSample {
    /// Create a move sample for the given pointer.
    pub fn moved(pointer_id: u32, x: f32, y: f32) -> Self {
        Self {
            pointer_id,
            action: MotionAction::Move,
            buttons: 0,
            x,
            y,
        }
    }

    /// Set the pressed buttons.
    pub fn with_buttons(mut self, buttons: u32) -> Self {
        self.buttons = buttons;
        self
    }

    /// Set the motion phase.
    pub fn with_action(mut self, action: MotionAction) -> Self {
        self.action = action;
        self
    }

    /// Whether this sample may replace `previous` in the queue.
    ///
    /// Only consecutive moves of the same pointer with unchanged buttons merge;
    /// a down, up or cancel always survives.
    pub fn can_coalesce_with(&self, previous: &MotionSample) -> bool {
        self.action == MotionAction::Move
            && previous.action == MotionAction::Move
            && self.pointer_id == previous.pointer_id
            && self.buttons == previous.buttons
    }
}

/// How an incoming entry of a given kind interacts with what is already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CoalescePolicy {
    /// Always appended.
    #[default]
    None,
    /// Scan backward from the tail, skipping transparent kinds; the first entry
    /// of the same kind found before any other kind is removed.
    Stream,
    /// Only the immediately preceding entry is examined; it is dropped when it
    /// has the same kind and the payloads can merge. Gated by the queue's
    /// motion coalescing switch.
    Consecutive,
}

/// The table of per-kind coalescing policies and kinds skipped while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescingRules {
    policies: HashMap<EventKind, CoalescePolicy>,
    transparent: HashSet<EventKind>,
}

impl CoalescingRules {
    /// Rules with no coalescing at all.
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
            transparent: HashSet::new(),
        }
    }

    /// Set the policy for a kind.
    pub fn with_policy(mut self, kind: EventKind, policy: CoalescePolicy) -> Self {
        if policy == CoalescePolicy::None {
            self.policies.remove(&kind);
        } else {
            self.policies.insert(kind, policy);
        }
        self
    }

    /// Mark a kind as skippable during a stream coalescing scan.
    pub fn with_transparent(mut self, kind: EventKind) -> Self {
        self.transparent.insert(kind);
        self
    }

    /// The policy applied to incoming entries of `kind`.
    pub fn policy(&self, kind: EventKind) -> CoalescePolicy {
        self.policies.get(&kind).copied().unwrap_or_default()
    }

    /// Whether entries of `kind` are skipped by a stream coalescing scan.
    pub fn is_transparent(&self, kind: EventKind) -> bool {
        self.transparent.contains(&kind)
    }
}

impl Default for CoalescingRules {
    /// Viewport updates coalesce as a stream across callbacks; motion samples
    /// coalesce with the immediately preceding sample.
    fn default() -> Self {
        Self::empty()
            .with_policy(EventKind::Viewport, CoalescePolicy::Stream)
            .with_policy(EventKind::Motion, CoalescePolicy::Consecutive)
            .with_transparent(EventKind::Callback)
    }
}

/// One entry of an [`EventQueue`](crate::EventQueue).
pub struct QueuedEvent {
    kind: EventKind,
    activity: ActivityKind,
    motion: Option<MotionSample>,
    pinned: bool,
    call: DeferredCall,
}

impl QueuedEvent {
    /// Wrap a deferred call as an entry of the given kind.
    pub fn new(kind: EventKind, call: DeferredCall) -> Self {
        Self {
            kind,
            activity: kind.default_activity(),
            motion: None,
            pinned: false,
            call,
        }
    }

    /// Wrap a closure as an entry of the given kind.
    pub fn from_fn<F>(kind: EventKind, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(kind, DeferredCall::from_fn(f))
    }

    /// A general entry.
    pub fn general<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_fn(EventKind::General, f)
    }

    /// A native callback completion.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_fn(EventKind::Callback, f)
    }

    /// A viewport update.
    pub fn viewport<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_fn(EventKind::Viewport, f)
    }

    /// A pointer motion entry carrying `sample` for coalescing decisions.
    pub fn motion<F>(sample: MotionSample, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let mut event = Self::from_fn(EventKind::Motion, f);
        event.motion = Some(sample);
        event
    }

    /// Override the activity classification.
    pub fn with_activity(mut self, activity: ActivityKind) -> Self {
        self.activity = activity;
        self
    }

    /// Attach a motion payload.
    pub fn with_motion(mut self, sample: MotionSample) -> Self {
        self.motion = Some(sample);
        self
    }

    /// Exempt this entry from coalescing in either direction.
    pub(crate) fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub(crate) fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn activity(&self) -> ActivityKind {
        self.activity
    }

    pub fn motion_sample(&self) -> Option<&MotionSample> {
        self.motion.as_ref()
    }

    /// A handle that cancels this entry's call while it sits in a queue.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.call.cancel_handle()
    }

    /// Whether this entry may replace `previous` under the consecutive policy.
    ///
    /// Only two motion payloads that agree can merge; an entry missing a
    /// payload on either side never merges.
    pub fn can_coalesce_with(&self, previous: &QueuedEvent) -> bool {
        if self.kind != previous.kind || self.pinned || previous.pinned {
            return false;
        }
        match (&self.motion, &previous.motion) {
            (Some(sample), Some(prev)) => sample.can_coalesce_with(prev),
            _ => false,
        }
    }

    /// Run the wrapped call, consuming the entry.
    pub fn run(self) {
        self.call.run();
    }
}

impl fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("kind", &self.kind)
            .field("activity", &self.activity)
            .field("motion", &self.motion)
            .field("pinned", &self.pinned)
            .field("canceled", &self.call.is_canceled())
            .finish()
    }
}
