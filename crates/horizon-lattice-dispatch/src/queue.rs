//! The per-owner event queue.
//!
//! An [`EventQueue`] is a FIFO of [`QueuedEvent`]s shared by every producer
//! that posts to one owner thread. Posting never blocks on the consumer and
//! may coalesce the new entry with ones already pending:
//!
//! - [`CoalescePolicy::Stream`]: scanning back from the tail, the newest
//!   pending entry of the same kind is removed. Transparent kinds are skipped
//!   over; any other kind stops the scan.
//! - [`CoalescePolicy::Consecutive`]: only the tail entry is considered. It is
//!   removed when it has the same kind and the two entries agree on their
//!   motion payload. This can be switched off at runtime with
//!   [`EventQueue::set_motion_coalescing`].
//!
//! Everything else is appended unchanged, so entries that are not coalesced
//! run in the order they were posted. Synchronous call wrappers are never
//! coalesced, whatever the rules say about their kind.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::DispatchConfig;
use crate::event::{CoalescePolicy, CoalescingRules, EventKind, QueuedEvent};
use crate::logging::QueueSnapshot;

/// Lifecycle of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Accepting and delivering entries.
    Open,
    /// Shutdown requested. Entries are still accepted, but blocking pops
    /// return immediately so the consumer can wind down.
    ShuttingDown,
    /// Closed by the consumer. Posts are rejected.
    Closed,
}

/// Outcome of a successful post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posted {
    /// The entry was appended and nothing was removed.
    Queued,
    /// The entry was appended and replaced an older pending entry.
    Superseded,
}

/// A post refused because the queue is closed. Carries the entry back.
#[derive(Debug)]
pub struct Rejected(pub QueuedEvent);

impl Rejected {
    pub fn into_inner(self) -> QueuedEvent {
        self.0
    }
}

#[derive(Debug)]
struct QueueInner {
    entries: VecDeque<QueuedEvent>,
    state: QueueState,
    /// Set by [`EventQueue::signal`]; consumed by the next blocking pop.
    woken: bool,
}

/// A thread-safe FIFO of pending entries for one owner.
#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    rules: CoalescingRules,
    coalesce_motion: AtomicBool,
}

impl EventQueue {
    /// A queue with the default coalescing rules.
    pub fn new() -> Self {
        Self::with_rules(CoalescingRules::default(), true)
    }

    /// A queue set up from `config`.
    pub fn with_config(config: &DispatchConfig) -> Self {
        Self::with_rules(config.coalescing.clone(), config.coalesce_motion)
    }

    /// A queue with explicit coalescing rules.
    pub fn with_rules(rules: CoalescingRules, coalesce_motion: bool) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: VecDeque::new(),
                state: QueueState::Open,
                woken: false,
            }),
            available: Condvar::new(),
            rules,
            coalesce_motion: AtomicBool::new(coalesce_motion),
        }
    }

    /// Append `event`, coalescing it with pending entries where its kind allows.
    ///
    /// Returns the entry back if the queue is closed. A superseded entry is
    /// dropped after the queue lock is released, so releasing its bound
    /// arguments never runs under the lock.
    pub fn try_post(&self, event: QueuedEvent) -> Result<Posted, Rejected> {
        let kind = event.kind();
        let superseded = {
            let mut inner = self.inner.lock();
            if inner.state == QueueState::Closed {
                return Err(Rejected(event));
            }
            let superseded = self.coalesce(&mut inner.entries, &event);
            inner.entries.push_back(event);
            superseded
        };
        self.available.notify_one();

        match superseded {
            Some(old) => {
                tracing::trace!(
                    target: "horizon_lattice_dispatch::queue",
                    %kind,
                    canceled = old.cancel_handle().is_canceled(),
                    "coalesced pending entry"
                );
                drop(old);
                Ok(Posted::Superseded)
            }
            None => Ok(Posted::Queued),
        }
    }

    /// Append `event`, logging and dropping it if the queue is closed.
    ///
    /// Returns `true` if the entry was accepted.
    pub fn post(&self, event: QueuedEvent) -> bool {
        match self.try_post(event) {
            Ok(_) => true,
            Err(Rejected(event)) => {
                tracing::warn!(
                    target: "horizon_lattice_dispatch::queue",
                    kind = %event.kind(),
                    "post to closed event queue dropped"
                );
                false
            }
        }
    }

    fn coalesce(
        &self,
        entries: &mut VecDeque<QueuedEvent>,
        incoming: &QueuedEvent,
    ) -> Option<QueuedEvent> {
        if incoming.is_pinned() {
            return None;
        }
        let kind = incoming.kind();
        match self.rules.policy(kind) {
            CoalescePolicy::None => None,
            CoalescePolicy::Stream => {
                for index in (0..entries.len()).rev() {
                    let pending = entries[index].kind();
                    if pending == kind {
                        if entries[index].is_pinned() {
                            break;
                        }
                        return entries.remove(index);
                    }
                    if !self.rules.is_transparent(pending) {
                        break;
                    }
                }
                None
            }
            CoalescePolicy::Consecutive => {
                if !self.motion_coalescing() {
                    return None;
                }
                let merge = entries
                    .back()
                    .is_some_and(|last| incoming.can_coalesce_with(last));
                if merge { entries.pop_back() } else { None }
            }
        }
    }

    /// Remove and return the head entry.
    ///
    /// With `may_block` set, waits while the queue is empty and open. Returns
    /// `None` when not blocking and nothing is pending, when the queue is not
    /// open, or when [`signal`](Self::signal) woke the wait.
    pub fn pop(&self, may_block: bool) -> Option<QueuedEvent> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = inner.entries.pop_front() {
                return Some(event);
            }
            if !may_block || inner.state != QueueState::Open {
                return None;
            }
            if inner.woken {
                inner.woken = false;
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Like a blocking [`pop`](Self::pop), but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<QueuedEvent> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = inner.entries.pop_front() {
                return Some(event);
            }
            if inner.state != QueueState::Open {
                return None;
            }
            if inner.woken {
                inner.woken = false;
                return None;
            }
            if self.available.wait_until(&mut inner, deadline).timed_out() {
                return inner.entries.pop_front();
            }
        }
    }

    /// Wake a blocked consumer without posting an entry.
    ///
    /// Used when work arrived through some other channel, such as a native
    /// event source. If no consumer is waiting, the next blocking pop returns
    /// `None` once instead of waiting.
    pub fn signal(&self) {
        self.inner.lock().woken = true;
        self.available.notify_all();
    }

    /// Move an open queue to [`QueueState::ShuttingDown`] and wake consumers.
    pub fn shutdown(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == QueueState::Open {
                inner.state = QueueState::ShuttingDown;
            }
        }
        self.available.notify_all();
    }

    /// Close the queue and hand back every entry still pending, head first.
    pub fn close(&self) -> Vec<QueuedEvent> {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.state = QueueState::Closed;
            inner.entries.drain(..).collect()
        };
        self.available.notify_all();
        drained
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }

    /// Whether the queue is still [`QueueState::Open`].
    pub fn is_open(&self) -> bool {
        self.state() == QueueState::Open
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Number of pending entries of `kind`.
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    /// Whether any pending entry has `kind`.
    pub fn contains_kind(&self, kind: EventKind) -> bool {
        self.inner
            .lock()
            .entries
            .iter()
            .any(|event| event.kind() == kind)
    }

    /// Describe the pending entries, head first.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            entries: self
                .inner
                .lock()
                .entries
                .iter()
                .map(|event| (event.kind(), event.activity()))
                .collect(),
        }
    }

    /// Enable or disable merging of consecutive motion entries.
    pub fn set_motion_coalescing(&self, enabled: bool) {
        self.coalesce_motion.store(enabled, Ordering::Relaxed);
    }

    pub fn motion_coalescing(&self) -> bool {
        self.coalesce_motion.load(Ordering::Relaxed)
    }

    pub fn rules(&self) -> &CoalescingRules {
        &self.rules
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MotionAction, MotionSample};
    use std::sync::Arc;
    use std::thread;

    fn kinds(queue: &EventQueue) -> Vec<EventKind> {
        queue.snapshot().kinds()
    }

    fn noop(kind: EventKind) -> QueuedEvent {
        QueuedEvent::from_fn(kind, || {})
    }

    fn motion(pointer: u32, x: f32) -> QueuedEvent {
        QueuedEvent::motion(MotionSample::moved(pointer, x, 0.0), || {})
    }

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            queue.post(QueuedEvent::general(move || order.lock().push(i)));
        }
        while let Some(event) = queue.pop(false) {
            event.run();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_viewport_replaces_latest_viewport() {
        let queue = EventQueue::new();
        assert_eq!(queue.try_post(noop(EventKind::Viewport)).unwrap(), Posted::Queued);
        assert_eq!(
            queue.try_post(noop(EventKind::Viewport)).unwrap(),
            Posted::Superseded
        );
        assert_eq!(queue.count_kind(EventKind::Viewport), 1);
    }

    #[test]
    fn test_viewport_scan_skips_callbacks() {
        let queue = EventQueue::new();
        queue.post(noop(EventKind::Viewport));
        queue.post(noop(EventKind::Callback));
        queue.post(noop(EventKind::Callback));
        queue.post(noop(EventKind::Viewport));
        assert_eq!(
            kinds(&queue),
            vec![EventKind::Callback, EventKind::Callback, EventKind::Viewport]
        );
    }

    #[test]
    fn test_viewport_scan_stops_at_other_kinds() {
        let queue = EventQueue::new();
        queue.post(noop(EventKind::Viewport));
        queue.post(noop(EventKind::General));
        queue.post(noop(EventKind::Viewport));
        assert_eq!(queue.count_kind(EventKind::Viewport), 2);
    }

    #[test]
    fn test_superseded_viewport_never_runs() {
        let queue = EventQueue::new();
        let ran = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let ran = ran.clone();
            queue.post(QueuedEvent::viewport(move || ran.lock().push(i)));
        }
        while let Some(event) = queue.pop(false) {
            event.run();
        }
        assert_eq!(*ran.lock(), vec![2]);
    }

    #[test]
    fn test_consecutive_motion_merges() {
        let queue = EventQueue::new();
        queue.post(motion(1, 1.0));
        queue.post(motion(1, 2.0));
        queue.post(motion(1, 3.0));
        assert_eq!(queue.len(), 1);

        let event = queue.pop(false).unwrap();
        assert_eq!(event.motion_sample().map(|s| s.x), Some(3.0));
    }

    #[test]
    fn test_motion_merge_requires_adjacency_and_agreement() {
        let queue = EventQueue::new();
        queue.post(motion(1, 1.0));
        queue.post(noop(EventKind::Callback));
        queue.post(motion(1, 2.0));
        assert_eq!(queue.count_kind(EventKind::Motion), 2);

        queue.post(motion(2, 3.0));
        assert_eq!(queue.count_kind(EventKind::Motion), 3);

        let down = MotionSample::moved(2, 4.0, 0.0).with_action(MotionAction::Down);
        queue.post(QueuedEvent::motion(down, || {}));
        assert_eq!(queue.count_kind(EventKind::Motion), 4);
    }

    #[test]
    fn test_motion_without_payload_is_kept() {
        let queue = EventQueue::new();
        let ran = Arc::new(Mutex::new(Vec::new()));
        for i in 0..2 {
            let ran = ran.clone();
            queue.post(QueuedEvent::from_fn(EventKind::Motion, move || ran.lock().push(i)));
        }
        assert_eq!(queue.count_kind(EventKind::Motion), 2);

        while let Some(event) = queue.pop(false) {
            event.run();
        }
        assert_eq!(*ran.lock(), vec![0, 1]);
    }

    #[test]
    fn test_pinned_entries_survive_stream_coalescing() {
        let rules =
            CoalescingRules::default().with_policy(EventKind::General, CoalescePolicy::Stream);
        let queue = EventQueue::with_rules(rules, true);
        queue.post(noop(EventKind::General).pinned());
        assert_eq!(queue.try_post(noop(EventKind::General)).unwrap(), Posted::Queued);
        assert_eq!(
            queue.try_post(noop(EventKind::General).pinned()).unwrap(),
            Posted::Queued
        );
        assert_eq!(queue.count_kind(EventKind::General), 3);
        assert!(queue.pop(false).is_some_and(|event| event.is_pinned()));
    }

    #[test]
    fn test_motion_toggle() {
        let queue = EventQueue::new();
        queue.set_motion_coalescing(false);
        assert!(!queue.motion_coalescing());
        queue.post(motion(1, 1.0));
        queue.post(motion(1, 2.0));
        assert_eq!(queue.len(), 2);

        queue.set_motion_coalescing(true);
        queue.post(motion(1, 3.0));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_custom_rules() {
        let rules = CoalescingRules::empty().with_policy(EventKind::Custom(7), CoalescePolicy::Stream);
        let queue = EventQueue::with_rules(rules, true);
        queue.post(noop(EventKind::Viewport));
        queue.post(noop(EventKind::Viewport));
        queue.post(noop(EventKind::Custom(7)));
        queue.post(noop(EventKind::Custom(7)));
        assert_eq!(
            kinds(&queue),
            vec![EventKind::Viewport, EventKind::Viewport, EventKind::Custom(7)]
        );
    }

    #[test]
    fn test_close_rejects_and_drains() {
        let queue = EventQueue::new();
        queue.post(noop(EventKind::General));
        queue.post(noop(EventKind::Callback));

        let drained = queue.close();
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.state(), QueueState::Closed);
        assert!(queue.is_empty());

        let rejected = queue.try_post(noop(EventKind::General)).unwrap_err();
        assert_eq!(rejected.into_inner().kind(), EventKind::General);
        assert!(!queue.post(noop(EventKind::General)));
    }

    #[test]
    fn test_shutting_down_still_accepts() {
        let queue = EventQueue::new();
        queue.shutdown();
        assert_eq!(queue.state(), QueueState::ShuttingDown);
        assert!(!queue.is_open());
        assert!(queue.post(noop(EventKind::General)));
        assert!(queue.pop(true).is_some());
        assert!(queue.pop(true).is_none());
    }

    #[test]
    fn test_blocking_pop_wakes_on_post() {
        let queue = Arc::new(EventQueue::new());
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop(true).map(|event| event.kind()))
        };
        thread::sleep(Duration::from_millis(20));
        queue.post(noop(EventKind::Callback));
        assert_eq!(consumer.join().unwrap(), Some(EventKind::Callback));
    }

    #[test]
    fn test_blocking_pop_wakes_on_shutdown() {
        let queue = Arc::new(EventQueue::new());
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop(true).is_none())
        };
        thread::sleep(Duration::from_millis(20));
        queue.shutdown();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn test_signal_wakes_once() {
        let queue = EventQueue::new();
        queue.signal();
        assert!(queue.pop(true).is_none());
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_pop_timeout() {
        let queue = EventQueue::new();
        let start = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));

        queue.post(noop(EventKind::General));
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_some());
    }

    #[test]
    fn test_superseded_entry_released_outside_lock() {
        struct TouchQueueOnDrop(Arc<EventQueue>);
        impl Drop for TouchQueueOnDrop {
            fn drop(&mut self) {
                // Would deadlock if the queue lock were still held.
                let _ = self.0.len();
            }
        }

        let queue = Arc::new(EventQueue::new());
        let guard = TouchQueueOnDrop(queue.clone());
        queue.post(QueuedEvent::viewport(move || drop(guard)));
        queue.post(noop(EventKind::Viewport));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_snapshot() {
        let queue = EventQueue::new();
        queue.post(noop(EventKind::Viewport));
        queue.post(motion(1, 0.0));
        assert!(queue.contains_kind(EventKind::Motion));
        assert!(!queue.contains_kind(EventKind::Input));
        assert_eq!(queue.snapshot().compact(), "[viewport, motion]");
    }
}
