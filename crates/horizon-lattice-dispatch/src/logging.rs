//! Logging and debugging facilities for Horizon Lattice dispatch.
//!
//! This module provides:
//! - Target and span names used by the dispatch core's `tracing` output
//! - A performance span guard wrapped around every executed entry
//! - A textual view of a queue's pending entries for debugging coalescing
//!
//! # Tracing Integration
//!
//! The dispatch core uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_lattice_dispatch::queue=trace")
//!     .init();
//! ```
//!
//! Diagnostics that stand in for errors (a post after the queue closed, entries
//! discarded at shutdown) are emitted at `warn` level.

use std::fmt::{self, Write as FmtWrite};

use crate::event::{ActivityKind, EventKind};

/// Span names used throughout the dispatch core for tracing.
pub mod span_names {
    /// Execution of one queue entry on its owner thread.
    pub const RUN_EVENT: &str = "horizon_lattice::dispatch::run_event";
    /// A synchronous cross-thread call, from post to release.
    pub const SYNC_CALL: &str = "horizon_lattice::dispatch::sync_call";
    /// Owner thread pump loop.
    pub const PUMP: &str = "horizon_lattice::dispatch::pump";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Crate-wide target.
    pub const DISPATCH: &str = "horizon_lattice_dispatch";
    /// Event queue: posting, coalescing, shutdown.
    pub const QUEUE: &str = "horizon_lattice_dispatch::queue";
    /// Native event pump.
    pub const PUMP: &str = "horizon_lattice_dispatch::pump";
    /// Synchronous cross-thread calls.
    pub const SYNC: &str = "horizon_lattice_dispatch::sync";
    /// Owner lifecycle and shutdown broadcast.
    pub const OWNER: &str = "horizon_lattice_dispatch::owner";
    /// Controller-thread redirection.
    pub const REDIRECT: &str = "horizon_lattice_dispatch::redirect";
    /// Deferred calls and revocation.
    pub const TASK: &str = "horizon_lattice_dispatch::task";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "horizon_lattice::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }

    /// Create a span for running one queue entry of the given kind.
    pub fn for_event(kind: EventKind, activity: ActivityKind) -> Self {
        let span = tracing::trace_span!(
            target: "horizon_lattice::perf",
            "run_event",
            operation = span_names::RUN_EVENT,
            ?kind,
            ?activity
        );
        Self {
            span: span.entered(),
        }
    }
}

/// A point-in-time description of a queue's pending entries.
///
/// Produced by [`EventQueue::snapshot`](crate::EventQueue::snapshot); the
/// `Display` impl renders one line per entry, head first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Pending entries from head to tail.
    pub entries: Vec<(EventKind, ActivityKind)>,
}

impl QueueSnapshot {
    /// Kinds of the pending entries, head first.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.entries.iter().map(|(kind, _)| *kind).collect()
    }

    /// Render the snapshot as a single compact line.
    pub fn compact(&self) -> String {
        let mut output = String::from("[");
        for (i, (kind, _)) in self.entries.iter().enumerate() {
            if i > 0 {
                output.push_str(", ");
            }
            let _ = write!(output, "{kind}");
        }
        output.push(']');
        output
    }
}

impl fmt::Display for QueueSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Event Queue ({} pending):", self.entries.len())?;
        if self.entries.is_empty() {
            return writeln!(f, "  (empty)");
        }
        for (i, (kind, activity)) in self.entries.iter().enumerate() {
            writeln!(f, "  {i:>3}: {kind} ({activity:?})")?;
        }
        Ok(())
    }
}

/// Macros for common tracing patterns.
///
/// These are thin wrappers around the `tracing` macros with the crate target.
#[macro_export]
macro_rules! dispatch_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "horizon_lattice_dispatch", $($arg)*)
    };
}

#[macro_export]
macro_rules! dispatch_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "horizon_lattice_dispatch", $($arg)*)
    };
}

#[macro_export]
macro_rules! dispatch_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "horizon_lattice_dispatch", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_display_empty() {
        let snapshot = QueueSnapshot::default();
        let output = snapshot.to_string();
        assert!(output.contains("0 pending"));
        assert!(output.contains("(empty)"));
    }

    #[test]
    fn test_snapshot_display_entries() {
        let snapshot = QueueSnapshot {
            entries: vec![
                (EventKind::Viewport, ActivityKind::General),
                (EventKind::Motion, ActivityKind::UiInput),
            ],
        };
        let output = snapshot.to_string();
        assert!(output.contains("2 pending"));
        assert!(output.contains("viewport"));
        assert!(output.contains("UiInput"));
        assert_eq!(snapshot.compact(), "[viewport, motion]");
        assert_eq!(snapshot.kinds(), vec![EventKind::Viewport, EventKind::Motion]);
    }

    #[test]
    fn test_targets_are_scoped_under_the_crate() {
        for target in [
            targets::QUEUE,
            targets::PUMP,
            targets::SYNC,
            targets::OWNER,
            targets::REDIRECT,
            targets::TASK,
        ] {
            assert!(target.starts_with(targets::DISPATCH), "{target}");
        }
    }

    #[test]
    fn test_perf_span() {
        // Just ensure it compiles and doesn't panic
        let _span = PerfSpan::new("test_operation");
        let _event = PerfSpan::for_event(EventKind::General, ActivityKind::General);
    }
}
