//! Configuration for owner threads and their queues.

use std::time::Duration;

use crate::error::{DispatchError, Result};
use crate::event::CoalescingRules;
use crate::owner_thread::OwnerThread;

/// Default hang threshold reported by
/// [`TracingHangMonitor`](crate::monitor::TracingHangMonitor).
pub const DEFAULT_HANG_THRESHOLD: Duration = Duration::from_millis(500);

/// Configuration for an owner and its event queue.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Name for the owner, also used as the thread name when spawned.
    pub name: String,
    /// Stack size for a spawned owner thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
    /// Whether consecutive compatible motion entries are merged.
    pub coalesce_motion: bool,
    /// Per-kind coalescing policies.
    pub coalescing: CoalescingRules,
    /// Duration after which a running entry is reported as a hang.
    pub hang_threshold: Duration,
    /// Upper bound on a single idle wait. `None` waits until woken.
    pub idle_poll: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            name: "horizon-dispatch".to_string(),
            stack_size: None,
            coalesce_motion: true,
            coalescing: CoalescingRules::default(),
            hang_threshold: DEFAULT_HANG_THRESHOLD,
            idle_poll: None,
        }
    }
}

impl DispatchConfig {
    /// Create a new configuration with the given owner name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::invalid_config("owner name must not be empty"));
        }
        if self.name.contains('\0') {
            return Err(DispatchError::invalid_config(
                "owner name must not contain NUL bytes",
            ));
        }
        if self.idle_poll == Some(Duration::ZERO) {
            return Err(DispatchError::invalid_config("idle poll must be non-zero"));
        }
        Ok(())
    }
}

/// Builder for [`DispatchConfig`] and spawned owner threads.
#[derive(Debug, Default)]
pub struct DispatchConfigBuilder {
    config: DispatchConfig,
}

impl DispatchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owner name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the stack size for a spawned owner thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Enable or disable merging of consecutive motion entries.
    pub fn coalesce_motion(mut self, enabled: bool) -> Self {
        self.config.coalesce_motion = enabled;
        self
    }

    /// Replace the coalescing rules.
    pub fn coalescing_rules(mut self, rules: CoalescingRules) -> Self {
        self.config.coalescing = rules;
        self
    }

    pub fn hang_threshold(mut self, threshold: Duration) -> Self {
        self.config.hang_threshold = threshold;
        self
    }

    /// Bound each idle wait of the pump.
    pub fn idle_poll(mut self, interval: Duration) -> Self {
        self.config.idle_poll = Some(interval);
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<DispatchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validate the configuration and spawn an owner thread with it.
    pub fn spawn(self) -> Result<OwnerThread> {
        OwnerThread::spawn(self.build()?)
    }
}
