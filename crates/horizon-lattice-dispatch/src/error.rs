//! Error types for Horizon Lattice dispatch.
//!
//! The dispatch paths themselves never fail towards a producer: a revoked call,
//! a post after close, or a synchronous call against a departed owner all
//! resolve to "did nothing". Errors only surface from setup and teardown
//! operations such as spawning an owner thread.

use std::io;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors reported by owner setup and teardown.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The operating system refused to spawn an owner thread.
    #[error("Failed to spawn owner thread '{name}': {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The owner thread exited before it reported ready.
    #[error("Owner thread exited before it became ready")]
    OwnerGone,

    /// The owner thread panicked while running its pump.
    #[error("Owner thread '{name}' panicked")]
    OwnerPanicked { name: String },

    /// A configuration value was rejected.
    #[error("Invalid dispatch configuration: {0}")]
    InvalidConfig(String),
}

impl DispatchError {
    /// Create a thread spawn error.
    pub fn thread_spawn(name: impl Into<String>, source: io::Error) -> Self {
        Self::ThreadSpawn {
            name: name.into(),
            source,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
