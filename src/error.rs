//! Error types for config-monitor.
//!
//! Producer-visible errors are deliberately few: `update` only fails when the
//! payload copy cannot be allocated or a typed payload cannot be encoded.
//! Handler failures never surface here; the worker logs them and keeps running.

use thiserror::Error;

/// Failure reported by an apply routine.
///
/// A failed apply leaves the monitor's current configuration unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("apply failed: {reason}")]
pub struct ApplyError {
    reason: String,
}

impl ApplyError {
    /// Creates an apply error with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason given by the apply routine.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Top-level error type for config-monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to allocate {requested} bytes for a configuration payload")]
    ResourceExhausted {
        requested: usize,
    },

    #[error("Failed to encode configuration: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker thread '{name}' panicked")]
    WorkerPanicked {
        name: String,
    },

    #[error("Disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

impl MonitorError {
    /// Returns true if the error is an allocation failure.
    #[must_use]
    pub const fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }

    /// Returns true if the error is a receive timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if the other side of a channel or thread has gone away.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::WorkerPanicked { .. })
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. } | Self::Timeout { .. })
    }
}

/// Result type alias for config-monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
