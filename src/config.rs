//! Monitor configuration.

use serde::{Deserialize, Serialize};

use crate::state::VERSION_SAFE_RESET;

/// Settings for a [`ConfigMonitor`](crate::ConfigMonitor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Name given to the worker thread by `ConfigMonitor::spawn`.
    pub thread_name: String,
    /// Version value after which the counter goes back to zero.
    pub version_reset_at: u32,
    /// Per-subscriber event buffer used by `ConfigMonitor::subscribe`.
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thread_name: "config-monitor".to_string(),
            version_reset_at: VERSION_SAFE_RESET,
            event_capacity: 256,
        }
    }
}

impl MonitorConfig {
    /// Parses a JSON object; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed JSON or mistyped fields.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
