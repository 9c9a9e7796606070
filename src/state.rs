//! Shared monitor state guarded by the monitor lock.

use std::sync::Arc;

use crate::payload::ConfigPayload;

/// Default version value after which the counter wraps back to zero.
///
/// This is an approximate wraparound guard kept well clear of `u32::MAX`;
/// versions are diagnostic only and never used for ordering decisions.
pub const VERSION_SAFE_RESET: u32 = u32::MAX - 1000;

/// What the worker should do after waking.
///
/// Shutdown takes priority over a pending target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeState {
    /// Nothing pending; keep waiting.
    Idle,
    /// A target is waiting to be taken.
    HasTarget,
    /// Shutdown was requested; the worker must exit.
    ShuttingDown,
}

/// Computes the version following `version`.
///
/// Returns `(next, reset)` where `reset` is true when the counter was at or
/// past `reset_at` and went back to zero.
#[must_use]
pub const fn next_version(version: u32, reset_at: u32) -> (u32, bool) {
    if version >= reset_at {
        (0, true)
    } else {
        (version + 1, false)
    }
}

/// Outcome of installing a new target.
#[derive(Debug)]
pub(crate) struct Installed {
    pub version: u32,
    pub superseded: Option<ConfigPayload>,
    pub version_reset: bool,
}

#[derive(Debug)]
pub(crate) struct SharedState {
    pub current: Option<Arc<ConfigPayload>>,
    pub target: Option<ConfigPayload>,
    pub version: u32,
    pub shutdown: bool,
    reset_at: u32,
}

impl SharedState {
    pub fn new(reset_at: u32) -> Self {
        Self {
            current: None,
            target: None,
            version: 0,
            shutdown: false,
            reset_at,
        }
    }

    pub fn wake_state(&self) -> WakeState {
        if self.shutdown {
            WakeState::ShuttingDown
        } else if self.target.is_some() {
            WakeState::HasTarget
        } else {
            WakeState::Idle
        }
    }

    /// Replaces the target, returning whatever it displaced.
    pub fn install(&mut self, mut payload: ConfigPayload) -> Installed {
        let (version, version_reset) = next_version(self.version, self.reset_at);
        self.version = version;
        payload.set_version(version);
        let superseded = self.target.replace(payload);
        Installed {
            version,
            superseded,
            version_reset,
        }
    }

    pub fn take_target(&mut self) -> Option<ConfigPayload> {
        self.target.take()
    }

    pub fn promote(&mut self, payload: ConfigPayload) {
        self.current = Some(Arc::new(payload));
    }
}
