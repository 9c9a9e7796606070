//! Diagnostic events and subscriber streams.
//!
//! Events are fanned out over bounded channels with `try_send`. A slow or
//! vanished subscriber loses events (counted in `dropped_events`) and never
//! stalls the worker or a producer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::Serialize;

use crate::error::{MonitorError, MonitorResult};
use crate::payload::ConfigPayload;

/// What happened to a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEventKind {
    /// A new target was installed.
    Accepted,
    /// A pending target was replaced before the worker took it.
    Superseded,
    /// The version counter went back to zero.
    VersionReset,
    /// The filter rejected the candidate; `current` is unchanged.
    Skipped,
    /// The candidate was applied and is now `current`.
    Applied,
    /// Apply reported an error or panicked; `current` is unchanged.
    ApplyFailed {
        reason: String,
    },
    /// The filter panicked; the candidate was skipped.
    FilterPanicked {
        reason: String,
    },
    /// The worker observed shutdown and exited.
    WorkerStopped {
        /// Version of a target left unconsumed at shutdown.
        abandoned: Option<u32>,
    },
}

/// A single diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorEvent {
    /// Version of the configuration the event concerns.
    pub version: u32,
    /// Event kind.
    #[serde(flatten)]
    pub kind: MonitorEventKind,
    /// Short payload digest, when a payload is involved.
    pub digest: Option<String>,
    /// When the event was recorded.
    pub at: DateTime<Utc>,
}

impl MonitorEvent {
    pub(crate) fn for_payload(payload: &ConfigPayload, kind: MonitorEventKind) -> Self {
        Self {
            version: payload.version(),
            kind,
            digest: Some(payload.short_digest()),
            at: Utc::now(),
        }
    }

    pub(crate) fn bare(version: u32, kind: MonitorEventKind) -> Self {
        Self {
            version,
            kind,
            digest: None,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<Sender<MonitorEvent>>>,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn subscribe(&self, capacity: usize) -> MonitorStream {
        let (tx, rx) = bounded(capacity.max(1));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        MonitorStream { rx }
    }

    pub fn publish(&self, event: MonitorEvent) {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if subs.is_empty() {
            return;
        }
        subs.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A subscription to monitor events.
///
/// Dropping the stream unsubscribes; the sender is pruned on the next publish.
#[derive(Debug)]
pub struct MonitorStream {
    rx: Receiver<MonitorEvent>,
}

impl MonitorStream {
    /// Receive the next event (blocking).
    ///
    /// # Errors
    ///
    /// [`MonitorError::Disconnected`] once the monitor is gone and the buffer
    /// is drained.
    pub fn recv(&self) -> MonitorResult<MonitorEvent> {
        self.rx.recv().map_err(|_| MonitorError::Disconnected {
            path: "monitor_stream".to_string(),
        })
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    ///
    /// [`MonitorError::Timeout`] if nothing arrives in time,
    /// [`MonitorError::Disconnected`] if the monitor is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> MonitorResult<MonitorEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => MonitorError::Timeout {
                duration_ms: millis(timeout),
            },
            RecvTimeoutError::Disconnected => MonitorError::Disconnected {
                path: "monitor_stream".to_string(),
            },
        })
    }

    /// Returns the next buffered event, if any.
    pub fn try_recv(&self) -> Option<MonitorEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits until an event matching `pred` arrives, discarding others.
    ///
    /// # Errors
    ///
    /// Same as [`recv_timeout`](Self::recv_timeout), with the timeout covering
    /// the whole wait.
    pub fn wait_for<P>(&self, timeout: Duration, mut pred: P) -> MonitorResult<MonitorEvent>
    where
        P: FnMut(&MonitorEvent) -> bool,
    {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Err(MonitorError::Timeout {
                    duration_ms: millis(timeout),
                });
            }
            let event = self.recv_timeout(remaining)?;
            if pred(&event) {
                return Ok(event);
            }
        }
    }
}

fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
