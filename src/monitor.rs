//! Producer-facing monitor handle.
//!
//! `ConfigMonitor` is cheap to clone and can be shared by any number of
//! producer threads. Each `update` copies the caller's bytes, swaps them into
//! the single target slot and signals the worker; it never waits on a filter
//! or apply call.

use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::events::{EventBus, MonitorEvent, MonitorEventKind, MonitorStream};
use crate::handler::ConfigHandler;
use crate::payload::ConfigPayload;
use crate::state::SharedState;
use crate::stats::{Counters, MonitorStats};
use crate::worker::Worker;

#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<SharedState>,
    pub wake: Condvar,
    pub counters: Counters,
    pub events: EventBus,
    pub config: MonitorConfig,
}

impl Shared {
    // Handlers run outside the lock and every critical section is a plain
    // field swap, so a poisoned lock still guards consistent state.
    pub fn lock_state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle used by producers to submit configurations.
#[derive(Debug, Clone)]
pub struct ConfigMonitor {
    shared: Arc<Shared>,
}

impl ConfigMonitor {
    /// Creates a monitor and its worker.
    ///
    /// The caller runs [`Worker::run`] on a dedicated thread, or uses
    /// [`ConfigMonitor::spawn`] instead. There is exactly one worker per
    /// monitor.
    pub fn new<H: ConfigHandler>(handler: H, config: MonitorConfig) -> (Self, Worker<H>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(SharedState::new(config.version_reset_at)),
            wake: Condvar::new(),
            counters: Counters::default(),
            events: EventBus::default(),
            config,
        });
        let worker = Worker::new(Arc::clone(&shared), handler);
        (Self { shared }, worker)
    }

    /// Creates a monitor and starts its worker on a named thread.
    ///
    /// The returned handle shuts the worker down and joins it when dropped.
    ///
    /// # Errors
    ///
    /// [`MonitorError::Spawn`] if the operating system refuses to create the
    /// worker thread.
    pub fn spawn<H>(handler: H, config: MonitorConfig) -> MonitorResult<MonitorHandle>
    where
        H: ConfigHandler + 'static,
    {
        let name = config.thread_name.clone();
        let (monitor, worker) = Self::new(handler, config);
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run())
            .map_err(|source| MonitorError::Spawn {
                name: name.clone(),
                source,
            })?;
        Ok(MonitorHandle {
            monitor,
            join: Some(join),
            name,
        })
    }

    /// Submits a new configuration, replacing any pending one.
    ///
    /// Returns the version the update was accepted under. Updates after
    /// [`shutdown`](Self::shutdown) are accepted but never applied.
    ///
    /// # Errors
    ///
    /// [`MonitorError::ResourceExhausted`] if the copy of `bytes` cannot be
    /// allocated. The pending target and current configuration are untouched.
    pub fn update(&self, bytes: &[u8]) -> MonitorResult<u32> {
        let payload = ConfigPayload::copy_from(bytes, 0)?;
        Ok(self.install(payload))
    }

    /// Serializes `value` as JSON and submits it.
    ///
    /// # Errors
    ///
    /// [`MonitorError::Encode`] if `value` cannot be serialized. Nothing is
    /// installed in that case.
    pub fn update_json<T: Serialize + ?Sized>(&self, value: &T) -> MonitorResult<u32> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.install(ConfigPayload::from_vec(bytes, 0)))
    }

    fn install(&self, payload: ConfigPayload) -> u32 {
        let digest = payload.short_digest();
        let mut state = self.shared.lock_state();
        let installed = state.install(payload);
        let version = installed.version;
        let after_shutdown = state.shutdown;

        // Published under the state lock: the worker cannot take this target,
        // and so cannot report it applied, before these events are queued.
        if installed.version_reset {
            self.shared
                .events
                .publish(MonitorEvent::bare(0, MonitorEventKind::VersionReset));
        }
        if let Some(old) = &installed.superseded {
            self.shared
                .events
                .publish(MonitorEvent::for_payload(old, MonitorEventKind::Superseded));
        }
        self.shared.events.publish(MonitorEvent {
            version,
            kind: MonitorEventKind::Accepted,
            digest: Some(digest.clone()),
            at: chrono::Utc::now(),
        });
        Counters::bump(&self.shared.counters.accepted);
        self.shared.wake.notify_one();
        drop(state);

        if installed.version_reset {
            Counters::bump(&self.shared.counters.version_resets);
            warn!(
                reset_at = self.shared.config.version_reset_at,
                "reset version to 0 to prevent overflow"
            );
        }
        // The displaced payload is released here, outside the lock.
        if let Some(old) = installed.superseded {
            Counters::bump(&self.shared.counters.superseded);
            debug!(
                superseded = old.version(),
                by = version,
                "pending configuration superseded"
            );
        }
        if after_shutdown {
            debug!(version, "configuration accepted after shutdown; it will not be applied");
        } else {
            debug!(version, digest = %digest, "configuration accepted");
        }
        version
    }

    /// Requests worker shutdown. Idempotent.
    ///
    /// An apply in progress runs to completion; a pending target is left
    /// unconsumed.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock_state();
        state.shutdown = true;
        self.shared.wake.notify_all();
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.lock_state().shutdown
    }

    /// The last configuration that passed the filter and was applied.
    #[must_use]
    pub fn current(&self) -> Option<Arc<ConfigPayload>> {
        self.shared.lock_state().current.clone()
    }

    /// Version of the most recently accepted update.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.shared.lock_state().version
    }

    /// Returns true while a target is waiting for the worker.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.shared.lock_state().target.is_some()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        self.shared.counters.snapshot(self.shared.events.dropped())
    }

    /// Subscribes to events with the configured buffer capacity.
    #[must_use]
    pub fn subscribe(&self) -> MonitorStream {
        self.subscribe_with_capacity(self.shared.config.event_capacity)
    }

    /// Subscribes to events with an explicit buffer capacity.
    #[must_use]
    pub fn subscribe_with_capacity(&self, capacity: usize) -> MonitorStream {
        self.shared.events.subscribe(capacity)
    }

    /// The configuration this monitor was created with.
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }
}

/// A monitor whose worker runs on a thread owned by this handle.
///
/// Dropping the handle requests shutdown and joins the worker, which waits
/// for any apply in progress.
#[derive(Debug)]
pub struct MonitorHandle {
    monitor: ConfigMonitor,
    join: Option<JoinHandle<()>>,
    name: String,
}

impl MonitorHandle {
    /// A producer handle that can be cloned into other threads.
    #[must_use]
    pub fn monitor(&self) -> &ConfigMonitor {
        &self.monitor
    }

    /// Requests shutdown and waits for the worker to exit.
    ///
    /// # Errors
    ///
    /// [`MonitorError::WorkerPanicked`] if the worker thread panicked outside
    /// a handler call.
    pub fn shutdown_and_join(mut self) -> MonitorResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> MonitorResult<()> {
        self.monitor.shutdown();
        match self.join.take() {
            Some(join) => join.join().map_err(|_| MonitorError::WorkerPanicked {
                name: self.name.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Deref for MonitorHandle {
    type Target = ConfigMonitor;

    fn deref(&self) -> &ConfigMonitor {
        &self.monitor
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "config monitor worker did not stop cleanly");
        }
    }
}
