//! The single consumer: waits for a target, takes it, runs filter and apply.
//!
//! Each wake resolves to a [`WakeState`]. Shutdown is checked before the
//! target, so a target still pending at shutdown is never applied. Filter and
//! apply run with the lock released; a producer can replace the target many
//! times during one apply and the worker only sees whatever is in the slot at
//! its next wake.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError};

use tracing::{debug, info, warn};

use crate::error::ApplyError;
use crate::events::{MonitorEvent, MonitorEventKind};
use crate::handler::ConfigHandler;
use crate::monitor::Shared;
use crate::payload::ConfigPayload;
use crate::state::WakeState;
use crate::stats::Counters;

/// The monitor's worker. Created by [`ConfigMonitor::new`](crate::ConfigMonitor::new).
///
/// `run` consumes the worker, so a monitor can only ever have one.
pub struct Worker<H> {
    shared: Arc<Shared>,
    handler: H,
}

impl<H: ConfigHandler> Worker<H> {
    pub(crate) fn new(shared: Arc<Shared>, handler: H) -> Self {
        Self { shared, handler }
    }

    /// Runs until shutdown is requested. Intended as the body of a dedicated
    /// thread.
    ///
    /// Handler errors and panics are logged and counted; they never end the
    /// loop.
    pub fn run(mut self) {
        debug!("config monitor worker started");
        let abandoned = loop {
            let candidate = {
                let guard = self.shared.lock_state();
                let mut state = self
                    .shared
                    .wake
                    .wait_while(guard, |s| s.wake_state() == WakeState::Idle)
                    .unwrap_or_else(PoisonError::into_inner);

                match state.wake_state() {
                    WakeState::ShuttingDown => {
                        break state.target.as_ref().map(ConfigPayload::version);
                    }
                    WakeState::Idle => continue,
                    WakeState::HasTarget => match state.take_target() {
                        Some(candidate) => candidate,
                        None => continue,
                    },
                }
            };
            self.process(candidate);
        };

        match abandoned {
            Some(version) => info!(
                version,
                "config monitor worker stopped with a pending configuration"
            ),
            None => info!("config monitor worker stopped"),
        }
        self.shared
            .events
            .publish(MonitorEvent::bare(0, MonitorEventKind::WorkerStopped { abandoned }));
    }

    fn process(&mut self, candidate: ConfigPayload) {
        let version = candidate.version();
        let previous = self.shared.lock_state().current.clone();

        let accepted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler
                .filter(candidate.as_bytes(), previous.as_deref().map(ConfigPayload::as_bytes))
        }));
        let accepted = match accepted {
            Ok(accepted) => accepted,
            Err(panic) => {
                let reason = panic_message(&*panic);
                Counters::bump(&self.shared.counters.handler_panics);
                Counters::bump(&self.shared.counters.skipped);
                warn!(version, %reason, "filter panicked; skipping configuration");
                self.shared.events.publish(MonitorEvent::for_payload(
                    &candidate,
                    MonitorEventKind::FilterPanicked { reason },
                ));
                return;
            }
        };
        drop(previous);

        if !accepted {
            Counters::bump(&self.shared.counters.skipped);
            info!(version, "skipped version {version}");
            self.shared
                .events
                .publish(MonitorEvent::for_payload(&candidate, MonitorEventKind::Skipped));
            return;
        }

        let applied =
            panic::catch_unwind(AssertUnwindSafe(|| self.handler.apply(candidate.as_bytes())))
                .unwrap_or_else(|panic| {
                    Counters::bump(&self.shared.counters.handler_panics);
                    Err(ApplyError::new(format!(
                        "apply panicked: {}",
                        panic_message(&*panic)
                    )))
                });

        match applied {
            Ok(()) => {
                let event = MonitorEvent::for_payload(&candidate, MonitorEventKind::Applied);
                info!(
                    version,
                    digest = %candidate.short_digest(),
                    len = candidate.len(),
                    "applied configuration"
                );
                self.shared.lock_state().promote(candidate);
                Counters::bump(&self.shared.counters.applied);
                self.shared.events.publish(event);
            }
            Err(err) => {
                Counters::bump(&self.shared.counters.apply_failures);
                warn!(version, error = %err, "apply failed; keeping current configuration");
                self.shared.events.publish(MonitorEvent::for_payload(
                    &candidate,
                    MonitorEventKind::ApplyFailed {
                        reason: err.reason().to_string(),
                    },
                ));
            }
        }
    }
}

impl<H> std::fmt::Debug for Worker<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
