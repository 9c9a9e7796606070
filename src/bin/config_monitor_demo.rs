//! Pushes three configurations at a monitor whose apply takes two seconds.
//!
//! The second update lands while the first is still applying; depending on
//! timing it is either applied next or superseded by the third. Run with
//! `RUST_LOG=debug` to see supersedes.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config_monitor::{
    ApplyError, ConfigMonitor, JsonHandler, MonitorConfig, MonitorResult, TypedHandler,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DemoConfig {
    mode: i32,
    param: i32,
}

struct SlowBackend;

impl TypedHandler<DemoConfig> for SlowBackend {
    fn filter(&mut self, candidate: &DemoConfig, previous: Option<&DemoConfig>) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        candidate.mode != previous.mode || (candidate.param - previous.param).abs() > 5
    }

    fn apply(&mut self, config: &DemoConfig) -> Result<(), ApplyError> {
        info!(mode = config.mode, param = config.param, "apply start");
        thread::sleep(Duration::from_secs(2));
        info!(mode = config.mode, param = config.param, "apply end");
        Ok(())
    }
}

fn main() -> MonitorResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let monitor = ConfigMonitor::spawn(JsonHandler::new(SlowBackend), MonitorConfig::default())?;

    monitor.update_json(&DemoConfig { mode: 1, param: 1 })?;
    thread::sleep(Duration::from_secs(1));
    monitor.update_json(&DemoConfig { mode: 2, param: 10 })?;
    thread::sleep(Duration::from_secs(1));
    monitor.update_json(&DemoConfig { mode: 3, param: 20 })?;
    thread::sleep(Duration::from_secs(5));

    let stats = monitor.stats();
    info!(
        accepted = stats.accepted,
        applied = stats.applied,
        superseded = stats.superseded,
        skipped = stats.skipped,
        "demo finished"
    );
    monitor.shutdown_and_join()
}
