//! # config-monitor
//!
//! Latest-wins configuration updates for running services.
//!
//! Producers push configuration payloads at any rate through a
//! [`ConfigMonitor`]. A single worker takes the most recent one, asks the
//! handler whether it is worth applying relative to the current
//! configuration, and applies it. Apply may be slow (reconnecting,
//! restarting subsystems); producers never wait on it, and any updates that
//! arrive meanwhile collapse into the one pending slot.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use config_monitor::{ConfigMonitor, FnHandler, MonitorConfig};
//!
//! let handler = FnHandler::new(|cfg: &[u8]| {
//!     // reconfigure the service
//!     let _ = cfg;
//! })
//! .with_filter(|new: &[u8], current: Option<&[u8]>| current != Some(new));
//!
//! let monitor = ConfigMonitor::spawn(handler, MonitorConfig::default())?;
//! monitor.update(b"listen=0.0.0.0:8080")?;
//! monitor.update(b"listen=0.0.0.0:9090")?;
//! monitor.shutdown_and_join()?;
//! # Ok::<(), config_monitor::MonitorError>(())
//! ```
//!
//! ## Guarantees
//!
//! - The worker eventually applies the last configuration submitted before
//!   shutdown, unless the filter rejects it. Intermediate ones may never be
//!   seen.
//! - `update` holds the lock only to swap the pending slot.
//! - Shutdown wins over a pending target: a configuration still waiting when
//!   shutdown is observed is dropped.
//! - A failed or panicking apply leaves the current configuration unchanged.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod monitor;
pub mod payload;
pub mod state;
pub mod stats;
pub mod typed;
pub mod worker;

pub use config::MonitorConfig;
pub use error::{ApplyError, MonitorError, MonitorResult};
pub use events::{MonitorEvent, MonitorEventKind, MonitorStream};
pub use handler::{ApplyOutput, ConfigHandler, FnHandler};
pub use monitor::{ConfigMonitor, MonitorHandle};
pub use payload::ConfigPayload;
pub use state::{next_version, WakeState, VERSION_SAFE_RESET};
pub use stats::MonitorStats;
pub use typed::{JsonHandler, TypedHandler};
pub use worker::Worker;
