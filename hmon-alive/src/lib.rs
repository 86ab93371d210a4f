//! # hmon-alive
//!
//! Backends that forward the hmon alive signal to something outside the
//! process.
//!
//! ## Supported Backends
//!
//! - **Log** - Records every keep-alive through `tracing`; useful during
//!   development and in tests
//! - **systemd** (`systemd` feature) - Sends `WATCHDOG=1` to the service
//!   manager and `READY=1` once the process is up
//!
//! ## Quick Start (systemd)
//!
//! ```rust,ignore
//! use hmon_alive::systemd::{notify_ready, SystemdWatchdog};
//! use hmon_sdk::{AliveSignal, HealthMonitor};
//! use std::time::Duration;
//!
//! let mut health = HealthMonitor::builder()
//!     // ... monitors ...
//!     .alive_signal(AliveSignal::new(SystemdWatchdog::new()).with_minimum_time(Duration::from_millis(500)))
//!     .build()?;
//!
//! health.start()?;
//! notify_ready()?;
//! ```

pub mod error;
pub mod log;

#[cfg(feature = "systemd")]
pub mod systemd;

pub use error::AliveError;
pub use log::LogWatchdog;

// Re-export types for convenience
pub use hmon_sdk::{AliveApi, AliveSignal};
