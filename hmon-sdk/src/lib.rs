//! # hmon-sdk
//!
//! Process health monitoring engine.
//!
//! An application declares liveness and timing contracts, and this crate
//! keeps checking them:
//!
//! - **Deadline monitors**: an operation must finish within `[min, max]`
//! - **Heartbeat monitors**: a component must signal at least every `max`
//! - **Logic monitors**: a component's mode may only follow declared transitions
//!
//! A [`HealthMonitor`] owns the monitors under string tags, evaluates them on
//! a background thread and publishes an aggregate Running/Disabled/Failed
//! status. What a failure should trigger (restart, abort, alert) is left to
//! whoever reads that status.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hmon_sdk::{
//!     DeadlineMonitorBuilder, HealthMonitor, HeartbeatMonitorBuilder, Output, Status, TimeRange,
//! };
//! use std::time::Duration;
//!
//! let ms = Duration::from_millis;
//!
//! let mut health = HealthMonitor::builder()
//!     .add_deadline_monitor(
//!         "render",
//!         DeadlineMonitorBuilder::new().add_deadline("frame", TimeRange::new(ms(1), ms(40))),
//!     )
//!     .add_heartbeat_monitor("main", HeartbeatMonitorBuilder::new(TimeRange::new(ms(10), ms(500))))
//!     .output(Output::file("health.json"))
//!     .build()
//!     .unwrap();
//!
//! let render = health.get_deadline_monitor("render").unwrap();
//! let main = health.get_heartbeat_monitor("main").unwrap();
//! health.start().unwrap();
//!
//! let mut frame = render.get_deadline("frame").unwrap();
//! while health.status() != Status::Failed {
//!     frame.start().unwrap();
//!     // ... render ...
//!     frame.stop().unwrap();
//!     main.heartbeat();
//! }
//! ```
//!
//! ## Features
//!
//! - `tokio` (default): channel outputs and report subscriptions

pub mod boundary;
pub mod config;
pub mod hash;

mod alive;
mod deadline;
mod error;
mod heartbeat;
mod logic;
mod monitor;
mod output;
mod status;
mod supervision;

pub use alive::{AliveApi, AliveSignal};
pub use deadline::{
    Deadline, DeadlineMonitor, DeadlineMonitorBuilder, DeadlineOutcome, DeadlineState,
    DeadlineVerdict,
};
pub use error::{
    BoundaryError, BuildError, ConfigError, InitError, MonitorError, StartError, SupervisionError,
};
pub use hash::{IdentifierHash, IdentifierRegistry};
pub use heartbeat::{Beat, HeartbeatMonitor, HeartbeatMonitorBuilder};
pub use logic::{LogicMonitor, LogicMonitorBuilder};
pub use monitor::{
    HealthMonitor, HealthMonitorBuilder, DEFAULT_INTERNAL_PROCESSING_CYCLE,
    DEFAULT_SUPERVISOR_API_CYCLE,
};
pub use output::Output;
pub use status::{StatusChange, StatusState};
pub use supervision::{StopToken, Supervised, SupervisionThread};

// Re-export types for convenience
pub use hmon_types::{
    DeadlineTag, HealthReport, InvalidRange, MonitorKind, MonitorReport, MonitorTag, Status,
    TimeRange,
};
