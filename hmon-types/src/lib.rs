//! # hmon-types
//!
//! Core types for process health monitoring. This crate defines the vocabulary
//! shared by the monitoring engine, its supervisors and anything that reads the
//! reports it publishes.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable `serde` to emit reports as JSON/YAML/etc.
//! - **Cheap identifiers**: Tags clone without copying their text
//! - **Versioned reports**: Reports include version info for forward compatibility
//!
//! ## Features
//!
//! - `std` (default): Standard library support (wall-clock report timestamps)
//! - `serde`: Serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use hmon_types::{HealthReport, MonitorKind, Status, TimeRange};
//! use std::time::Duration;
//!
//! let range = TimeRange::new(Duration::from_millis(10), Duration::from_millis(100));
//! assert!(range.contains(Duration::from_millis(50)));
//!
//! let report = HealthReport::builder()
//!     .monitor("camera-pipeline", MonitorKind::Deadline, Status::Running)
//!     .monitor("radar-alive", MonitorKind::Heartbeat, Status::Failed)
//!     .build();
//!
//! assert_eq!(report.status, Status::Failed);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**. The version is included in serialized
//! reports so supervisors can handle format evolution gracefully.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod range;
mod report;
mod status;
mod tag;
mod version;

pub use range::*;
pub use report::*;
pub use status::*;
pub use tag::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the report format.
pub const SCHEMA_VERSION: u32 = 1;
