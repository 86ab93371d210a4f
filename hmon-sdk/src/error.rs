//! Error types for the monitoring engine.

use std::time::Duration;

use hmon_types::{DeadlineTag, InvalidRange, MonitorTag};
use thiserror::Error;

use crate::hash::IdentifierHash;

/// Caller-protocol errors returned by monitor operations.
///
/// Timing violations are not errors: they show up as a failed status and a
/// [`DeadlineVerdict`](crate::DeadlineVerdict).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// `enable()` on a monitor that is already running.
    #[error("monitor is already enabled")]
    AlreadyEnabled,

    /// `disable()` on a monitor that is already disabled.
    #[error("monitor is already disabled")]
    AlreadyDisabled,

    /// The monitor has failed and rejects the operation.
    #[error("monitor has failed")]
    Failed,

    /// A logic transition was requested while the monitor is disabled.
    #[error("operation not allowed while the monitor is disabled")]
    NotAllowed,

    /// A logic transition outside the declared transition set.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: IdentifierHash,
        to: IdentifierHash,
    },

    /// `stop()` on a deadline that was never started.
    #[error("deadline was not started")]
    DeadlineNotStarted,

    /// `start()` on a deadline that is already running.
    #[error("deadline is already started")]
    DeadlineAlreadyStarted,

    /// No deadline range registered under this tag.
    #[error("no deadline registered as {0}")]
    DeadlineNotFound(DeadlineTag),

    /// Another live deadline was already handed out for this tag.
    #[error("deadline {0} is in use")]
    DeadlineInUse(DeadlineTag),

    /// No monitor of the requested kind registered under this tag.
    #[error("no monitor registered as {0}")]
    NotFound(MonitorTag),
}

/// Errors returned when building a health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The internal processing cycle must be non-zero.
    #[error("internal processing cycle must be greater than zero")]
    ZeroInternalCycle,

    /// The supervisor cycle is not a whole multiple of the internal cycle.
    #[error("supervisor cycle {supervisor:?} is not a multiple of the internal cycle {internal:?}")]
    SupervisorCycleNotMultiple {
        supervisor: Duration,
        internal: Duration,
    },
}

/// Errors returned by [`HealthMonitor::start`](crate::HealthMonitor::start).
#[derive(Debug, Error)]
pub enum StartError {
    /// Nothing was registered; there is nothing to supervise.
    #[error("health monitor has no monitors")]
    NoMonitors,

    /// The monitoring loop was already started.
    #[error("health monitor was already started")]
    AlreadyStarted,

    /// The monitoring thread could not be brought up.
    #[error(transparent)]
    Supervision(#[from] SupervisionError),
}

/// Failure reported by a supervised component's `init()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InitError(String);

impl InitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Errors returned by [`SupervisionThread`](crate::SupervisionThread).
#[derive(Debug, Error)]
pub enum SupervisionError {
    /// `start()` was already called once.
    #[error("supervision thread was already started")]
    AlreadyStarted,

    /// The operating system refused to spawn the thread.
    #[error("failed to spawn supervision thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The component's `init()` failed; `run()` was never called.
    #[error("supervised component failed to initialize: {0}")]
    InitFailed(#[source] InitError),
}

/// Errors returned by the handle-based [`boundary`](crate::boundary) API.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// The handle was already consumed or destroyed.
    #[error("stale handle")]
    StaleHandle,

    /// The handle refers to an object of a different kind.
    #[error("handle refers to a different kind of object")]
    WrongKind,

    #[error(transparent)]
    InvalidRange(#[from] InvalidRange),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Start(#[from] StartError),
}

/// Errors raised while loading a [`HealthMonitorConfig`](crate::config::HealthMonitorConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A monitor declares a range with `min > max`.
    #[error("monitor {monitor}: {source}")]
    InvalidRange {
        monitor: String,
        #[source]
        source: InvalidRange,
    },
}
