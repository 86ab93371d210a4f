//! Heartbeat monitoring: periodic liveness signals with a debounce floor and
//! a maximum gap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hmon_types::{InvalidRange, Status, TimeRange};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::MonitorError;
use crate::status::{StatusChange, StatusHook, StatusState};

/// Whether a rate-limited signal was taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Beat {
    Accepted,
    /// Arrived sooner than the minimum time after the last accepted one.
    Debounced,
}

#[derive(Debug)]
struct Inner {
    status: StatusState,
    range: TimeRange,
    /// Gap measurement starts here until the first beat is accepted.
    baseline: Instant,
    last_beat: Option<Instant>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<Inner>,
    hook: StatusHook,
}

/// Builder for [`HeartbeatMonitor`].
#[derive(Debug)]
pub struct HeartbeatMonitorBuilder {
    range: TimeRange,
    hook: StatusHook,
}

impl HeartbeatMonitorBuilder {
    /// `range.min` is the debounce threshold, `range.max` the longest
    /// accepted gap between beats.
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            hook: StatusHook::default(),
        }
    }

    /// Call `f(from, to)` after every status transition of the monitor.
    ///
    /// The hook runs after the monitor's lock is released, so it may call
    /// back into the monitor. When several threads change the status at
    /// once their hooks can arrive in a different order than the
    /// transitions happened; read `status()` for the settled value.
    pub fn on_status_change<F>(mut self, f: F) -> Self
    where
        F: Fn(Status, Status) + Send + Sync + 'static,
    {
        self.hook = StatusHook::new(f);
        self
    }

    pub fn build(self) -> HeartbeatMonitor {
        HeartbeatMonitor {
            shared: Arc::new(Shared {
                state: Mutex::new(Inner {
                    status: StatusState::new(),
                    range: self.range,
                    baseline: Instant::now(),
                    last_beat: None,
                }),
                hook: self.hook,
            }),
        }
    }
}

/// Expects a [`heartbeat`](HeartbeatMonitor::heartbeat) at least every
/// `range.max`; the health monitor's evaluation cycle fails it otherwise.
///
/// Cloning yields another handle to the same monitor.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    shared: Arc<Shared>,
}

impl HeartbeatMonitor {
    pub fn heartbeat(&self) -> Beat {
        self.heartbeat_at(Instant::now())
    }

    pub(crate) fn heartbeat_at(&self, now: Instant) -> Beat {
        let mut state = self.shared.state.lock();
        if let Some(last) = state.last_beat {
            if now.saturating_duration_since(last) < state.range.min {
                trace!("heartbeat debounced");
                return Beat::Debounced;
            }
        }
        state.last_beat = Some(now);
        Beat::Accepted
    }

    /// Change the debounce threshold. The maximum gap is left alone.
    pub fn configure_minimum_time(&self, minimum: Duration) -> Result<(), InvalidRange> {
        let mut state = self.shared.state.lock();
        state.range = TimeRange::try_new(minimum, state.range.max)?;
        Ok(())
    }

    pub fn range(&self) -> TimeRange {
        self.shared.state.lock().range
    }

    pub fn status(&self) -> Status {
        self.shared.state.lock().status.status()
    }

    /// Resume monitoring. The gap is measured from now on.
    pub fn enable(&self) -> Result<(), MonitorError> {
        let change = {
            let mut state = self.shared.state.lock();
            let change = state.status.enable()?;
            state.reset(Instant::now());
            change
        };
        self.shared.hook.notify(change);
        Ok(())
    }

    pub fn disable(&self) -> Result<(), MonitorError> {
        let change = self.shared.state.lock().status.disable()?;
        self.shared.hook.notify(change);
        Ok(())
    }

    /// Forget previous beats and measure the gap from `now`.
    pub(crate) fn reset_at(&self, now: Instant) {
        self.shared.state.lock().reset(now);
    }

    /// Fail the monitor if the gap since the last beat exceeds `max`.
    pub(crate) fn evaluate_at(&self, now: Instant) -> Option<StatusChange> {
        let mut state = self.shared.state.lock();
        if !state.status.status().is_running() {
            return None;
        }
        let reference = state.last_beat.unwrap_or(state.baseline);
        let gap = now.saturating_duration_since(reference);
        if gap <= state.range.max {
            return None;
        }

        let change = state.status.fail();
        let max = state.range.max;
        drop(state);
        warn!(
            gap_ms = gap.as_millis() as u64,
            max_ms = max.as_millis() as u64,
            "heartbeat missed"
        );
        self.shared.hook.notify_opt(change);
        change
    }
}

impl Inner {
    fn reset(&mut self, now: Instant) {
        self.baseline = now;
        self.last_beat = None;
    }
}
