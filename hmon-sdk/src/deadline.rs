//! Deadline monitoring: timed operations checked against a [min, max] window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hmon_types::{DeadlineTag, RangeCheck, Status, TimeRange};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::MonitorError;
use crate::status::{StatusChange, StatusHook, StatusState};

/// How a stopped deadline was judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadlineVerdict {
    /// Elapsed time within `[min, max]`.
    InRange,
    /// Stopped before `min`; the monitor failed.
    TooEarly,
    /// Stopped after `max`; the monitor failed.
    TooLate,
    /// The monitor was disabled, so nothing was checked.
    Skipped,
}

impl DeadlineVerdict {
    pub fn is_violation(&self) -> bool {
        matches!(self, DeadlineVerdict::TooEarly | DeadlineVerdict::TooLate)
    }
}

impl From<RangeCheck> for DeadlineVerdict {
    fn from(check: RangeCheck) -> Self {
        match check {
            RangeCheck::TooEarly => DeadlineVerdict::TooEarly,
            RangeCheck::InRange => DeadlineVerdict::InRange,
            RangeCheck::TooLate => DeadlineVerdict::TooLate,
        }
    }
}

/// Result of [`Deadline::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineOutcome {
    pub elapsed: Duration,
    pub verdict: DeadlineVerdict,
}

/// Lifecycle of a single deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadlineState {
    Created,
    Started,
    Stopped,
    /// Ran past `max` and was caught by the evaluation cycle.
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Created,
    Started(Instant),
    Stopped,
    TimedOut(Instant),
}

impl Phase {
    fn state(&self) -> DeadlineState {
        match self {
            Phase::Created => DeadlineState::Created,
            Phase::Started(_) => DeadlineState::Started,
            Phase::Stopped => DeadlineState::Stopped,
            Phase::TimedOut(_) => DeadlineState::TimedOut,
        }
    }
}

#[derive(Debug)]
struct Slot {
    range: TimeRange,
    tag: Option<DeadlineTag>,
    phase: Phase,
}

#[derive(Debug)]
struct Inner {
    status: StatusState,
    next_id: u64,
    slots: HashMap<u64, Slot>,
}

#[derive(Debug)]
struct Shared {
    registered: HashMap<DeadlineTag, TimeRange>,
    state: Mutex<Inner>,
    hook: StatusHook,
}

/// Builder for [`DeadlineMonitor`].
#[derive(Debug, Default)]
pub struct DeadlineMonitorBuilder {
    registered: HashMap<DeadlineTag, TimeRange>,
    hook: StatusHook,
}

impl DeadlineMonitorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named deadline range, later handed out by
    /// [`DeadlineMonitor::get_deadline`]. A repeated tag replaces the range.
    pub fn add_deadline(mut self, tag: impl Into<DeadlineTag>, range: TimeRange) -> Self {
        self.registered.insert(tag.into(), range);
        self
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

    pub fn build(self) -> DeadlineMonitor {
        DeadlineMonitor {
            shared: Arc::new(Shared {
                registered: self.registered,
                state: Mutex::new(Inner {
                    status: StatusState::new(),
                    next_id: 0,
                    slots: HashMap::new(),
                }),
                hook: self.hook,
            }),
        }
    }
}

/// Tracks any number of concurrently running [`Deadline`]s that all feed one
/// shared status.
///
/// Cloning yields another handle to the same monitor.
///
/// # Example
///
/// ```rust
/// use hmon_sdk::{DeadlineMonitorBuilder, DeadlineVerdict, Status, TimeRange};
/// use std::time::Duration;
///
/// let monitor = DeadlineMonitorBuilder::new().build();
/// let mut deadline = monitor.new_deadline(TimeRange::new(
///     Duration::ZERO,
///     Duration::from_secs(5),
/// ));
///
/// deadline.start().unwrap();
/// let outcome = deadline.stop().unwrap();
/// assert_eq!(outcome.verdict, DeadlineVerdict::InRange);
/// assert_eq!(monitor.status(), Status::Running);
/// ```
#[derive(Debug, Clone)]
pub struct DeadlineMonitor {
    shared: Arc<Shared>,
}

impl DeadlineMonitor {
    /// Create an ad-hoc deadline for `range`.
    pub fn new_deadline(&self, range: TimeRange) -> Deadline {
        let id = self.insert_slot(range, None);
        Deadline {
            shared: Arc::clone(&self.shared),
            id,
            range,
        }
    }

    /// Hand out the deadline registered under `tag`.
    ///
    /// Only one live [`Deadline`] exists per tag; dropping it frees the tag.
    pub fn get_deadline(&self, tag: impl Into<DeadlineTag>) -> Result<Deadline, MonitorError> {
        let tag = tag.into();
        let range = *self
            .shared
            .registered
            .get(&tag)
            .ok_or_else(|| MonitorError::DeadlineNotFound(tag.clone()))?;

        let mut state = self.shared.state.lock();
        if state
            .slots
            .values()
            .any(|slot| slot.tag.as_ref() == Some(&tag))
        {
            return Err(MonitorError::DeadlineInUse(tag));
        }
        let id = state.allocate(range, Some(tag));
        drop(state);

        Ok(Deadline {
            shared: Arc::clone(&self.shared),
            id,
            range,
        })
    }

    pub fn status(&self) -> Status {
        self.shared.state.lock().status.status()
    }

    /// Re-enable checking. Deadlines already running are measured from now
    /// on, so time spent disabled never counts against `max`.
    pub fn enable(&self) -> Result<(), MonitorError> {
        self.enable_at(Instant::now())
    }

    pub(crate) fn enable_at(&self, now: Instant) -> Result<(), MonitorError> {
        let mut state = self.shared.state.lock();
        let change = state.status.enable()?;
        for slot in state.slots.values_mut() {
            if let Phase::Started(_) = slot.phase {
                slot.phase = Phase::Started(now);
            }
        }
        drop(state);
        self.shared.hook.notify(change);
        Ok(())
    }

    pub fn disable(&self) -> Result<(), MonitorError> {
        let change = self.shared.state.lock().status.disable()?;
        self.shared.hook.notify(change);
        Ok(())
    }

    /// Number of deadlines currently alive (in any phase).
    pub fn active_deadlines(&self) -> usize {
        self.shared.state.lock().slots.len()
    }

    /// Fail the monitor if any running deadline has exceeded its `max`.
    pub(crate) fn evaluate_at(&self, now: Instant) -> Option<StatusChange> {
        let mut state = self.shared.state.lock();
        if !state.status.status().is_running() {
            return None;
        }

        let mut overdue = 0usize;
        for slot in state.slots.values_mut() {
            if let Phase::Started(started) = slot.phase {
                if now.saturating_duration_since(started) > slot.range.max {
                    slot.phase = Phase::TimedOut(started);
                    overdue += 1;
                }
            }
        }
        if overdue == 0 {
            return None;
        }

        let change = state.status.fail();
        drop(state);
        warn!(overdue, "deadline exceeded while still running");
        self.shared.hook.notify_opt(change);
        change
    }

    fn insert_slot(&self, range: TimeRange, tag: Option<DeadlineTag>) -> u64 {
        self.shared.state.lock().allocate(range, tag)
    }
}

impl Inner {
    fn allocate(&mut self, range: TimeRange, tag: Option<DeadlineTag>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.insert(
            id,
            Slot {
                range,
                tag,
                phase: Phase::Created,
            },
        );
        id
    }
}

/// One timed operation against a [`DeadlineMonitor`].
///
/// Move-only. A deadline can be started and stopped repeatedly; each stop
/// is judged against the range on its own.
#[derive(Debug)]
pub struct Deadline {
    shared: Arc<Shared>,
    id: u64,
    range: TimeRange,
}

impl Deadline {
    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn state(&self) -> DeadlineState {
        self.with_slot(|slot| slot.phase.state())
            .unwrap_or(DeadlineState::Stopped)
    }

    /// Tag this deadline was registered under, if any.
    pub fn tag(&self) -> Option<DeadlineTag> {
        self.with_slot(|slot| slot.tag.clone()).flatten()
    }

    pub fn start(&mut self) -> Result<(), MonitorError> {
        self.start_at(Instant::now())
    }

    pub fn stop(&mut self) -> Result<DeadlineOutcome, MonitorError> {
        self.stop_at(Instant::now())
    }

    pub(crate) fn start_at(&mut self, now: Instant) -> Result<(), MonitorError> {
        let mut state = self.shared.state.lock();
        let slot = state
            .slots
            .get_mut(&self.id)
            .ok_or(MonitorError::DeadlineNotStarted)?;
        match slot.phase {
            Phase::Started(_) | Phase::TimedOut(_) => Err(MonitorError::DeadlineAlreadyStarted),
            Phase::Created | Phase::Stopped => {
                slot.phase = Phase::Started(now);
                Ok(())
            }
        }
    }

    pub(crate) fn stop_at(&mut self, now: Instant) -> Result<DeadlineOutcome, MonitorError> {
        let mut state = self.shared.state.lock();
        let slot = state
            .slots
            .get_mut(&self.id)
            .ok_or(MonitorError::DeadlineNotStarted)?;
        let started = match slot.phase {
            Phase::Started(started) | Phase::TimedOut(started) => started,
            Phase::Created | Phase::Stopped => return Err(MonitorError::DeadlineNotStarted),
        };
        slot.phase = Phase::Stopped;

        let elapsed = now.saturating_duration_since(started);
        if state.status.status() == Status::Disabled {
            return Ok(DeadlineOutcome {
                elapsed,
                verdict: DeadlineVerdict::Skipped,
            });
        }

        let verdict = DeadlineVerdict::from(self.range.check(elapsed));
        let change = if verdict.is_violation() {
            state.status.fail()
        } else {
            None
        };
        drop(state);

        if verdict.is_violation() {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                range = %self.range,
                ?verdict,
                "deadline missed"
            );
        } else {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "deadline met");
        }
        self.shared.hook.notify_opt(change);

        Ok(DeadlineOutcome { elapsed, verdict })
    }

    fn with_slot<R>(&self, f: impl FnOnce(&Slot) -> R) -> Option<R> {
        self.shared.state.lock().slots.get(&self.id).map(f)
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.shared.state.lock().slots.remove(&self.id);
    }
}
