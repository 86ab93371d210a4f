//! Logic monitoring: a declared state machine whose transitions are checked.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use hmon_types::Status;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::MonitorError;
use crate::hash::IdentifierHash;
use crate::status::{StatusHook, StatusState};

type StateCallback = dyn Fn(IdentifierHash, IdentifierHash) + Send + Sync;

#[derive(Debug)]
struct Inner {
    status: StatusState,
    current: IdentifierHash,
}

struct Shared {
    initial: IdentifierHash,
    transitions: HashSet<(IdentifierHash, IdentifierHash)>,
    state: Mutex<Inner>,
    status_hook: StatusHook,
    state_hook: Option<Arc<StateCallback>>,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("initial", &self.initial)
            .field("transitions", &self.transitions.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Builder for [`LogicMonitor`].
///
/// # Example
///
/// ```rust
/// use hmon_sdk::{IdentifierHash, LogicMonitorBuilder};
///
/// let idle = IdentifierHash::new("Idle");
/// let busy = IdentifierHash::new("Busy");
///
/// let monitor = LogicMonitorBuilder::new(idle)
///     .add_transition(idle, busy)
///     .add_transition(busy, idle)
///     .build();
///
/// monitor.transition(busy).unwrap();
/// assert_eq!(monitor.state(), busy);
/// ```
pub struct LogicMonitorBuilder {
    initial: IdentifierHash,
    transitions: HashSet<(IdentifierHash, IdentifierHash)>,
    status_hook: StatusHook,
    state_hook: Option<Arc<StateCallback>>,
}

impl LogicMonitorBuilder {
    pub fn new(initial: IdentifierHash) -> Self {
        Self {
            initial,
            transitions: HashSet::new(),
            status_hook: StatusHook::default(),
            state_hook: None,
        }
    }

    /// Declare `from → to` legal.
    pub fn add_transition(mut self, from: IdentifierHash, to: IdentifierHash) -> Self {
        self.transitions.insert((from, to));
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
        self.status_hook = StatusHook::new(f);
        self
    }

    /// Call `f(from, to)` after every successful state transition.
    ///
    /// Like the status hook it runs outside the lock, and concurrent
    /// transitions can be reported out of order.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(IdentifierHash, IdentifierHash) + Send + Sync + 'static,
    {
        self.state_hook = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> LogicMonitor {
        LogicMonitor {
            shared: Arc::new(Shared {
                initial: self.initial,
                transitions: self.transitions,
                state: Mutex::new(Inner {
                    status: StatusState::new(),
                    current: self.initial,
                }),
                status_hook: self.status_hook,
                state_hook: self.state_hook,
            }),
        }
    }
}

impl fmt::Debug for LogicMonitorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicMonitorBuilder")
            .field("initial", &self.initial)
            .field("transitions", &self.transitions.len())
            .finish_non_exhaustive()
    }
}

/// Checks that the monitored component only moves through declared
/// transitions. An undeclared transition fails the monitor.
///
/// Cloning yields another handle to the same monitor.
#[derive(Debug, Clone)]
pub struct LogicMonitor {
    shared: Arc<Shared>,
}

impl LogicMonitor {
    /// Move to `target`.
    ///
    /// Rejected with [`MonitorError::NotAllowed`] while disabled and with
    /// [`MonitorError::Failed`] once failed; the state is unchanged in both
    /// cases. An undeclared transition fails the monitor and returns
    /// [`MonitorError::IllegalTransition`].
    pub fn transition(&self, target: IdentifierHash) -> Result<(), MonitorError> {
        let mut state = self.shared.state.lock();
        match state.status.status() {
            Status::Disabled => return Err(MonitorError::NotAllowed),
            Status::Failed => return Err(MonitorError::Failed),
            Status::Running => {}
        }

        let from = state.current;
        if !self.shared.transitions.contains(&(from, target)) {
            let change = state.status.fail();
            drop(state);
            error!(%from, to = %target, "illegal state transition");
            self.shared.status_hook.notify_opt(change);
            return Err(MonitorError::IllegalTransition { from, to: target });
        }

        state.current = target;
        drop(state);
        debug!(%from, to = %target, "state transition");
        if let Some(hook) = &self.shared.state_hook {
            hook(from, target);
        }
        Ok(())
    }

    pub fn state(&self) -> IdentifierHash {
        self.shared.state.lock().current
    }

    pub fn initial_state(&self) -> IdentifierHash {
        self.shared.initial
    }

    pub fn is_legal(&self, from: IdentifierHash, to: IdentifierHash) -> bool {
        self.shared.transitions.contains(&(from, to))
    }

    pub fn status(&self) -> Status {
        self.shared.state.lock().status.status()
    }

    pub fn enable(&self) -> Result<(), MonitorError> {
        let change = self.shared.state.lock().status.enable()?;
        self.shared.status_hook.notify(change);
        Ok(())
    }

    pub fn disable(&self) -> Result<(), MonitorError> {
        let change = self.shared.state.lock().status.disable()?;
        self.shared.status_hook.notify(change);
        Ok(())
    }
}
