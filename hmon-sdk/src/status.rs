//! The status state machine shared by every monitor kind.

use std::fmt;
use std::sync::Arc;

use hmon_types::Status;

use crate::error::MonitorError;

/// A real status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: Status,
    pub to: Status,
}

/// Three-state machine {Running, Disabled, Failed}.
///
/// Starts in `Running`. Failed is absorbing. Every operation is defined for
/// every starting state; the ones that would not change anything are
/// rejected instead of silently succeeding.
///
/// ```
/// use hmon_sdk::{MonitorError, Status, StatusState};
///
/// let mut state = StatusState::new();
/// assert_eq!(state.enable(), Err(MonitorError::AlreadyEnabled));
/// state.disable().unwrap();
/// assert!(state.fail().is_some());
/// assert_eq!(state.enable(), Err(MonitorError::Failed));
/// assert_eq!(state.status(), Status::Failed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusState {
    status: Status,
}

impl StatusState {
    pub const fn new() -> Self {
        Self {
            status: Status::Running,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Disabled → Running.
    pub fn enable(&mut self) -> Result<StatusChange, MonitorError> {
        match self.status {
            Status::Running => Err(MonitorError::AlreadyEnabled),
            Status::Failed => Err(MonitorError::Failed),
            Status::Disabled => Ok(self.set(Status::Running)),
        }
    }

    /// Running → Disabled.
    pub fn disable(&mut self) -> Result<StatusChange, MonitorError> {
        match self.status {
            Status::Disabled => Err(MonitorError::AlreadyDisabled),
            Status::Failed => Err(MonitorError::Failed),
            Status::Running => Ok(self.set(Status::Disabled)),
        }
    }

    /// Any → Failed. Returns `None` if the state had already failed.
    pub fn fail(&mut self) -> Option<StatusChange> {
        if self.status.is_failed() {
            return None;
        }
        Some(self.set(Status::Failed))
    }

    fn set(&mut self, to: Status) -> StatusChange {
        let from = self.status;
        self.status = to;
        StatusChange { from, to }
    }
}

/// Callback invoked with `(from, to)` after every status transition.
pub type StatusCallback = dyn Fn(Status, Status) + Send + Sync;

/// Optional status hook carried by each monitor.
///
/// Monitors fire it only after releasing their lock, so delivery order is
/// not guaranteed across threads.
#[derive(Clone, Default)]
pub(crate) struct StatusHook(Option<Arc<StatusCallback>>);

impl StatusHook {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: Fn(Status, Status) + Send + Sync + 'static,
    {
        Self(Some(Arc::new(f)))
    }

    pub(crate) fn notify(&self, change: StatusChange) {
        if let Some(hook) = &self.0 {
            hook(change.from, change.to);
        }
    }

    pub(crate) fn notify_opt(&self, change: Option<StatusChange>) {
        if let Some(change) = change {
            self.notify(change);
        }
    }
}

impl fmt::Debug for StatusHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "StatusHook(set)" } else { "StatusHook(none)" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn starts_running() {
        assert_eq!(StatusState::new().status(), Status::Running);
        assert_eq!(StatusState::default().status(), Status::Running);
    }

    #[test]
    fn disable_then_enable() {
        let mut state = StatusState::new();
        assert_eq!(
            state.disable(),
            Ok(StatusChange {
                from: Status::Running,
                to: Status::Disabled
            })
        );
        assert_eq!(state.disable(), Err(MonitorError::AlreadyDisabled));
        assert_eq!(
            state.enable(),
            Ok(StatusChange {
                from: Status::Disabled,
                to: Status::Running
            })
        );
        assert_eq!(state.enable(), Err(MonitorError::AlreadyEnabled));
    }

    #[test]
    fn failed_is_absorbing() {
        let mut state = StatusState::new();
        assert_eq!(
            state.fail(),
            Some(StatusChange {
                from: Status::Running,
                to: Status::Failed
            })
        );
        assert_eq!(state.fail(), None);
        assert_eq!(state.enable(), Err(MonitorError::Failed));
        assert_eq!(state.disable(), Err(MonitorError::Failed));
        assert_eq!(state.status(), Status::Failed);
    }

    #[test]
    fn fail_from_disabled() {
        let mut state = StatusState::new();
        state.disable().unwrap();
        let change = state.fail().unwrap();
        assert_eq!(change.from, Status::Disabled);
    }

    #[test]
    fn hook_sees_transitions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook = StatusHook::new(move |from, to| sink.lock().push((from, to)));

        let mut state = StatusState::new();
        hook.notify(state.disable().unwrap());
        hook.notify_opt(state.fail());
        hook.notify_opt(state.fail());

        assert_eq!(
            *seen.lock(),
            vec![
                (Status::Running, Status::Disabled),
                (Status::Disabled, Status::Failed)
            ]
        );
    }

    #[test]
    fn empty_hook_is_a_no_op() {
        let hook = StatusHook::default();
        hook.notify(StatusChange {
            from: Status::Running,
            to: Status::Failed,
        });
        assert_eq!(format!("{:?}", hook), "StatusHook(none)");
    }
}
