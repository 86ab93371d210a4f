//! The three-state status shared by every monitor kind.

use core::fmt;

/// Status of a monitor, or the aggregate status of a health monitor.
///
/// `Failed` is absorbing: once a monitor reports it, nothing but recreating
/// the monitor brings it back. `Running` and `Disabled` can be toggled freely
/// while the monitor has not failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Status {
    /// Monitoring is active and no contract was violated.
    #[default]
    Running,
    /// Monitoring is paused; timing checks are skipped.
    Disabled,
    /// A contract was violated.
    Failed,
}

impl Status {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Running => "RUN",
            Status::Disabled => "DIS",
            Status::Failed => "FAIL",
        }
    }

    /// Check if this is the absorbing failure state.
    pub fn is_failed(&self) -> bool {
        matches!(self, Status::Failed)
    }

    /// Check if timing checks are currently applied.
    pub fn is_running(&self) -> bool {
        matches!(self, Status::Running)
    }

    /// Combine a set of monitor statuses into one aggregate status.
    ///
    /// Any failure wins. Otherwise the aggregate is running if at least one
    /// monitor runs, and disabled if all of them are disabled (or there are
    /// none).
    pub fn aggregate<I>(statuses: I) -> Status
    where
        I: IntoIterator<Item = Status>,
    {
        let mut aggregate = Status::Disabled;
        for status in statuses {
            match status {
                Status::Failed => return Status::Failed,
                Status::Running => aggregate = Status::Running,
                Status::Disabled => {}
            }
        }
        aggregate
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Running => "running",
            Status::Disabled => "disabled",
            Status::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_running() {
        assert_eq!(Status::default(), Status::Running);
    }

    #[test]
    fn aggregate_failure_wins() {
        let status = Status::aggregate([Status::Running, Status::Failed, Status::Disabled]);
        assert_eq!(status, Status::Failed);
    }

    #[test]
    fn aggregate_running_beats_disabled() {
        let status = Status::aggregate([Status::Disabled, Status::Running]);
        assert_eq!(status, Status::Running);
    }

    #[test]
    fn aggregate_all_disabled() {
        assert_eq!(
            Status::aggregate([Status::Disabled, Status::Disabled]),
            Status::Disabled
        );
    }

    #[test]
    fn aggregate_empty_is_disabled() {
        assert_eq!(Status::aggregate([]), Status::Disabled);
    }

    #[test]
    fn ordering_puts_failed_last() {
        assert!(Status::Running < Status::Disabled);
        assert!(Status::Disabled < Status::Failed);
    }

    #[test]
    fn display_and_symbol() {
        assert_eq!(Status::Failed.to_string(), "failed");
        assert_eq!(Status::Running.symbol(), "RUN");
        assert!(Status::Failed.is_failed());
        assert!(!Status::Disabled.is_running());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Status::Disabled).unwrap();
        assert_eq!(json, "\"disabled\"");
    }
}
