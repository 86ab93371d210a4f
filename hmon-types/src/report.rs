//! HealthReport - the supervisor-facing summary of a health monitor.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::fmt;

use crate::{SchemaVersion, Status};

/// Kind of monitor a report entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MonitorKind {
    Deadline,
    Heartbeat,
    Logic,
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MonitorKind::Deadline => "deadline",
            MonitorKind::Heartbeat => "heartbeat",
            MonitorKind::Logic => "logic",
        })
    }
}

/// Status of one monitor at the time a report was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorReport {
    pub kind: MonitorKind,
    pub status: Status,
}

/// A point-in-time summary of every monitor owned by a health monitor.
///
/// Reports are produced once per supervisor cycle and handed to outputs and
/// subscribers. `status` is always the aggregate of `monitors`.
///
/// # Example
///
/// ```rust
/// use hmon_types::{HealthReport, MonitorKind, Status};
///
/// let report = HealthReport::builder()
///     .timestamp_ms(1_700_000_000_000)
///     .monitor("frame-deadline", MonitorKind::Deadline, Status::Running)
///     .monitor("mode", MonitorKind::Logic, Status::Disabled)
///     .build();
///
/// assert_eq!(report.status, Status::Running);
/// assert_eq!(report.failed().count(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthReport {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    /// Unix timestamp in milliseconds when this report was taken.
    pub timestamp_ms: u64,

    /// Aggregate status across all monitors.
    pub status: Status,

    /// Per-monitor status, keyed by tag.
    pub monitors: BTreeMap<String, MonitorReport>,
}

impl HealthReport {
    pub fn builder() -> HealthReportBuilder {
        HealthReportBuilder::new()
    }

    /// Number of monitors in the report.
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn get(&self, tag: &str) -> Option<&MonitorReport> {
        self.monitors.get(tag)
    }

    /// Tags of all monitors that have failed.
    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.monitors
            .iter()
            .filter(|(_, m)| m.status.is_failed())
            .map(|(tag, _)| tag.as_str())
    }

    pub fn is_healthy(&self) -> bool {
        !self.status.is_failed()
    }
}

/// Builder for constructing `HealthReport` instances.
#[derive(Debug, Default)]
pub struct HealthReportBuilder {
    timestamp_ms: Option<u64>,
    monitors: BTreeMap<String, MonitorReport>,
}

impl HealthReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    /// Add one monitor entry. A repeated tag replaces the earlier entry.
    pub fn monitor(mut self, tag: impl Into<String>, kind: MonitorKind, status: Status) -> Self {
        self.monitors
            .insert(tag.into(), MonitorReport { kind, status });
        self
    }

    /// Build the report. Without an explicit timestamp the current wall
    /// clock is used.
    #[cfg(feature = "std")]
    pub fn build(self) -> HealthReport {
        let timestamp_ms = self.timestamp_ms.unwrap_or_else(current_timestamp_ms);
        self.finish(timestamp_ms)
    }

    /// Build the report. Without an explicit timestamp it is zero.
    #[cfg(not(feature = "std"))]
    pub fn build(self) -> HealthReport {
        let timestamp_ms = self.timestamp_ms.unwrap_or(0);
        self.finish(timestamp_ms)
    }

    fn finish(self, timestamp_ms: u64) -> HealthReport {
        let status = Status::aggregate(self.monitors.values().map(|m| m.status));
        HealthReport {
            version: SchemaVersion::current(),
            timestamp_ms,
            status,
            monitors: self.monitors,
        }
    }
}

#[cfg(feature = "std")]
fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn builder_aggregates_status() {
        let report = HealthReport::builder()
            .timestamp_ms(42)
            .monitor("a", MonitorKind::Deadline, Status::Running)
            .monitor("b", MonitorKind::Heartbeat, Status::Failed)
            .monitor("c", MonitorKind::Logic, Status::Disabled)
            .build();

        assert_eq!(report.timestamp_ms, 42);
        assert_eq!(report.status, Status::Failed);
        assert!(!report.is_healthy());
        assert_eq!(report.failed().collect::<Vec<_>>(), ["b"]);
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn empty_report_is_disabled() {
        let report = HealthReport::builder().timestamp_ms(0).build();
        assert!(report.is_empty());
        assert_eq!(report.status, Status::Disabled);
        assert!(report.is_healthy());
    }

    #[test]
    fn repeated_tag_replaces_entry() {
        let report = HealthReport::builder()
            .timestamp_ms(0)
            .monitor("x", MonitorKind::Deadline, Status::Failed)
            .monitor("x", MonitorKind::Heartbeat, Status::Running)
            .build();
        assert_eq!(report.len(), 1);
        assert_eq!(
            report.get("x"),
            Some(&MonitorReport {
                kind: MonitorKind::Heartbeat,
                status: Status::Running
            })
        );
    }

    #[cfg(feature = "std")]
    #[test]
    fn build_uses_wall_clock() {
        let report = HealthReport::builder().build();
        assert!(report.timestamp_ms > 0);
        assert!(report.version.is_compatible());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_shape() {
        let report = HealthReport::builder()
            .timestamp_ms(1000)
            .monitor("hb", MonitorKind::Heartbeat, Status::Running)
            .build();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["monitors"]["hb"]["kind"], "heartbeat");
        assert_eq!(json["version"]["major"], 1);

        let back: HealthReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
