//! Output backends for emitting health reports.

use std::path::PathBuf;

use hmon_types::HealthReport;
use tracing::{info, warn};

/// Output destination for health reports.
///
/// The health monitor emits one report per supervisor cycle to every
/// configured output.
#[derive(Debug)]
pub enum Output {
    /// Write reports to a JSON file.
    ///
    /// The file is overwritten with each report.
    File(PathBuf),

    /// Send reports through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    #[cfg(feature = "tokio")]
    Channel(tokio::sync::mpsc::Sender<HealthReport>),

    /// Log a one-line summary of each report through `tracing`.
    Log,
}

impl Output {
    /// Create a file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hmon_sdk::Output;
    ///
    /// let output = Output::file("health.json");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// Reports are dropped when the channel is full.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hmon_sdk::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    ///
    /// // Later, receive reports
    /// // while let Some(report) = rx.recv().await {
    /// //     println!("aggregate status: {}", report.status);
    /// // }
    /// ```
    #[cfg(feature = "tokio")]
    pub fn channel(buffer: usize) -> (Self, tokio::sync::mpsc::Receiver<HealthReport>) {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    pub fn log() -> Self {
        Output::Log
    }

    /// Emit a report to this output.
    pub(crate) fn emit(&self, report: &HealthReport) -> std::io::Result<()> {
        match self {
            Output::File(path) => {
                let json = serde_json::to_string_pretty(report)?;
                std::fs::write(path, json)?;
            }
            #[cfg(feature = "tokio")]
            Output::Channel(tx) => {
                // Best effort; the monitoring loop must never block on a reader.
                let _ = tx.try_send(report.clone());
            }
            Output::Log => {
                let failed: Vec<&str> = report.failed().collect();
                if failed.is_empty() {
                    info!(status = %report.status, monitors = report.len(), "health report");
                } else {
                    warn!(status = %report.status, monitors = report.len(), ?failed, "health report");
                }
            }
        }
        Ok(())
    }
}
