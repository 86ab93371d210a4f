//! Error types for alive backends.

use thiserror::Error;

/// Errors that can occur when talking to an external watchdog.
#[derive(Debug, Error)]
pub enum AliveError {
    /// The service manager notification could not be sent.
    #[error("Notification failed: {0}")]
    Notify(#[from] std::io::Error),

    /// The process is not supervised by a service manager.
    #[error("Not running under a service manager")]
    NotSupervised,
}
