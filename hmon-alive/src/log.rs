//! A watchdog backend that only logs.

use std::time::Duration;

use hmon_sdk::AliveApi;
use tracing::{debug, info};

/// Logs each keep-alive instead of notifying a real watchdog.
#[derive(Debug, Default)]
pub struct LogWatchdog {
    minimum: Duration,
    kicks: u64,
}

impl LogWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keep-alive calls received so far.
    pub fn kicks(&self) -> u64 {
        self.kicks
    }

    pub fn minimum_time(&self) -> Duration {
        self.minimum
    }
}

impl AliveApi for LogWatchdog {
    fn configure_minimum_time(&mut self, minimum: Duration) {
        info!(minimum_ms = minimum.as_millis() as u64, "watchdog configured");
        self.minimum = minimum;
    }

    fn keep_alive(&mut self) {
        self.kicks += 1;
        debug!(kicks = self.kicks, "watchdog kicked");
    }
}
