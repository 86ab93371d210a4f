//! systemd service manager integration.
//!
//! Requires the unit to set `WatchdogSec=` (and `Type=notify` for
//! readiness). Outside of systemd every notification is a no-op.

use std::time::Duration;

use hmon_sdk::AliveApi;
use sd_notify::NotifyState;
use tracing::{info, warn};

use crate::error::AliveError;

/// Tell the service manager that start-up has finished.
///
/// Call this only after the health monitor has started.
pub fn notify_ready() -> Result<(), AliveError> {
    sd_notify::notify(false, &[NotifyState::Ready])?;
    info!("READY=1 sent to service manager");
    Ok(())
}

/// The watchdog interval configured by the service manager, if any.
pub fn watchdog_interval() -> Result<Duration, AliveError> {
    let mut usec = 0u64;
    if sd_notify::watchdog_enabled(false, &mut usec) {
        Ok(Duration::from_micros(usec))
    } else {
        Err(AliveError::NotSupervised)
    }
}

/// Sends `WATCHDOG=1` on every keep-alive.
#[derive(Debug, Default)]
pub struct SystemdWatchdog {
    _private: (),
}

impl SystemdWatchdog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AliveApi for SystemdWatchdog {
    fn configure_minimum_time(&mut self, minimum: Duration) {
        match watchdog_interval() {
            Ok(interval) if interval <= minimum => warn!(
                interval_ms = interval.as_millis() as u64,
                minimum_ms = minimum.as_millis() as u64,
                "watchdog interval is not longer than the keep-alive minimum time"
            ),
            Ok(interval) => info!(
                interval_ms = interval.as_millis() as u64,
                minimum_ms = minimum.as_millis() as u64,
                "systemd watchdog configured"
            ),
            Err(_) => info!("systemd watchdog not enabled for this process"),
        }
    }

    fn keep_alive(&mut self) {
        if let Err(err) = sd_notify::notify(false, &[NotifyState::Watchdog]) {
            warn!(error = %err, "WATCHDOG=1 notification failed");
        }
    }
}
