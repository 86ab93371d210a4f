//! Rate-limited keep-alive signal towards an external watchdog.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::heartbeat::Beat;

/// Backend that forwards keep-alive signals to an external watchdog.
///
/// Implementations live outside this crate (see `hmon-alive`), or in tests.
pub trait AliveApi: Send {
    /// The minimum time between two forwarded keep-alive calls.
    fn configure_minimum_time(&mut self, minimum: Duration);

    fn keep_alive(&mut self);
}

/// Answers "is this process alive" to an external watchdog.
///
/// The health monitor calls [`keep_alive`](AliveSignal::keep_alive) once per
/// supervisor cycle while nothing has failed. Calls closer together than the
/// configured minimum time are dropped.
pub struct AliveSignal {
    backend: Box<dyn AliveApi>,
    minimum: Duration,
    last: Option<Instant>,
}

impl AliveSignal {
    pub fn new(backend: impl AliveApi + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            minimum: Duration::ZERO,
            last: None,
        }
    }

    /// Set the rate limit and forward it to the backend.
    pub fn configure_minimum_time(&mut self, minimum: Duration) {
        self.minimum = minimum;
        self.backend.configure_minimum_time(minimum);
    }

    pub fn with_minimum_time(mut self, minimum: Duration) -> Self {
        self.configure_minimum_time(minimum);
        self
    }

    pub fn minimum_time(&self) -> Duration {
        self.minimum
    }

    pub fn keep_alive(&mut self) -> Beat {
        self.keep_alive_at(Instant::now())
    }

    pub(crate) fn keep_alive_at(&mut self, now: Instant) -> Beat {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.minimum {
                trace!("keep-alive debounced");
                return Beat::Debounced;
            }
        }
        self.last = Some(now);
        self.backend.keep_alive();
        Beat::Accepted
    }
}

impl fmt::Debug for AliveSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliveSignal")
            .field("minimum", &self.minimum)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
