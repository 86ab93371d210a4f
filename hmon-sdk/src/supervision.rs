//! Running a long-lived component on its own thread with a synchronous
//! startup handshake.
//!
//! [`SupervisionThread::start`] only returns once the component's `init()`
//! has finished, so the caller knows deterministically whether the
//! component is up. The run loop is stopped cooperatively through a
//! [`StopToken`].

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::error::{InitError, SupervisionError};

/// A component that can be driven by a [`SupervisionThread`].
pub trait Supervised: Send + 'static {
    /// Prepare the component. Runs on the supervision thread before `run`.
    fn init(&mut self) -> Result<(), InitError>;

    /// Main loop. Must return soon after `stop` is signalled.
    fn run(&mut self, stop: &StopToken);
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Cooperative stop signal shared between a supervisor and its component.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<StopInner>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Request a stop and wake every waiter.
    pub fn stop(&self) {
        *self.inner.stopped.lock() = true;
        self.inner.wake.notify_all();
    }

    /// Sleep for up to `timeout`, returning early if a stop is requested.
    ///
    /// Returns `true` if the token is stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            if self.inner.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Outcome of `init()`, published exactly once.
#[derive(Default)]
struct Handshake {
    outcome: Mutex<Option<Result<(), InitError>>>,
    done: Condvar,
}

impl Handshake {
    fn publish(&self, outcome: Result<(), InitError>) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.done.notify_all();
        }
    }

    fn wait(&self) -> Result<(), InitError> {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut slot);
        }
    }
}

/// Publishes a failure if the thread unwinds before `init()` reported.
struct PublishOnDrop(Arc<Handshake>);

impl Drop for PublishOnDrop {
    fn drop(&mut self) {
        self.0
            .publish(Err(InitError::new("supervised component panicked during init")));
    }
}

/// Owns one [`Supervised`] component and the thread it runs on.
///
/// # Example
///
/// ```rust
/// use hmon_sdk::{InitError, StopToken, Supervised, SupervisionThread};
/// use std::time::Duration;
///
/// struct Ticker;
///
/// impl Supervised for Ticker {
///     fn init(&mut self) -> Result<(), InitError> {
///         Ok(())
///     }
///
///     fn run(&mut self, stop: &StopToken) {
///         while !stop.wait_timeout(Duration::from_millis(10)) {}
///     }
/// }
///
/// let mut thread = SupervisionThread::new("ticker", Ticker);
/// thread.start().unwrap();
/// assert!(thread.is_running());
/// thread.stop();
/// assert!(!thread.is_running());
/// ```
pub struct SupervisionThread {
    name: String,
    stack_size: Option<usize>,
    component: Option<Box<dyn Supervised>>,
    stop: StopToken,
    handle: Option<JoinHandle<()>>,
}

impl SupervisionThread {
    pub fn new(name: impl Into<String>, component: impl Supervised) -> Self {
        Self {
            name: name.into(),
            stack_size: None,
            component: Some(Box::new(component)),
            stop: StopToken::new(),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stack size of the spawned thread. `None` uses the platform default.
    pub fn set_stack_size(&mut self, bytes: Option<usize>) {
        self.stack_size = bytes;
    }

    /// Spawn the thread, run `init()` on it and wait for the result.
    ///
    /// On success `run()` is executing when this returns. On init failure
    /// the thread has already been joined and `run()` was never called. If
    /// the thread cannot be spawned the component is kept, so `start()` can
    /// be retried.
    pub fn start(&mut self) -> Result<(), SupervisionError> {
        let component = self
            .component
            .take()
            .ok_or(SupervisionError::AlreadyStarted)?;

        let pending = Arc::new(Mutex::new(Some(component)));
        let handshake = Arc::new(Handshake::default());
        let guard = PublishOnDrop(Arc::clone(&handshake));
        let stop = self.stop.clone();

        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        let thread_pending = Arc::clone(&pending);
        let spawned = builder.spawn(move || {
            let Some(mut component) = thread_pending.lock().take() else {
                return;
            };
            let outcome = component.init();
            let ready = outcome.is_ok();
            guard.0.publish(outcome);
            drop(guard);
            if ready {
                component.run(&stop);
            }
        });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                error!(thread = %self.name, error = %err, "failed to spawn supervision thread");
                self.component = pending.lock().take();
                return Err(SupervisionError::Spawn(err));
            }
        };

        match handshake.wait() {
            Ok(()) => {
                info!(thread = %self.name, "supervised component started");
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                error!(thread = %self.name, error = %err, "supervised component failed to start");
                if handle.join().is_err() {
                    error!(thread = %self.name, "supervised component panicked during init");
                }
                Err(SupervisionError::InitFailed(err))
            }
        }
    }

    /// Signal the component to stop and join its thread.
    ///
    /// Idempotent, and harmless before `start()`.
    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(thread = %self.name, "supervised component panicked");
            } else {
                debug!(thread = %self.name, "supervised component stopped");
            }
        }
    }

    /// Whether a run loop is currently alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }
}

impl fmt::Debug for SupervisionThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisionThread")
            .field("name", &self.name)
            .field("started", &self.component.is_none())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for SupervisionThread {
    fn drop(&mut self) {
        self.stop();
    }
}
