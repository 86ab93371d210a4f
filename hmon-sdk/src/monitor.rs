//! The health monitor: owns all monitors and drives their evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hmon_types::{HealthReport, MonitorKind, MonitorTag, Status};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::alive::AliveSignal;
use crate::deadline::{DeadlineMonitor, DeadlineMonitorBuilder};
use crate::error::{BuildError, InitError, MonitorError, StartError};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatMonitorBuilder};
use crate::logic::{LogicMonitor, LogicMonitorBuilder};
use crate::output::Output;
use crate::status::StatusChange;
use crate::supervision::{StopToken, Supervised, SupervisionThread};

/// Default period of the evaluation cycle.
pub const DEFAULT_INTERNAL_PROCESSING_CYCLE: Duration = Duration::from_millis(100);

/// Default period of the supervisor-facing report cycle.
pub const DEFAULT_SUPERVISOR_API_CYCLE: Duration = Duration::from_millis(500);

const MONITORING_THREAD_NAME: &str = "hmon-monitoring";

/// All monitors owned by one health monitor.
#[derive(Debug, Default)]
struct Monitors {
    deadline: BTreeMap<MonitorTag, DeadlineMonitor>,
    heartbeat: BTreeMap<MonitorTag, HeartbeatMonitor>,
    logic: BTreeMap<MonitorTag, LogicMonitor>,
}

impl Monitors {
    fn is_empty(&self) -> bool {
        self.deadline.is_empty() && self.heartbeat.is_empty() && self.logic.is_empty()
    }

    fn statuses(&self) -> impl Iterator<Item = (&MonitorTag, MonitorKind, Status)> {
        let deadline = self
            .deadline
            .iter()
            .map(|(tag, m)| (tag, MonitorKind::Deadline, m.status()));
        let heartbeat = self
            .heartbeat
            .iter()
            .map(|(tag, m)| (tag, MonitorKind::Heartbeat, m.status()));
        let logic = self
            .logic
            .iter()
            .map(|(tag, m)| (tag, MonitorKind::Logic, m.status()));
        deadline.chain(heartbeat).chain(logic)
    }

    fn status(&self) -> Status {
        Status::aggregate(self.statuses().map(|(_, _, status)| status))
    }

    fn report(&self) -> HealthReport {
        self.statuses()
            .fold(HealthReport::builder(), |builder, (tag, kind, status)| {
                builder.monitor(tag.as_str(), kind, status)
            })
            .build()
    }

    fn reset_heartbeats(&self, now: Instant) {
        for monitor in self.heartbeat.values() {
            monitor.reset_at(now);
        }
    }

    /// Run the timing checks of every monitor once.
    fn evaluate_at(&self, now: Instant) {
        for (tag, monitor) in &self.deadline {
            log_failure(tag, MonitorKind::Deadline, monitor.evaluate_at(now));
        }
        for (tag, monitor) in &self.heartbeat {
            log_failure(tag, MonitorKind::Heartbeat, monitor.evaluate_at(now));
        }
    }
}

fn log_failure(tag: &MonitorTag, kind: MonitorKind, change: Option<StatusChange>) {
    if let Some(change) = change {
        error!(%tag, %kind, from = %change.from, "monitor failed");
    }
}

/// Owns a set of tagged monitors and evaluates them on a background thread.
///
/// Every internal processing cycle the deadline and heartbeat monitors are
/// checked. Every supervisor cycle a [`HealthReport`] is published to the
/// configured outputs and subscribers, and the alive signal is kicked unless
/// something has failed.
///
/// # Example
///
/// ```rust,no_run
/// use hmon_sdk::{HealthMonitor, HeartbeatMonitorBuilder, TimeRange};
/// use std::time::Duration;
///
/// let mut health = HealthMonitor::builder()
///     .add_heartbeat_monitor(
///         "main-loop",
///         HeartbeatMonitorBuilder::new(TimeRange::new(
///             Duration::from_millis(10),
///             Duration::from_millis(500),
///         )),
///     )
///     .build()
///     .unwrap();
///
/// let heartbeat = health.get_heartbeat_monitor("main-loop").unwrap();
/// health.start().unwrap();
///
/// loop {
///     // ... do work ...
///     heartbeat.heartbeat();
///     # break;
/// }
/// ```
pub struct HealthMonitor {
    monitors: Arc<Monitors>,
    internal_cycle: Duration,
    supervisor_cycle: Duration,
    outputs: Vec<Output>,
    alive: Option<AliveSignal>,
    latest: Arc<RwLock<Option<HealthReport>>>,
    #[cfg(feature = "tokio")]
    reports: Arc<tokio::sync::watch::Sender<Option<HealthReport>>>,
    thread: Option<SupervisionThread>,
    started: bool,
}

impl HealthMonitor {
    pub fn builder() -> HealthMonitorBuilder {
        HealthMonitorBuilder::new()
    }

    pub fn get_deadline_monitor(&self, tag: &str) -> Result<DeadlineMonitor, MonitorError> {
        self.monitors
            .deadline
            .get(tag)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound(MonitorTag::from(tag)))
    }

    pub fn get_heartbeat_monitor(&self, tag: &str) -> Result<HeartbeatMonitor, MonitorError> {
        self.monitors
            .heartbeat
            .get(tag)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound(MonitorTag::from(tag)))
    }

    pub fn get_logic_monitor(&self, tag: &str) -> Result<LogicMonitor, MonitorError> {
        self.monitors
            .logic
            .get(tag)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound(MonitorTag::from(tag)))
    }

    pub fn internal_processing_cycle(&self) -> Duration {
        self.internal_cycle
    }

    pub fn supervisor_api_cycle(&self) -> Duration {
        self.supervisor_cycle
    }

    /// Start the monitoring loop on its own thread.
    ///
    /// Heartbeat gaps are measured from this call, not from `build()`. If
    /// the thread cannot be spawned nothing is consumed and `start()` can be
    /// called again.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.started {
            return Err(StartError::AlreadyStarted);
        }
        if self.monitors.is_empty() {
            return Err(StartError::NoMonitors);
        }

        if self.thread.is_none() {
            let monitoring = self.monitoring_loop();
            self.thread = Some(SupervisionThread::new(MONITORING_THREAD_NAME, monitoring));
        }
        if let Some(thread) = self.thread.as_mut() {
            thread.start()?;
        }
        self.started = true;
        info!(
            internal_ms = self.internal_cycle.as_millis() as u64,
            supervisor_ms = self.supervisor_cycle.as_millis() as u64,
            "health monitor started"
        );
        Ok(())
    }

    /// Hand the outputs and alive signal over to a new evaluation loop.
    fn monitoring_loop(&mut self) -> MonitoringLoop {
        let cycles_per_report = (self.supervisor_cycle.as_nanos()
            / self.internal_cycle.as_nanos())
        .max(1) as u64;
        MonitoringLoop {
            monitors: Arc::clone(&self.monitors),
            internal_cycle: self.internal_cycle,
            cycles_per_report,
            cycle: 0,
            outputs: std::mem::take(&mut self.outputs),
            alive: self.alive.take(),
            starved: false,
            latest: Arc::clone(&self.latest),
            #[cfg(feature = "tokio")]
            reports: Arc::clone(&self.reports),
        }
    }

    /// Stop and join the monitoring loop. Does nothing if it is not running.
    pub fn stop(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
            info!("health monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(SupervisionThread::is_running)
    }

    /// Aggregate status: failed if any monitor failed, otherwise running if
    /// any monitor runs, otherwise disabled.
    pub fn status(&self) -> Status {
        self.monitors.status()
    }

    /// Build a report of the current state on demand.
    pub fn report(&self) -> HealthReport {
        self.monitors.report()
    }

    /// The report most recently published by the supervisor cycle.
    pub fn latest_report(&self) -> Option<HealthReport> {
        self.latest.read().clone()
    }

    /// Receive every report published by the supervisor cycle.
    #[cfg(feature = "tokio")]
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<Option<HealthReport>> {
        self.reports.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn evaluate_at(&self, now: Instant) {
        self.monitors.evaluate_at(now);
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("monitors", &self.monitors)
            .field("internal_cycle", &self.internal_cycle)
            .field("supervisor_cycle", &self.supervisor_cycle)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The evaluation loop run on the monitoring thread.
struct MonitoringLoop {
    monitors: Arc<Monitors>,
    internal_cycle: Duration,
    cycles_per_report: u64,
    cycle: u64,
    outputs: Vec<Output>,
    alive: Option<AliveSignal>,
    starved: bool,
    latest: Arc<RwLock<Option<HealthReport>>>,
    #[cfg(feature = "tokio")]
    reports: Arc<tokio::sync::watch::Sender<Option<HealthReport>>>,
}

impl MonitoringLoop {
    fn tick_at(&mut self, now: Instant) {
        self.monitors.evaluate_at(now);
        self.cycle += 1;
        if self.cycle % self.cycles_per_report == 0 {
            self.publish();
        }
    }

    fn publish(&mut self) {
        let report = self.monitors.report();

        for output in &self.outputs {
            if let Err(err) = output.emit(&report) {
                warn!(?output, error = %err, "failed to emit health report");
            }
        }

        if let Some(alive) = self.alive.as_mut() {
            if report.status.is_failed() {
                if !self.starved {
                    warn!("health monitor failed, starving the watchdog");
                    self.starved = true;
                }
            } else {
                alive.keep_alive();
            }
        }

        #[cfg(feature = "tokio")]
        self.reports.send_replace(Some(report.clone()));
        *self.latest.write() = Some(report);
    }
}

impl Supervised for MonitoringLoop {
    fn init(&mut self) -> Result<(), InitError> {
        self.monitors.reset_heartbeats(Instant::now());
        debug!(
            cycles_per_report = self.cycles_per_report,
            "monitoring loop initialized"
        );
        Ok(())
    }

    fn run(&mut self, stop: &StopToken) {
        while !stop.wait_timeout(self.internal_cycle) {
            self.tick_at(Instant::now());
        }
    }
}

/// Builder for [`HealthMonitor`].
#[derive(Debug)]
pub struct HealthMonitorBuilder {
    deadline: BTreeMap<MonitorTag, DeadlineMonitorBuilder>,
    heartbeat: BTreeMap<MonitorTag, HeartbeatMonitorBuilder>,
    logic: BTreeMap<MonitorTag, LogicMonitorBuilder>,
    internal_cycle: Duration,
    supervisor_cycle: Duration,
    outputs: Vec<Output>,
    alive: Option<AliveSignal>,
}

impl HealthMonitorBuilder {
    pub fn new() -> Self {
        Self {
            deadline: BTreeMap::new(),
            heartbeat: BTreeMap::new(),
            logic: BTreeMap::new(),
            internal_cycle: DEFAULT_INTERNAL_PROCESSING_CYCLE,
            supervisor_cycle: DEFAULT_SUPERVISOR_API_CYCLE,
            outputs: Vec::new(),
            alive: None,
        }
    }

    /// Register a deadline monitor. A repeated tag replaces the earlier one.
    pub fn add_deadline_monitor(
        mut self,
        tag: impl Into<MonitorTag>,
        monitor: DeadlineMonitorBuilder,
    ) -> Self {
        self.deadline.insert(tag.into(), monitor);
        self
    }

    /// Register a heartbeat monitor. A repeated tag replaces the earlier one.
    pub fn add_heartbeat_monitor(
        mut self,
        tag: impl Into<MonitorTag>,
        monitor: HeartbeatMonitorBuilder,
    ) -> Self {
        self.heartbeat.insert(tag.into(), monitor);
        self
    }

    /// Register a logic monitor. A repeated tag replaces the earlier one.
    pub fn add_logic_monitor(mut self, tag: impl Into<MonitorTag>, monitor: LogicMonitorBuilder) -> Self {
        self.logic.insert(tag.into(), monitor);
        self
    }

    /// Period of the evaluation cycle. Defaults to 100ms.
    pub fn with_internal_processing_cycle(mut self, cycle: Duration) -> Self {
        self.internal_cycle = cycle;
        self
    }

    /// Period of the report cycle. Must be a whole multiple of the internal
    /// cycle. Defaults to 500ms.
    pub fn with_supervisor_api_cycle(mut self, cycle: Duration) -> Self {
        self.supervisor_cycle = cycle;
        self
    }

    /// Add an output destination.
    ///
    /// Multiple outputs can be added; reports will be emitted to all of them.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Kick `alive` every supervisor cycle while nothing has failed.
    pub fn alive_signal(mut self, alive: AliveSignal) -> Self {
        self.alive = Some(alive);
        self
    }

    pub fn build(self) -> Result<HealthMonitor, BuildError> {
        if self.internal_cycle.is_zero() {
            return Err(BuildError::ZeroInternalCycle);
        }
        if self.supervisor_cycle.is_zero()
            || self.supervisor_cycle.as_nanos() % self.internal_cycle.as_nanos() != 0
        {
            return Err(BuildError::SupervisorCycleNotMultiple {
                supervisor: self.supervisor_cycle,
                internal: self.internal_cycle,
            });
        }

        let monitors = Monitors {
            deadline: into_monitors(self.deadline, DeadlineMonitorBuilder::build),
            heartbeat: into_monitors(self.heartbeat, HeartbeatMonitorBuilder::build),
            logic: into_monitors(self.logic, LogicMonitorBuilder::build),
        };

        #[cfg(feature = "tokio")]
        let (reports, _) = tokio::sync::watch::channel(None);

        Ok(HealthMonitor {
            monitors: Arc::new(monitors),
            internal_cycle: self.internal_cycle,
            supervisor_cycle: self.supervisor_cycle,
            outputs: self.outputs,
            alive: self.alive,
            latest: Arc::new(RwLock::new(None)),
            #[cfg(feature = "tokio")]
            reports: Arc::new(reports),
            thread: None,
            started: false,
        })
    }
}

impl Default for HealthMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn into_monitors<B, M>(
    builders: BTreeMap<MonitorTag, B>,
    build: impl Fn(B) -> M,
) -> BTreeMap<MonitorTag, M> {
    builders
        .into_iter()
        .map(|(tag, builder)| (tag, build(builder)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alive::tests::Recorder;
    use crate::error::SupervisionError;
    use crate::hash::IdentifierHash;
    use hmon_types::TimeRange;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn health() -> HealthMonitorBuilder {
        HealthMonitor::builder()
            .add_deadline_monitor("frame", DeadlineMonitorBuilder::new())
            .add_heartbeat_monitor(
                "alive",
                HeartbeatMonitorBuilder::new(TimeRange::new(ms(0), ms(100))),
            )
    }

    fn looper(health: &mut HealthMonitor) -> MonitoringLoop {
        health.monitoring_loop()
    }

    #[test]
    fn defaults() {
        let health = health().build().unwrap();
        assert_eq!(health.internal_processing_cycle(), ms(100));
        assert_eq!(health.supervisor_api_cycle(), ms(500));
        assert_eq!(health.status(), Status::Running);
        assert!(!health.is_running());
    }

    #[test]
    fn cycles_are_validated() {
        let err = health()
            .with_internal_processing_cycle(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::ZeroInternalCycle);

        let err = health()
            .with_internal_processing_cycle(ms(30))
            .with_supervisor_api_cycle(ms(100))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::SupervisorCycleNotMultiple {
                supervisor: ms(100),
                internal: ms(30)
            }
        );

        assert!(health()
            .with_internal_processing_cycle(ms(25))
            .with_supervisor_api_cycle(ms(100))
            .build()
            .is_ok());
    }

    #[test]
    fn lookup_by_tag() {
        let health = health().build().unwrap();
        assert!(health.get_deadline_monitor("frame").is_ok());
        assert!(health.get_heartbeat_monitor("alive").is_ok());
        assert_eq!(
            health.get_deadline_monitor("alive").unwrap_err(),
            MonitorError::NotFound(MonitorTag::from("alive"))
        );
        assert!(health.get_logic_monitor("frame").is_err());

        // Lookups hand out handles to the same monitor.
        let a = health.get_deadline_monitor("frame").unwrap();
        let b = health.get_deadline_monitor("frame").unwrap();
        a.disable().unwrap();
        assert_eq!(b.status(), Status::Disabled);
    }

    #[test]
    fn repeated_tag_replaces_builder() {
        let health = HealthMonitor::builder()
            .add_heartbeat_monitor(
                "alive",
                HeartbeatMonitorBuilder::new(TimeRange::new(ms(0), ms(100))),
            )
            .add_heartbeat_monitor(
                "alive",
                HeartbeatMonitorBuilder::new(TimeRange::new(ms(5), ms(900))),
            )
            .build()
            .unwrap();
        let monitor = health.get_heartbeat_monitor("alive").unwrap();
        assert_eq!(monitor.range(), TimeRange::new(ms(5), ms(900)));
    }

    #[test]
    fn start_without_monitors_fails() {
        let mut health = HealthMonitor::builder().build().unwrap();
        assert!(matches!(health.start(), Err(StartError::NoMonitors)));
    }

    #[test]
    fn start_twice_fails() {
        let mut health = health().build().unwrap();
        health.start().unwrap();
        assert!(health.is_running());
        assert!(matches!(health.start(), Err(StartError::AlreadyStarted)));
        health.stop();
        assert!(!health.is_running());
        health.stop();
    }

    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    #[test]
    fn start_can_be_retried_after_spawn_failure() {
        let recorder = Recorder::default();
        let mut health = health()
            .with_internal_processing_cycle(ms(10))
            .with_supervisor_api_cycle(ms(10))
            .alive_signal(AliveSignal::new(recorder.clone()))
            .build()
            .unwrap();
        health.get_heartbeat_monitor("alive").unwrap().disable().unwrap();

        let mut thread = SupervisionThread::new(MONITORING_THREAD_NAME, health.monitoring_loop());
        thread.set_stack_size(Some(usize::MAX / 2));
        health.thread = Some(thread);

        assert!(matches!(
            health.start(),
            Err(StartError::Supervision(SupervisionError::Spawn(_)))
        ));
        assert!(!health.is_running());

        if let Some(thread) = health.thread.as_mut() {
            thread.set_stack_size(None);
        }
        health.start().unwrap();
        assert!(health.is_running());

        // The alive signal survived the failed attempt.
        let waited = Instant::now();
        while recorder.keep_alives() == 0 && waited.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(ms(5));
        }
        health.stop();
        assert!(recorder.keep_alives() > 0);
    }

    #[test]
    fn aggregate_status() {
        let idle = IdentifierHash::new("Idle");
        let health = health()
            .add_logic_monitor("mode", LogicMonitorBuilder::new(idle))
            .build()
            .unwrap();

        let frame = health.get_deadline_monitor("frame").unwrap();
        let alive = health.get_heartbeat_monitor("alive").unwrap();
        let mode = health.get_logic_monitor("mode").unwrap();

        frame.disable().unwrap();
        alive.disable().unwrap();
        assert_eq!(health.status(), Status::Running);
        mode.disable().unwrap();
        assert_eq!(health.status(), Status::Disabled);

        mode.enable().unwrap();
        let _ = mode.transition(IdentifierHash::new("Busy"));
        assert_eq!(health.status(), Status::Failed);

        let report = health.report();
        assert_eq!(report.status, Status::Failed);
        assert_eq!(report.failed().collect::<Vec<_>>(), ["mode"]);
        assert_eq!(report.get("alive").map(|m| m.kind), Some(MonitorKind::Heartbeat));
    }

    #[test]
    fn evaluation_fails_silent_heartbeat() {
        let health = health().build().unwrap();
        let alive = health.get_heartbeat_monitor("alive").unwrap();
        let t0 = Instant::now();
        health.monitors.reset_heartbeats(t0);

        health.evaluate_at(t0 + ms(100));
        assert_eq!(health.status(), Status::Running);
        health.evaluate_at(t0 + ms(101));
        assert_eq!(alive.status(), Status::Failed);
        assert_eq!(health.status(), Status::Failed);
    }

    #[test]
    fn reports_published_every_supervisor_cycle() {
        let mut health = health()
            .with_internal_processing_cycle(ms(10))
            .with_supervisor_api_cycle(ms(30))
            .build()
            .unwrap();
        let mut monitoring = looper(&mut health);
        let t0 = Instant::now();
        health.monitors.reset_heartbeats(t0);

        monitoring.tick_at(t0 + ms(10));
        monitoring.tick_at(t0 + ms(20));
        assert!(health.latest_report().is_none());
        monitoring.tick_at(t0 + ms(30));
        let report = health.latest_report().unwrap();
        assert_eq!(report.status, Status::Running);
        assert_eq!(report.len(), 2);
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn subscribers_see_reports() {
        let mut health = health()
            .with_internal_processing_cycle(ms(10))
            .with_supervisor_api_cycle(ms(10))
            .build()
            .unwrap();
        let rx = health.subscribe();
        let mut monitoring = looper(&mut health);
        let t0 = Instant::now();
        health.monitors.reset_heartbeats(t0);

        monitoring.tick_at(t0 + ms(5));
        let report = rx.borrow().clone().unwrap();
        assert_eq!(report.status, Status::Running);
    }

    #[test]
    fn watchdog_is_starved_after_failure() {
        let recorder = Recorder::default();
        let mut health = health()
            .with_internal_processing_cycle(ms(10))
            .with_supervisor_api_cycle(ms(10))
            .alive_signal(AliveSignal::new(recorder.clone()))
            .build()
            .unwrap();
        let mut monitoring = looper(&mut health);
        let t0 = Instant::now();
        health.monitors.reset_heartbeats(t0);

        monitoring.tick_at(t0 + ms(10));
        monitoring.tick_at(t0 + ms(20));
        assert_eq!(recorder.keep_alives(), 2);

        monitoring.tick_at(t0 + ms(200));
        monitoring.tick_at(t0 + ms(210));
        assert_eq!(health.status(), Status::Failed);
        assert_eq!(recorder.keep_alives(), 2);
    }

    #[test]
    fn outputs_receive_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");
        let mut health = health()
            .with_internal_processing_cycle(ms(10))
            .with_supervisor_api_cycle(ms(10))
            .output(Output::file(&path))
            .build()
            .unwrap();
        let mut monitoring = looper(&mut health);
        let t0 = Instant::now();
        health.monitors.reset_heartbeats(t0);

        monitoring.tick_at(t0 + ms(10));
        let written: HealthReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
    }
}
