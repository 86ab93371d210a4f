use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use hmon_sdk::config::HealthMonitorConfig;
use hmon_sdk::{
    AliveSignal, Deadline, DeadlineMonitorBuilder, HealthMonitorBuilder, HeartbeatMonitor,
    HeartbeatMonitorBuilder, IdentifierHash, InitError, LogicMonitor, LogicMonitorBuilder, Output,
    StopToken, Supervised, SupervisionThread, TimeRange,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const APP_MONITOR: &str = "app";
const CYCLE_DEADLINE: &str = "cycle";
const MAIN_LOOP_MONITOR: &str = "main-loop";
const LIFECYCLE_MONITOR: &str = "lifecycle";

#[derive(Parser, Debug)]
#[command(name = "hmon-demo")]
#[command(about = "Demo application supervised by the hmon health monitor")]
struct Args {
    /// Simulated work time per cycle in milliseconds
    #[arg(short, long, default_value = "50")]
    response_time: u64,

    /// Abort the process after this many milliseconds
    #[arg(short, long)]
    crash_after: Option<u64>,

    /// Fail during initialization
    #[arg(short = 's', long)]
    fail_to_start: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Health monitor configuration file (TOML, YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write health reports to this JSON file
    #[arg(long)]
    report: Option<PathBuf>,
}

struct States {
    starting: IdentifierHash,
    running: IdentifierHash,
    stopping: IdentifierHash,
}

impl States {
    fn new() -> Self {
        Self {
            starting: IdentifierHash::new("Starting"),
            running: IdentifierHash::new("Running"),
            stopping: IdentifierHash::new("Stopping"),
        }
    }
}

/// The simulated workload: one deadline and one heartbeat per cycle.
struct LifecycleApp {
    response_time: Duration,
    crash_after: Option<Duration>,
    fail_to_start: bool,
    exit: Arc<AtomicBool>,
    deadline: Deadline,
    heartbeat: HeartbeatMonitor,
}

impl Supervised for LifecycleApp {
    fn init(&mut self) -> Result<(), InitError> {
        if self.fail_to_start {
            return Err(InitError::new("simulated start-up failure"));
        }
        info!(response_ms = self.response_time.as_millis() as u64, "application initialized");
        Ok(())
    }

    fn run(&mut self, stop: &StopToken) {
        let started = Instant::now();
        while !stop.is_stopped() && !self.exit.load(Ordering::SeqCst) {
            if let Some(crash_after) = self.crash_after {
                if started.elapsed() >= crash_after {
                    error!("simulated crash");
                    std::process::abort();
                }
            }

            if let Err(err) = self.deadline.start() {
                warn!(error = %err, "could not start cycle deadline");
            }
            if stop.wait_timeout(self.response_time) {
                break;
            }
            if let Err(err) = self.deadline.stop() {
                warn!(error = %err, "could not stop cycle deadline");
            }
            self.heartbeat.heartbeat();
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(feature = "systemd")]
fn alive_signal() -> AliveSignal {
    AliveSignal::new(hmon_alive::systemd::SystemdWatchdog::new())
}

#[cfg(not(feature = "systemd"))]
fn alive_signal() -> AliveSignal {
    AliveSignal::new(hmon_alive::LogWatchdog::new())
}

/// Monitors for the demo workload, on top of whatever the configuration
/// file declared.
fn demo_monitors(builder: HealthMonitorBuilder, args: &Args, states: &States) -> HealthMonitorBuilder {
    let response = Duration::from_millis(args.response_time);
    let cycle = TimeRange::new(Duration::ZERO, response * 2 + Duration::from_millis(50));
    let gap = TimeRange::new(Duration::ZERO, response * 4 + Duration::from_millis(200));

    builder
        .add_deadline_monitor(
            APP_MONITOR,
            DeadlineMonitorBuilder::new().add_deadline(CYCLE_DEADLINE, cycle),
        )
        .add_heartbeat_monitor(MAIN_LOOP_MONITOR, HeartbeatMonitorBuilder::new(gap))
        .add_logic_monitor(
            LIFECYCLE_MONITOR,
            LogicMonitorBuilder::new(states.starting)
                .add_transition(states.starting, states.running)
                .add_transition(states.running, states.stopping)
                .add_transition(states.starting, states.stopping),
        )
        .alive_signal(alive_signal().with_minimum_time(Duration::from_millis(100)))
}

fn transition(lifecycle: &LogicMonitor, to: IdentifierHash) {
    if let Err(err) = lifecycle.transition(to) {
        warn!(error = %err, "lifecycle transition rejected");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let exit = Arc::new(AtomicBool::new(false));
    let exit_flag = Arc::clone(&exit);
    ctrlc::set_handler(move || exit_flag.store(true, Ordering::SeqCst))
        .context("Failed to set signal handler")?;

    let config = HealthMonitorConfig::load(args.config.as_deref())
        .context("Failed to load health monitor configuration")?;
    let states = States::new();
    let mut builder = demo_monitors(config.into_builder()?, &args, &states);
    if let Some(path) = &args.report {
        builder = builder.output(Output::file(path));
    }
    let mut health = builder.build()?;

    let deadline = health.get_deadline_monitor(APP_MONITOR)?.get_deadline(CYCLE_DEADLINE)?;
    let heartbeat = health.get_heartbeat_monitor(MAIN_LOOP_MONITOR)?;
    let lifecycle = health.get_logic_monitor(LIFECYCLE_MONITOR)?;

    health.start()?;
    #[cfg(feature = "systemd")]
    hmon_alive::systemd::notify_ready()?;

    let mut app = SupervisionThread::new(
        "hmon-demo-app",
        LifecycleApp {
            response_time: Duration::from_millis(args.response_time),
            crash_after: args.crash_after.map(Duration::from_millis),
            fail_to_start: args.fail_to_start,
            exit: Arc::clone(&exit),
            deadline,
            heartbeat,
        },
    );
    if let Err(err) = app.start() {
        transition(&lifecycle, states.stopping);
        health.stop();
        return Err(err).context("Application failed to start");
    }
    transition(&lifecycle, states.running);

    let mut failed = false;
    while !exit.load(Ordering::SeqCst) && app.is_running() {
        if health.status().is_failed() {
            let report = health.report();
            let failed_monitors: Vec<&str> = report.failed().collect();
            error!(monitors = ?failed_monitors, "health monitor reported a failure");
            failed = true;
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    info!("shutting down");
    app.stop();
    transition(&lifecycle, states.stopping);
    health.stop();

    if failed {
        bail!("health monitoring detected a failure");
    }
    Ok(())
}
