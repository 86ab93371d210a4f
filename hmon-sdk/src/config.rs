//! Declarative health monitor configuration.
//!
//! A [`HealthMonitorConfig`] is read from an optional file (format picked by
//! extension) layered with `HMON_*` environment variables, where `__`
//! separates nested keys:
//!
//! ```toml
//! internal_processing_cycle_ms = 50
//! supervisor_api_cycle_ms = 250
//! report_file = "/run/hmon/health.json"
//!
//! [deadline_monitors.render.deadlines]
//! frame = { min_ms = 5, max_ms = 40 }
//!
//! [heartbeat_monitors.main]
//! min_ms = 10
//! max_ms = 500
//!
//! [logic_monitors.mode]
//! initial = "Idle"
//! transitions = [
//!     { from = "Idle", to = "Busy" },
//!     { from = "Busy", to = "Idle" },
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File};
use hmon_types::TimeRange;
use serde::Deserialize;

use crate::deadline::DeadlineMonitorBuilder;
use crate::error::ConfigError;
use crate::hash::IdentifierHash;
use crate::heartbeat::HeartbeatMonitorBuilder;
use crate::logic::LogicMonitorBuilder;
use crate::monitor::{
    HealthMonitorBuilder, DEFAULT_INTERNAL_PROCESSING_CYCLE, DEFAULT_SUPERVISOR_API_CYCLE,
};
use crate::output::Output;

const ENV_PREFIX: &str = "HMON";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthMonitorConfig {
    pub internal_processing_cycle_ms: u64,
    pub supervisor_api_cycle_ms: u64,
    /// Write each report as JSON to this file.
    pub report_file: Option<PathBuf>,
    pub deadline_monitors: BTreeMap<String, DeadlineMonitorConfig>,
    pub heartbeat_monitors: BTreeMap<String, RangeConfig>,
    pub logic_monitors: BTreeMap<String, LogicMonitorConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeadlineMonitorConfig {
    /// Registered deadline ranges, keyed by deadline tag.
    pub deadlines: BTreeMap<String, RangeConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RangeConfig {
    #[serde(default)]
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogicMonitorConfig {
    pub initial: String,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransitionConfig {
    pub from: String,
    pub to: String,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            internal_processing_cycle_ms: DEFAULT_INTERNAL_PROCESSING_CYCLE.as_millis() as u64,
            supervisor_api_cycle_ms: DEFAULT_SUPERVISOR_API_CYCLE.as_millis() as u64,
            report_file: None,
            deadline_monitors: BTreeMap::new(),
            heartbeat_monitors: BTreeMap::new(),
            logic_monitors: BTreeMap::new(),
        }
    }
}

impl RangeConfig {
    fn to_range(self, monitor: &str) -> Result<TimeRange, ConfigError> {
        TimeRange::from_millis(self.min_ms, self.max_ms).map_err(|source| {
            ConfigError::InvalidRange {
                monitor: monitor.to_owned(),
                source,
            }
        })
    }
}

impl HealthMonitorConfig {
    /// Load from `path` (if any) with `HMON_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn internal_processing_cycle(&self) -> Duration {
        Duration::from_millis(self.internal_processing_cycle_ms)
    }

    pub fn supervisor_api_cycle(&self) -> Duration {
        Duration::from_millis(self.supervisor_api_cycle_ms)
    }

    /// Turn the configuration into a builder. Outputs other than the report
    /// file and the alive signal can still be added afterwards.
    pub fn into_builder(self) -> Result<HealthMonitorBuilder, ConfigError> {
        let mut builder = HealthMonitorBuilder::new()
            .with_internal_processing_cycle(self.internal_processing_cycle())
            .with_supervisor_api_cycle(self.supervisor_api_cycle());

        if let Some(path) = self.report_file {
            builder = builder.output(Output::file(path));
        }

        for (tag, monitor) in self.deadline_monitors {
            let mut deadlines = DeadlineMonitorBuilder::new();
            for (deadline, range) in monitor.deadlines {
                deadlines = deadlines.add_deadline(deadline, range.to_range(&tag)?);
            }
            builder = builder.add_deadline_monitor(tag, deadlines);
        }

        for (tag, range) in self.heartbeat_monitors {
            let range = range.to_range(&tag)?;
            builder = builder.add_heartbeat_monitor(tag, HeartbeatMonitorBuilder::new(range));
        }

        for (tag, monitor) in self.logic_monitors {
            let mut logic = LogicMonitorBuilder::new(IdentifierHash::new(&monitor.initial));
            for transition in &monitor.transitions {
                logic = logic.add_transition(
                    IdentifierHash::new(&transition.from),
                    IdentifierHash::new(&transition.to),
                );
            }
            builder = builder.add_logic_monitor(tag, logic);
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
internal_processing_cycle_ms = 50
supervisor_api_cycle_ms = 250

[deadline_monitors.render.deadlines]
frame = { min_ms = 5, max_ms = 40 }

[heartbeat_monitors.main]
min_ms = 10
max_ms = 500

[logic_monitors.mode]
initial = "Idle"
transitions = [
    { from = "Idle", to = "Busy" },
    { from = "Busy", to = "Idle" },
]
"#;

    fn write_config(contents: &str, extension: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_file() {
        let config = HealthMonitorConfig::default();
        assert_eq!(config.internal_processing_cycle(), Duration::from_millis(100));
        assert_eq!(config.supervisor_api_cycle(), Duration::from_millis(500));
    }

    #[test]
    fn loads_toml() {
        let file = write_config(SAMPLE, ".toml");
        let config = HealthMonitorConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.internal_processing_cycle_ms, 50);
        assert_eq!(
            config.deadline_monitors["render"].deadlines["frame"],
            RangeConfig {
                min_ms: 5,
                max_ms: 40
            }
        );
        assert_eq!(config.heartbeat_monitors["main"].max_ms, 500);
        assert_eq!(config.logic_monitors["mode"].transitions.len(), 2);
    }

    #[test]
    fn loads_json() {
        let file = write_config(
            r#"{ "heartbeat_monitors": { "hb": { "max_ms": 100 } } }"#,
            ".json",
        );
        let config = HealthMonitorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.heartbeat_monitors["hb"].min_ms, 0);
        assert_eq!(config.supervisor_api_cycle_ms, 500);
    }

    #[test]
    fn builds_monitors() {
        let file = write_config(SAMPLE, ".toml");
        let health = HealthMonitorConfig::load(Some(file.path()))
            .unwrap()
            .into_builder()
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(health.internal_processing_cycle(), Duration::from_millis(50));
        let render = health.get_deadline_monitor("render").unwrap();
        assert!(render.get_deadline("frame").is_ok());
        assert!(health.get_heartbeat_monitor("main").is_ok());

        let mode = health.get_logic_monitor("mode").unwrap();
        assert_eq!(mode.state(), IdentifierHash::of("Idle"));
        mode.transition(IdentifierHash::of("Busy")).unwrap();
    }

    #[test]
    fn rejects_inverted_range() {
        let mut config = HealthMonitorConfig::default();
        config.heartbeat_monitors.insert(
            "hb".into(),
            RangeConfig {
                min_ms: 50,
                max_ms: 10,
            },
        );
        match config.into_builder() {
            Err(ConfigError::InvalidRange { monitor, .. }) => assert_eq!(monitor, "hb"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn environment_adds_monitors() {
        // Unique key; other tests in this process only ever see an extra monitor.
        let key = "HMON_HEARTBEAT_MONITORS__ENVLAYER__MAX_MS";
        std::env::set_var(key, "250");
        let loaded = HealthMonitorConfig::load(None);
        std::env::remove_var(key);

        let config = loaded.unwrap();
        assert_eq!(
            config.heartbeat_monitors["envlayer"],
            RangeConfig {
                min_ms: 0,
                max_ms: 250
            }
        );
        let health = config.into_builder().unwrap().build().unwrap();
        assert_eq!(
            health.get_heartbeat_monitor("envlayer").unwrap().range().max,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn unreadable_file_is_a_load_error() {
        let missing = Path::new("/definitely/not/here/hmon.toml");
        assert!(matches!(
            HealthMonitorConfig::load(Some(missing)),
            Err(ConfigError::Load(_))
        ));
    }
}
