//! Configuration loading and typed config structures for the Tripwire engine.
//!
//! The engine reads a single YAML file (`tripwire-config.yaml` by default).
//! Every section is optional; missing values fall back to the defaults
//! below. The file also carries the [`Blueprint`] to build and the
//! [`SandboxConfig`] it runs against.

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::Deserialize;

use crate::blueprint::{Blueprint, BuildDefaults, SandboxConfig};

/// Environment variable that overrides [`EngineConfig::save_path`].
pub const SAVE_PATH_ENV: &str = "TRIPWIRE_SAVE_PATH";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TripwireConfig {
    /// Runner settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Actor memory defaults.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// The trigger graph to build.
    #[serde(default)]
    pub blueprint: Blueprint,

    /// Actors, entities and groups for the stub host.
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl TripwireConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `TRIPWIRE_SAVE_PATH` overrides `engine.save_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.engine.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.engine.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults the blueprint builder applies to unset node settings.
    pub fn build_defaults(&self) -> BuildDefaults {
        BuildDefaults {
            ttl: secs(self.memory.default_ttl_secs),
            debounce: secs(self.memory.message_debounce_secs),
            utc_offset_minutes: self.engine.utc_offset_minutes,
        }
    }
}

fn secs(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Runner settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Random seed for counter rolls.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Real-time milliseconds between runner ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Number of ticks to run before stopping.
    #[serde(default = "default_run_ticks")]
    pub run_ticks: u64,

    /// Local time offset applied to daily schedule windows.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Where to load the world from at startup and save it on exit.
    #[serde(default)]
    pub save_path: Option<PathBuf>,
}

impl EngineConfig {
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(SAVE_PATH_ENV).filter(|p| !p.is_empty()) {
            self.save_path = Some(PathBuf::from(path));
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            tick_interval_ms: default_tick_interval_ms(),
            run_ticks: default_run_ticks(),
            utc_offset_minutes: 0,
            save_path: None,
        }
    }
}

const fn default_seed() -> u64 {
    42
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_run_ticks() -> u64 {
    600
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// Actor memory defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemoryConfig {
    /// Record lifetime for memory nodes that do not set `ttl_secs`.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Per-actor announcement debounce for threshold message nodes.
    #[serde(default = "default_message_debounce_secs")]
    pub message_debounce_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            message_debounce_secs: default_message_debounce_secs(),
        }
    }
}

const fn default_ttl_secs() -> u64 {
    60
}

const fn default_message_debounce_secs() -> u64 {
    300
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TripwireConfig::default();
        assert_eq!(config.engine.seed, 42);
        assert_eq!(config.engine.tick_interval_ms, 100);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.memory.default_ttl_secs, 60);
        assert!(config.blueprint.nodes.is_empty());
    }

    #[test]
    fn parse_minimal_yaml() {
        let config: TripwireConfig = serde_yml::from_str("engine:\n  seed: 7\n").unwrap();
        assert_eq!(config.engine.seed, 7);
        assert_eq!(config.engine.run_ticks, 600);
        assert_eq!(config.memory.message_debounce_secs, 300);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
engine:
  seed: 9
  tick_interval_ms: 50
  run_ticks: 20
  utc_offset_minutes: -300
  save_path: world.trip
logging:
  level: debug
  json: true
memory:
  default_ttl_secs: 10
  message_debounce_secs: 30
sandbox:
  actors:
    - { name: hero }
blueprint:
  nodes:
    - { name: gate, kind: state_controller }
  stimuli:
    - { at_tick: 1, actor: hero, action: fire, node: gate }
";
        let config: TripwireConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.engine.save_path, Some(PathBuf::from("world.trip")));
        assert!(config.logging.json);
        assert_eq!(config.blueprint.nodes.len(), 1);
        assert_eq!(config.sandbox.actors.len(), 1);

        let defaults = config.build_defaults();
        assert_eq!(defaults.ttl, TimeDelta::seconds(10));
        assert_eq!(defaults.debounce, TimeDelta::seconds(30));
        assert_eq!(defaults.utc_offset_minutes, -300);
    }

    #[test]
    fn save_path_override() {
        let mut engine = EngineConfig::default();
        engine.apply_overrides(|key| (key == SAVE_PATH_ENV).then(|| "/tmp/w.trip".to_owned()));
        assert_eq!(engine.save_path, Some(PathBuf::from("/tmp/w.trip")));

        engine.apply_overrides(|_| Some(String::new()));
        assert_eq!(engine.save_path, Some(PathBuf::from("/tmp/w.trip")));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            TripwireConfig::parse("engine: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
