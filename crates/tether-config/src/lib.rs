//! Configuration for the tether CLI.
//!
//! TOML file + `TETHER_` environment overrides, loaded with figment, and
//! translation to `tether_core::ManagerConfig`. The core itself never
//! reads files; the binary resolves a [`Config`] here and hands the
//! runtime part to `ConnectionManager::start`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tether_core::ManagerConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub log: LogSettings,

    #[serde(default)]
    pub simulator: SimulatorSettings,
}

/// Session scope behaviour, mapped onto [`ManagerConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Milliseconds to wait for a cancelled scope's tasks to finish.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Reject non-canonical connection transitions instead of warning.
    #[serde(default)]
    pub strict_transitions: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
            strict_transitions: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogSettings {
    /// Filter used when neither `RUST_LOG` nor `-v` is given.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file; stderr only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// The simulated device driven by `tether simulate`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimulatorSettings {
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_firmware")]
    pub firmware: String,

    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,

    /// Delay between a connection and its metadata becoming available.
    #[serde(default = "default_metadata_delay_ms")]
    pub metadata_delay_ms: u64,

    /// Heartbeat interval of the per-session task.
    #[serde(default = "default_session_tick_ms")]
    pub session_tick_ms: u64,

    /// How long each simulated connection stays up.
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            firmware: default_firmware(),
            capabilities: default_capabilities(),
            metadata_delay_ms: default_metadata_delay_ms(),
            session_tick_ms: default_session_tick_ms(),
            hold_ms: default_hold_ms(),
        }
    }
}

fn default_drain_timeout_ms() -> u64 {
    5_000
}
fn default_log_level() -> String {
    "warn".into()
}
fn default_device_name() -> String {
    "Pebble Time".into()
}
fn default_firmware() -> String {
    "v4.4.0".into()
}
fn default_capabilities() -> Vec<String> {
    vec!["app_run_state".into(), "health".into(), "voice".into()]
}
fn default_metadata_delay_ms() -> u64 {
    50
}
fn default_session_tick_ms() -> u64 {
    100
}
fn default_hold_ms() -> u64 {
    300
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl Config {
    /// Reject values the CLI cannot act on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.drain_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                field: "session.drain_timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.log.level.as_str()) {
            return Err(ConfigError::Validation {
                field: "log.level".into(),
                reason: format!(
                    "expected one of {}, got '{}'",
                    LOG_LEVELS.join(", "),
                    self.log.level
                ),
            });
        }
        if self.simulator.device_name.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "simulator.device_name".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.simulator.session_tick_ms == 0 {
            return Err(ConfigError::Validation {
                field: "simulator.session_tick_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Runtime settings for `ConnectionManager::start`.
    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            scope_drain_timeout: Duration::from_millis(self.session.drain_timeout_ms),
            enforce_canonical_transitions: self.session.strict_transitions,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("rs", "tether", "tether").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("tether");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from defaults, file and environment.
///
/// An explicit `path` must exist; the platform default may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(p) if !p.is_file() => {
            return Err(ConfigError::NotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&file))
        .merge(Env::prefixed("TETHER_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default(path: Option<&Path>) -> Config {
    load_config(path).unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent dirs.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
