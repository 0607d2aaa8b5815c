//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use tether_config::ConfigError;
use tether_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const SESSION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Session ──────────────────────────────────────────────────────

    #[error("No live session scope")]
    #[diagnostic(
        code(tether::scope_closed),
        help("The simulated device was not connected when the task was spawned.")
    )]
    ScopeClosed,

    #[error("Invalid connection transition: {from} -> {to}")]
    #[diagnostic(
        code(tether::invalid_transition),
        help(
            "Strict transitions are enabled.\n\
             Drop --strict, set session.strict_transitions = false, or report Connecting first."
        )
    )]
    InvalidTransition { from: String, to: String },

    #[error("No async runtime available")]
    #[diagnostic(code(tether::no_runtime))]
    NoRuntime,

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tether::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file not found")]
    #[diagnostic(
        code(tether::no_config),
        help(
            "Create one with: tether config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(tether::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(tether::config))]
    Config(Box<figment::Error>),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(tether::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(tether::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ScopeClosed => exit_code::SESSION,
            Self::InvalidTransition { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::NoConfig { .. } => exit_code::NOT_FOUND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ScopeClosed => CliError::ScopeClosed,
            CoreError::InvalidTransition { from, to } => CliError::InvalidTransition {
                from: from.into(),
                to: to.into(),
            },
            CoreError::NoRuntime => CliError::NoRuntime,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NotFound { path } => CliError::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Figment(err) => CliError::Config(err),
            ConfigError::Serialization(err) => CliError::Toml(err),
            ConfigError::Io(err) => CliError::Io(err),
        }
    }
}
