//! ## Configuration
//!
//! Settings are layered with figment:
//!
//! 1. built-in defaults
//! 2. a TOML file (`scpi-ctl.toml` unless another path is given), if present
//! 3. environment variables prefixed with `SCPICTL_`, `__` between sections
//!
//! ```text
//! SCPICTL_SESSION__DEFAULT_TIMEOUT_MS=5000
//! SCPICTL_EXPORT__DIRECTORY=/tmp/traces
//! SCPICTL_LOGGING__LEVEL=debug
//! ```
//!

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::limits;
use crate::export::CsvTraceExporter;
use crate::session::SessionConfig;

pub const DEFAULT_CONFIG_FILE: &str = "scpi-ctl.toml";
pub const ENV_PREFIX: &str = "SCPICTL_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration load error: {0}")]
    Load(#[from] figment::Error),
    #[error("configuration validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionSettings,
    pub export: ExportSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Timeout applied to every newly opened session
    pub default_timeout_ms: u32,
    /// Read budget of every newly opened session
    pub default_read_bytes: usize,
    pub write_termination: String,
    pub identify_command: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        SessionSettings {
            default_timeout_ms: session.default_timeout_ms,
            default_read_bytes: session.default_read_bytes,
            write_termination: session.write_termination,
            identify_command: session.identify_command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub directory: PathBuf,
    pub prefix: String,
    pub extension: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            directory: PathBuf::from("."),
            prefix: "trace".to_string(),
            extension: "csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// ### Load
    ///
    /// Layer defaults, the TOML file at `path` (or [`DEFAULT_CONFIG_FILE`])
    /// and the environment, then validate. A missing file is not an error.
    ///
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::from_figment(
            Self::base()
                .merge(Toml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Defaults overlaid with the TOML document `toml`.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::from_figment(Self::base().merge(Toml::string(toml)))
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if !(limits::TIMEOUT_MIN_MS..=limits::TIMEOUT_MAX_MS).contains(&session.default_timeout_ms) {
            return Err(ConfigError::Validation(format!(
                "session.default_timeout_ms {} must be between {} and {}",
                session.default_timeout_ms,
                limits::TIMEOUT_MIN_MS,
                limits::TIMEOUT_MAX_MS
            )));
        }

        if !(1..=limits::MAX_READ_BYTES).contains(&session.default_read_bytes) {
            return Err(ConfigError::Validation(format!(
                "session.default_read_bytes {} must be between 1 and {}",
                session.default_read_bytes,
                limits::MAX_READ_BYTES
            )));
        }

        if session.identify_command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "session.identify_command cannot be empty".to_string(),
            ));
        }

        if self.export.prefix.is_empty() || self.export.extension.is_empty() {
            return Err(ConfigError::Validation(
                "export.prefix and export.extension cannot be empty".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "invalid logging.level '{}'. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            default_timeout_ms: self.session.default_timeout_ms,
            default_read_bytes: self.session.default_read_bytes,
            write_termination: self.session.write_termination.clone(),
            identify_command: self.session.identify_command.clone(),
        }
    }

    pub fn exporter(&self) -> CsvTraceExporter {
        CsvTraceExporter::new(
            self.export.directory.clone(),
            self.export.prefix.clone(),
            self.export.extension.clone(),
        )
    }
}
