//! Configuration management for mongoport
//!
//! Configuration is read from a TOML file (by default
//! `~/.mongoport/config.toml`). Every field has a default so a partial file,
//! or no file at all, is valid.
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Transfer engine tuning
    #[serde(default)]
    pub transfer: TransferConfig,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Default MongoDB connection URI
    #[serde(default = "default_uri")]
    pub default_uri: String,

    /// Server selection / connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Transfer engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Documents fetched per cursor batch and inserted per native import batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Records processed between two pause/cancel polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Recent diagnostic lines kept for tool failure messages
    #[serde(default = "default_diagnostic_lines")]
    pub diagnostic_lines: usize,

    /// Maximum depth scanned when classifying a dump directory
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,

    /// Ask the dump tool for gzip-compressed archives
    #[serde(default = "default_gzip")]
    pub gzip: bool,

    /// Default export engine
    #[serde(default)]
    pub engine: EngineKind,
}

/// Which implementation performs an export
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process streaming exporter writing zip archives
    #[default]
    Native,

    /// External `mongodump` / `mongorestore`
    Tool,
}

/// External tool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Explicit `mongodump` binary; resolved from PATH when unset
    #[serde(default)]
    pub dump_path: Option<PathBuf>,

    /// Explicit `mongorestore` binary; resolved from PATH when unset
    #[serde(default)]
    pub restore_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    1000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_diagnostic_lines() -> usize {
    20
}

fn default_scan_depth() -> usize {
    5
}

fn default_gzip() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl ConnectionConfig {
    /// Get connection timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_uri: default_uri(),
            timeout: default_timeout(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval: default_poll_interval(),
            diagnostic_lines: default_diagnostic_lines(),
            scan_depth: default_scan_depth(),
            gzip: default_gzip(),
            engine: EngineKind::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// When `path` is `None` the default location is used. A missing file
    /// yields the default configuration.
    ///
    /// # Arguments
    /// * `path` - Optional path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::FileUnreadable(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongoport")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, u64); 4] = [
            ("transfer.batch_size", self.transfer.batch_size as u64),
            ("transfer.poll_interval", self.transfer.poll_interval),
            ("transfer.diagnostic_lines", self.transfer.diagnostic_lines as u64),
            ("transfer.scan_depth", self.transfer.scan_depth as u64),
        ];

        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }

        let uri = &self.connection.default_uri;
        if !uri.starts_with("mongodb://") && !uri.starts_with("mongodb+srv://") {
            return Err(ConfigError::InvalidValue {
                field: "connection.default_uri".to_string(),
                value: crate::utils::mask::mask_credentials(uri),
            }
            .into());
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.default_uri, "mongodb://localhost:27017");
        assert_eq!(config.transfer.poll_interval, 100);
        assert_eq!(config.transfer.scan_depth, 5);
        assert_eq!(config.transfer.engine, EngineKind::Native);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [transfer]
            engine = "tool"
            gzip = false

            [tools]
            dump_path = "/opt/mongo/bin/mongodump"
            "#,
        )
        .unwrap();

        assert_eq!(config.transfer.engine, EngineKind::Tool);
        assert!(!config.transfer.gzip);
        assert_eq!(config.transfer.batch_size, 1000);
        assert_eq!(
            config.tools.dump_path,
            Some(PathBuf::from("/opt/mongo/bin/mongodump"))
        );
        assert!(config.tools.restore_path.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.transfer.poll_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config =
            Config::load_from_file(Some(Path::new("/nonexistent/mongoport/config.toml"))).unwrap();
        assert_eq!(config.transfer.diagnostic_lines, 20);
    }

    #[test]
    fn test_toml_roundtrip_keeps_engine() {
        let mut config = Config::default();
        config.transfer.engine = EngineKind::Tool;
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap().transfer.engine, EngineKind::Tool);
    }

    #[test]
    fn test_connection_timeout() {
        let config = Config::default();
        assert_eq!(config.connection.timeout_duration(), Duration::from_secs(30));
    }
}
