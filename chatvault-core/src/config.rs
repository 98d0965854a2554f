//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/chatvault/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/chatvault/` (~/.config/chatvault/)
//! - Data: `$XDG_DATA_HOME/chatvault/` (~/.local/share/chatvault/)
//! - State/Logs: `$XDG_STATE_HOME/chatvault/` (~/.local/state/chatvault/)
//!
//! Static behavior lives here; per-user runtime preferences belong in the
//! store's `settings` collection instead.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Import behavior
    #[serde(default)]
    pub import: ImportConfig,

    /// Database location override
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Import behavior
#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// Display name marking assistant turns in LINE-style logs
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Title for imported conversations when neither the document nor
    /// the filename offers one
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            fallback_title: default_fallback_title(),
        }
    }
}

fn default_assistant_name() -> String {
    "Claude".to_string()
}

fn default_fallback_title() -> String {
    "Imported conversation".to_string()
}

/// Database location override
#[derive(Debug, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Override path for the SQLite file
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/chatvault/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("chatvault").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/chatvault/`
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("chatvault")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/chatvault/`
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("chatvault")
    }

    /// Returns the database file path, honoring the config override
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("chatvault.db"))
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/chatvault/chatvault.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("chatvault.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.import.assistant_name, "Claude");
        assert_eq!(config.import.fallback_title, "Imported conversation");
        assert_eq!(config.logging.level, "info");
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[import]
assistant_name = "Aria"

[database]
path = "/tmp/test.db"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.import.assistant_name, "Aria");
        assert_eq!(config.import.fallback_title, "Imported conversation");
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/test.db")));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/test.db"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().ends_with("chatvault/chatvault.db"));
    }
}
