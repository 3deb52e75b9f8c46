//! Configuration module for gator.
//!
//! The config file is a small TOML record holding the database URL and the
//! active user, plus optional logging and fetch settings. It is read once at
//! startup and written back whenever the active user changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{GatorError, Result};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "GATOR_CONFIG";

/// Environment variable overriding the database URL.
pub const DB_URL_ENV: &str = "GATOR_DB_URL";

/// Config file name inside the home directory.
pub const CONFIG_FILE_NAME: &str = ".gatorconfig.toml";

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; logs always go to stderr as well.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Feed fetching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total request timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_user_agent() -> String {
    format!("gator/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL.
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// Name of the active user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Feed fetching configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[cfg(not(feature = "postgres"))]
fn default_db_url() -> String {
    "sqlite://gator.db?mode=rwc".to_string()
}

#[cfg(feature = "postgres")]
fn default_db_url() -> String {
    "postgres://localhost/gator".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: default_db_url(),
            current_user_name: None,
            logging: LoggingConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the config file location.
    ///
    /// `GATOR_CONFIG` wins; otherwise the file lives in the home directory.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        dirs::home_dir()
            .map(|home| home.join(CONFIG_FILE_NAME))
            .ok_or_else(|| GatorError::Config("cannot determine home directory".to_string()))
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(GatorError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| GatorError::Config(format!("config parse error: {e}")))
    }

    /// Write the configuration back to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GatorError::Config(format!("config serialize error: {e}")))?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `GATOR_DB_URL`: Override the database URL
    pub fn apply_env_overrides(&mut self) {
        if let Ok(db_url) = std::env::var(DB_URL_ENV) {
            if !db_url.is_empty() {
                self.db_url = db_url;
            }
        }
    }

    /// Set the active user.
    pub fn set_current_user(&mut self, name: impl Into<String>) {
        self.current_user_name = Some(name.into());
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.db_url.trim().is_empty() {
            return Err(GatorError::Config("db_url must not be empty".to_string()));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(GatorError::Config(
                "fetch.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
