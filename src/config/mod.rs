//! Configuration management for the resolver
//!
//! Settings arrive either as a TOML file or as a structured JSON value handed
//! over by the host framework. Both forms share one serde model whose fields
//! all carry defaults, so a partial `persistence` object is enough.
//!
//! ```toml
//! [persistence]
//! host = "localhost"
//! port = 27017
//! database = "shop"
//! normalizeIdFields = true
//!
//! [logging]
//! level = "debug"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Backend connection and result-shaping settings
    #[serde(default)]
    pub persistence: PersistenceSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Keys recognized under the `persistence` settings object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistenceSettings {
    /// Full connection URI; takes precedence over host/port/credentials
    #[serde(default)]
    pub url: Option<String>,

    /// Server host name
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Default database, also the authentication source
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub enable_ssl: Option<bool>,

    /// Apply the id-only normalization pass to controller results
    #[serde(rename = "normalizeIdFields", default)]
    pub normalize_id_fields: bool,

    /// Accept `;`-terminated statements and run them through server-side `eval`
    #[serde(default)]
    pub allow_server_eval: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
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
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            database: None,
            enable_ssl: None,
            normalize_id_fields: false,
            allow_server_eval: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Result<Settings>` - Loaded and validated settings or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
            _ => ConfigError::InvalidFormat(e.to_string()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        settings.persistence.validate()?;
        Ok(settings)
    }

    /// Build settings from a structured value such as `{"persistence": {...}}`
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let settings: Settings = serde_json::from_value(value)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        settings.persistence.validate()?;
        Ok(settings)
    }

    /// Default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongo-resolver")
            .join("config.toml")
    }
}

impl PersistenceSettings {
    /// Validate the connection-related fields
    ///
    /// Either a non-empty `url` or a non-empty `host` with a non-zero port is required.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "url".to_string(),
                    value: url.clone(),
                }
                .into());
            }
            return Ok(());
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host".to_string()).into());
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: self.port.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Username, if one is configured and not blank
    pub fn credential_username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
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
