//! Configuration management for TacSync.
//!
//! Configuration is read from a TOML file, every optional field falls back to
//! a serde default, environment overrides are applied on top and the result
//! is validated before any session is built from it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

use crate::geo::Coordinate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root configuration for a sync session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub aircraft: AircraftConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Endpoints of the coordination server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the REST collaborator, e.g. `http://10.0.0.5:8000`
    pub api_base_url: String,
    /// Streaming endpoint, e.g. `ws://10.0.0.5:8000/ws/mog`
    pub ws_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_delay")]
    pub delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
    /// Position reported by the static provider of headless deployments.
    #[serde(default)]
    pub fixed_position: Option<Coordinate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_call_sign")]
    pub call_sign: String,
}

/// Which tracked aircraft the map layer is allowed to show.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AircraftVisibility {
    /// Every aircraft in the reconciled collection
    #[default]
    All,
    /// Only aircraft referenced by a pending or accepted to-aircraft task
    TaskedOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AircraftConfig {
    #[serde(default)]
    pub visibility: AircraftVisibility,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_reconnect_delay() -> u64 {
    7000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_sample_interval() -> u64 {
    5000
}

fn default_username() -> String {
    "mobile_user".to_string()
}

fn default_call_sign() -> String {
    "mobile".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_reconnect_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval(),
            fixed_position: None,
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            call_sign: default_call_sign(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

impl SyncConfig {
    /// Configuration pointing at a coordination server on the local host.
    pub fn local() -> Self {
        Self {
            server: ServerConfig {
                api_base_url: "http://127.0.0.1:8000".to_string(),
                ws_url: "ws://127.0.0.1:8000/ws/mog".to_string(),
            },
            reconnect: ReconnectConfig::default(),
            location: LocationConfig::default(),
            operator: OperatorConfig::default(),
            aircraft: AircraftConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load, override from the environment and validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Startup entry point for binaries: the file at `path` when given,
    /// otherwise [`SyncConfig::local`] with environment overrides.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let config = Self::local().with_env_overrides();
                config.validate()?;
                config
            }
        };
        Ok(config)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(api_url) = non_empty_env("TACSYNC_API_URL") {
            self.server.api_base_url = api_url;
        }
        if let Some(ws_url) = non_empty_env("TACSYNC_WS_URL") {
            self.server.ws_url = ws_url;
        }
        if let Some(username) = non_empty_env("TACSYNC_USERNAME") {
            self.operator.username = username;
        }
        if let Some(call_sign) = non_empty_env("TACSYNC_CALL_SIGN") {
            self.operator.call_sign = call_sign;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.server.api_base_url, &["http", "https"], "server.api_base_url")?;
        validate_url(&self.server.ws_url, &["ws", "wss"], "server.ws_url")?;

        if self.reconnect.delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "reconnect.delay_ms must be greater than zero".to_string(),
            ));
        }
        if self.location.sample_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "location.sample_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.operator.username.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "operator.username cannot be empty".to_string(),
            ));
        }
        if let Some(position) = &self.location.fixed_position {
            if !position.is_valid() {
                return Err(ConfigError::ValidationError(format!(
                    "location.fixed_position out of range: {}",
                    position
                )));
            }
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn validate_url(raw: &str, schemes: &[&str], field: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(raw)
        .map_err(|e| ConfigError::ValidationError(format!("{} is not a valid URL: {}", field, e)))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::ValidationError(format!(
            "{} must use one of {:?} (got {})",
            field,
            schemes,
            parsed.scheme()
        )));
    }
    Ok(())
}
