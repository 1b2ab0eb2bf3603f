//! Core functionality for the TacSync field client.
//!
//! This crate provides the configuration, logging bootstrap, error type and
//! geodesy helpers shared by every other TacSync crate.

pub mod config;
pub mod error;
pub mod geo;
pub mod logging;

pub use config::{
    AircraftConfig, AircraftVisibility, ConfigError, LocationConfig, LogFormat, LoggingConfig,
    OperatorConfig, ReconnectConfig, ServerConfig, SyncConfig,
};
pub use error::{CoreError, Result};
pub use geo::{Coordinate, EARTH_RADIUS_M};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
