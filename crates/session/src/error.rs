//! Session errors

use thiserror::Error;

use tacsync_core::ConfigError;
use tacsync_location::LocationError;
use tacsync_rest::RestError;
use tacsync_stream::ConnectionError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("REST collaborator error: {0}")]
    Rest(#[from] RestError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Session already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, SessionError>;
