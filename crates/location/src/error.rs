//! Location errors

use thiserror::Error;

use tacsync_core::Coordinate;
use tacsync_stream::SendError;

#[derive(Error, Debug)]
pub enum LocationError {
    #[error("Location permission not granted")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("Coordinate out of range: {0}")]
    InvalidCoordinate(Coordinate),

    #[error("Failed to publish presence: {0}")]
    Publish(#[from] SendError),
}

pub type Result<T> = std::result::Result<T, LocationError>;
