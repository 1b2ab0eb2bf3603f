//! Error types for TacSync stream operations.
//!
//! None of these are fatal to a session: decode failures drop one frame,
//! handler failures are isolated per handler, send failures drop one message
//! and connection failures feed the reconnect loop.

use thiserror::Error;

use tacsync_domain::DomainError;

use crate::topic::Topic;

/// Errors raised while turning a text frame into an inbound event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame is not a `{topic, payload}` JSON object
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Topic outside the known set
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Payload does not match the shape expected for the topic
    #[error("Invalid payload for {topic}: {source}")]
    InvalidPayload {
        /// Topic the payload arrived on
        topic: Topic,
        /// Underlying decode failure
        source: serde_json::Error,
    },
}

/// Errors raised when a message cannot be handed to the transport.
#[derive(Debug, Error)]
pub enum SendError {
    /// Connection is not open; the message was dropped
    #[error("Connection is not open, message dropped")]
    NotConnected,

    /// Outbound payload could not be encoded
    #[error("Failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised while opening or driving the streaming connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Stream endpoint is not a valid URL
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Transport failed to open or broke
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection task is no longer running
    #[error("Connection task stopped")]
    Stopped,
}

/// Error returned by a topic handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Model update failed
    #[error("Model update failed: {0}")]
    Domain(#[from] DomainError),

    /// Handler refused the event
    #[error("Handler rejected event: {0}")]
    Rejected(String),
}

/// Errors that can occur in stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Frame decoding errors
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Outbound errors
    #[error(transparent)]
    Send(#[from] SendError),

    /// Connection errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
