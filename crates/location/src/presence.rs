//! Operator profile slice and the outbound presence seam.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tacsync_core::{Coordinate, OperatorConfig};
use tacsync_stream::{ConnectionHandle, PresencePayload, SendError};

/// Where presence updates go. Implemented by the stream connection.
pub trait PresenceSink: Send + Sync {
    fn is_open(&self) -> bool;

    fn send_presence(&self, presence: &PresencePayload) -> Result<(), SendError>;
}

impl PresenceSink for ConnectionHandle {
    fn is_open(&self) -> bool {
        ConnectionHandle::is_open(self)
    }

    fn send_presence(&self, presence: &PresencePayload) -> Result<(), SendError> {
        self.send(presence.to_frame()?)
    }
}

/// Whether a presence update left the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// Connection not open; nothing was sent.
    Dropped,
}

#[derive(Debug, Clone)]
struct Profile {
    username: String,
    call_sign: String,
    ready: bool,
}

/// The operator identity and readiness flag, shared by the tracker and the
/// ready publisher.
#[derive(Debug, Clone)]
pub struct OperatorProfile {
    inner: Arc<RwLock<Profile>>,
}

impl OperatorProfile {
    pub fn new(username: impl Into<String>, call_sign: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Profile {
                username: username.into(),
                call_sign: call_sign.into(),
                ready: false,
            })),
        }
    }

    pub fn from_config(config: &OperatorConfig) -> Self {
        Self::new(config.username.clone(), config.call_sign.clone())
    }

    pub fn username(&self) -> String {
        self.read().username.clone()
    }

    pub fn call_sign(&self) -> String {
        self.read().call_sign.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.read().ready
    }

    pub fn set_ready(&self, ready: bool) {
        self.write().ready = ready;
    }

    /// Flip readiness and return the new value.
    pub fn toggle_ready(&self) -> bool {
        let mut profile = self.write();
        profile.ready = !profile.ready;
        profile.ready
    }

    pub fn set_call_sign(&self, call_sign: impl Into<String>) {
        self.write().call_sign = call_sign.into();
    }

    /// Presence payload for `coordinates` with the current identity.
    pub fn presence(&self, coordinates: Coordinate) -> PresencePayload {
        let profile = self.read();
        PresencePayload {
            username: profile.username.clone(),
            call_sign: profile.call_sign.clone(),
            ready: profile.ready,
            coordinates,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Profile> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Profile> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
