//! Readiness toggle publisher.

use tracing::{info, warn};

use tacsync_stream::SendError;

use crate::error::Result;
use crate::presence::PublishOutcome;
use crate::tracker::LocationTracker;

/// Result of [`ReadyStatusPublisher::toggle_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyToggle {
    /// Readiness after the toggle
    pub ready: bool,
    pub outcome: PublishOutcome,
}

/// Flips the operator's readiness and announces it with the current position.
#[derive(Debug, Clone)]
pub struct ReadyStatusPublisher {
    tracker: LocationTracker,
}

impl ReadyStatusPublisher {
    pub fn new(tracker: LocationTracker) -> Self {
        Self { tracker }
    }

    /// Flip readiness and publish it.
    ///
    /// Uses the recorded own location so a manually placed position is kept;
    /// only when nothing is recorded yet is the provider read once. With the
    /// connection down the flag still flips and nothing is sent.
    pub async fn toggle_ready(&self) -> Result<ReadyToggle> {
        let profile = self.tracker.profile();
        let ready = profile.toggle_ready();
        info!(ready, "Readiness toggled");

        let sink = self.tracker.sink();
        if !sink.is_open() {
            warn!("Connection not open, readiness not sent");
            return Ok(ReadyToggle {
                ready,
                outcome: PublishOutcome::Dropped,
            });
        }

        let coordinate = match self.tracker.own_location().coordinate {
            Some(coordinate) => coordinate,
            None => {
                warn!("No recorded position, reading provider once");
                let sample = self.tracker.sample_once().await?;
                self.tracker.adopt(&sample);
                sample.coordinate
            }
        };

        // the connection may have closed during the provider read
        let outcome = match sink.send_presence(&profile.presence(coordinate)) {
            Ok(()) => PublishOutcome::Sent,
            Err(SendError::NotConnected) => {
                warn!("Connection closed, readiness not sent");
                PublishOutcome::Dropped
            }
            Err(e) => return Err(e.into()),
        };
        Ok(ReadyToggle { ready, outcome })
    }
}
