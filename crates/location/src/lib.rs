//! Own-location reporting for the TacSync field client.
//!
//! - [`LocationTracker`]: automatic GPS sampling vs. manual override
//! - [`ReadyStatusPublisher`]: readiness toggle with the current position
//! - [`PositionProvider`] / [`PresenceSink`]: seams to the device and the stream

pub mod error;
pub mod presence;
pub mod provider;
pub mod ready;
pub mod tracker;

pub use error::{LocationError, Result};
pub use presence::{OperatorProfile, PresenceSink, PublishOutcome};
pub use provider::{NoPositionProvider, PositionProvider, PositionSample, StaticPositionProvider};
pub use ready::{ReadyStatusPublisher, ReadyToggle};
pub use tracker::{LocationTracker, OwnLocation, TrackingMode};
