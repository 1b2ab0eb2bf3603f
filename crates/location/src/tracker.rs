//! Own-location state machine.
//!
//! Three modes: `Stopped`, `AutoTracking` (periodic samples from the position
//! provider) and `ManualOverride` (operator-placed position, sampler
//! suspended). Every mode change bumps an epoch. A sample is applied and
//! published only if, at the moment of applying it and under the same lock
//! that mode changes take, the epoch it was started under is still current
//! and the tracker is still `AutoTracking`. A `stop()` that lands between
//! "timer fired" and "sample applied" therefore suppresses the sample.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tacsync_core::Coordinate;

use crate::error::{LocationError, Result};
use crate::presence::{OperatorProfile, PresenceSink, PublishOutcome};
use crate::provider::{PositionProvider, PositionSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TrackingMode {
    #[default]
    Stopped,
    AutoTracking,
    ManualOverride,
}

/// The device's own position as last recorded.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OwnLocation {
    pub coordinate: Option<Coordinate>,
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub timestamp_ms: Option<u64>,
    pub tracking_mode: TrackingMode,
    pub last_error: Option<String>,
}

impl OwnLocation {
    fn record(&mut self, sample: &PositionSample) {
        self.coordinate = Some(sample.coordinate);
        self.accuracy = sample.accuracy;
        self.altitude = sample.altitude;
        self.speed = sample.speed;
        self.heading = sample.heading;
        self.timestamp_ms = Some(sample.timestamp_ms);
        self.last_error = None;
    }
}

struct TrackerState {
    mode: TrackingMode,
    epoch: u64,
    sampler: Option<JoinHandle<()>>,
}

struct Inner {
    provider: Arc<dyn PositionProvider>,
    sink: Arc<dyn PresenceSink>,
    profile: OperatorProfile,
    interval: Duration,
    permission_granted: AtomicBool,
    state: Mutex<TrackerState>,
    location: watch::Sender<OwnLocation>,
}

/// Cloneable handle to the location tracker.
#[derive(Clone)]
pub struct LocationTracker {
    inner: Arc<Inner>,
}

impl LocationTracker {
    pub fn new(
        provider: Arc<dyn PositionProvider>,
        sink: Arc<dyn PresenceSink>,
        profile: OperatorProfile,
        interval: Duration,
    ) -> Self {
        let (location, _) = watch::channel(OwnLocation::default());
        Self {
            inner: Arc::new(Inner {
                provider,
                sink,
                profile,
                interval,
                permission_granted: AtomicBool::new(false),
                state: Mutex::new(TrackerState {
                    mode: TrackingMode::Stopped,
                    epoch: 0,
                    sampler: None,
                }),
                location,
            }),
        }
    }

    /// Enter `AutoTracking`: sample once now, then every interval.
    ///
    /// Returns `false` and records `last_error` when permission is refused or
    /// the first sample fails; the mode is left as it was.
    pub async fn start(&self) -> bool {
        let epoch = {
            let state = self.inner.lock();
            if state.mode == TrackingMode::AutoTracking {
                debug!("Location tracking already running");
                return true;
            }
            state.epoch
        };

        if !self.inner.ensure_permission().await {
            warn!("Location permission not granted");
            self.inner.set_error(LocationError::PermissionDenied.to_string());
            return false;
        }

        let sample = match self.inner.provider.current_position().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Initial position sample failed");
                self.inner.set_error(e.to_string());
                return false;
            }
        };

        let mut state = self.inner.lock();
        if state.epoch != epoch {
            // stop(), a manual placement or a concurrent start() got in first
            debug!("Tracker changed while sampling, start abandoned");
            return state.mode == TrackingMode::AutoTracking;
        }
        state.epoch += 1;
        state.mode = TrackingMode::AutoTracking;
        let epoch = state.epoch;
        self.inner.location.send_modify(|loc| {
            loc.record(&sample);
            loc.tracking_mode = TrackingMode::AutoTracking;
        });
        self.inner.publish(sample.coordinate);
        state.sampler = Some(self.spawn_sampler(epoch));
        info!(interval_ms = self.inner.interval.as_millis() as u64, "Location tracking started");
        true
    }

    /// Leave `AutoTracking`/`ManualOverride`. Keeps the last position. Idempotent.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        if state.mode == TrackingMode::Stopped {
            debug!("Location tracking already stopped");
            return;
        }
        self.inner.transition(&mut state, TrackingMode::Stopped);
        info!("Location tracking stopped");
    }

    /// Switch to `ManualOverride` and apply `coordinate` immediately.
    pub fn place_manually(&self, coordinate: Coordinate) -> Result<PublishOutcome> {
        if !coordinate.is_valid() {
            return Err(LocationError::InvalidCoordinate(coordinate));
        }
        let mut state = self.inner.lock();
        if state.mode != TrackingMode::ManualOverride {
            self.inner.transition(&mut state, TrackingMode::ManualOverride);
            info!("Switched to manual location");
        }
        self.inner.location.send_modify(|loc| {
            loc.record(&PositionSample::at(coordinate));
        });
        Ok(self.inner.publish(coordinate))
    }

    /// Leave `ManualOverride` and resume periodic sampling.
    pub async fn resume_automatic(&self) -> bool {
        self.start().await
    }

    /// One position read outside the sampling loop. Does not touch `OwnLocation`.
    pub async fn sample_once(&self) -> Result<PositionSample> {
        if !self.inner.ensure_permission().await {
            return Err(LocationError::PermissionDenied);
        }
        self.inner.provider.current_position().await
    }

    /// Record a one-off fix without changing mode.
    pub(crate) fn adopt(&self, sample: &PositionSample) {
        let _state = self.inner.lock();
        self.inner.location.send_modify(|loc| loc.record(sample));
    }

    pub fn mode(&self) -> TrackingMode {
        self.inner.lock().mode
    }

    pub fn own_location(&self) -> OwnLocation {
        self.inner.location.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OwnLocation> {
        self.inner.location.subscribe()
    }

    pub fn profile(&self) -> &OperatorProfile {
        &self.inner.profile
    }

    pub(crate) fn sink(&self) -> &Arc<dyn PresenceSink> {
        &self.inner.sink
    }

    // The sampler only holds a weak reference, so dropping every handle
    // ends it even without stop().
    fn spawn_sampler(&self, epoch: u64) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let interval = self.inner.interval;
        let first_tick = Instant::now() + interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.is_current(epoch) {
                    break;
                }
                match inner.provider.current_position().await {
                    Ok(sample) => {
                        if !inner.apply_sample(epoch, &sample) {
                            break;
                        }
                    }
                    Err(e) => inner.record_sample_error(epoch, &e),
                }
            }
            debug!(epoch, "Location sampler finished");
        })
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn ensure_permission(&self) -> bool {
        if self.permission_granted.load(Ordering::Acquire) {
            return true;
        }
        match self.provider.request_permission().await {
            Ok(true) => {
                self.permission_granted.store(true, Ordering::Release);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(error = %e, "Permission request failed");
                false
            }
        }
    }

    fn transition(&self, state: &mut TrackerState, mode: TrackingMode) {
        state.epoch += 1;
        state.mode = mode;
        if let Some(sampler) = state.sampler.take() {
            sampler.abort();
        }
        self.location.send_modify(|loc| loc.tracking_mode = mode);
    }

    fn is_current(&self, epoch: u64) -> bool {
        let state = self.lock();
        state.epoch == epoch && state.mode == TrackingMode::AutoTracking
    }

    /// Apply a periodic sample if its epoch is still current. Returns false when stale.
    fn apply_sample(&self, epoch: u64, sample: &PositionSample) -> bool {
        let state = self.lock();
        if state.epoch != epoch || state.mode != TrackingMode::AutoTracking {
            debug!(epoch, "Discarding stale position sample");
            return false;
        }
        self.location.send_modify(|loc| loc.record(sample));
        self.publish(sample.coordinate);
        true
    }

    fn record_sample_error(&self, epoch: u64, error: &LocationError) {
        let state = self.lock();
        if state.epoch == epoch {
            warn!(error = %error, "Position sample failed");
            self.set_error(error.to_string());
        }
    }

    fn set_error(&self, message: String) {
        self.location.send_modify(|loc| loc.last_error = Some(message));
    }

    fn publish(&self, coordinate: Coordinate) -> PublishOutcome {
        if !self.sink.is_open() {
            debug!("Connection not open, position kept locally");
            return PublishOutcome::Dropped;
        }
        let presence = self.profile.presence(coordinate);
        match self.sink.send_presence(&presence) {
            Ok(()) => PublishOutcome::Sent,
            Err(e) => {
                warn!(error = %e, "Failed to publish position");
                self.set_error(e.to_string());
                PublishOutcome::Dropped
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(sampler) = state.sampler.take() {
            sampler.abort();
        }
    }
}

impl std::fmt::Debug for LocationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationTracker")
            .field("mode", &self.mode())
            .field("interval", &self.inner.interval)
            .finish()
    }
}
