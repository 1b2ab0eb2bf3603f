//! Position provider seam (device GPS or a fixed position).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tacsync_core::{now_ms, Coordinate};

use crate::error::{LocationError, Result};

/// One position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub timestamp_ms: u64,
}

impl PositionSample {
    /// Fix carrying only a coordinate, stamped now.
    pub fn at(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            accuracy: None,
            altitude: None,
            speed: None,
            heading: None,
            timestamp_ms: now_ms(),
        }
    }
}

/// Source of the device's own position.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Ask for location permission. `Ok(false)` means the operator refused.
    async fn request_permission(&self) -> Result<bool>;

    /// Read the current position once.
    async fn current_position(&self) -> Result<PositionSample>;
}

/// Provider for headless nodes: always permitted, always the same point.
#[derive(Debug, Clone, Copy)]
pub struct StaticPositionProvider {
    coordinate: Coordinate,
}

impl StaticPositionProvider {
    pub fn new(coordinate: Coordinate) -> Result<Self> {
        if !coordinate.is_valid() {
            return Err(LocationError::InvalidCoordinate(coordinate));
        }
        Ok(Self { coordinate })
    }
}

#[async_trait]
impl PositionProvider for StaticPositionProvider {
    async fn request_permission(&self) -> Result<bool> {
        Ok(true)
    }

    async fn current_position(&self) -> Result<PositionSample> {
        Ok(PositionSample::at(self.coordinate))
    }
}

/// Provider for nodes without any position source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPositionProvider;

#[async_trait]
impl PositionProvider for NoPositionProvider {
    async fn request_permission(&self) -> Result<bool> {
        Ok(false)
    }

    async fn current_position(&self) -> Result<PositionSample> {
        Err(LocationError::Unavailable("no position source configured".to_string()))
    }
}
