//! Operator-chosen reference point.

use serde::{Deserialize, Serialize};

use tacsync_core::Coordinate;

use crate::model::Change;

/// Reference point payload: either a bare `{lat, lng}` or `{coordinates: {lat, lng}}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ReferencePointPayload {
    Bare(Coordinate),
    Wrapped { coordinates: Coordinate },
}

impl ReferencePointPayload {
    pub fn coordinate(self) -> Coordinate {
        match self {
            ReferencePointPayload::Bare(c) => c,
            ReferencePointPayload::Wrapped { coordinates } => coordinates,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferencePointEvent {
    Created(Coordinate),
    Updated(Coordinate),
    Deleted,
}

pub fn reduce(current: Option<Coordinate>, event: &ReferencePointEvent) -> (Option<Coordinate>, Change) {
    match event {
        ReferencePointEvent::Created(point) | ReferencePointEvent::Updated(point) => {
            let change = match current {
                None => Change::Inserted,
                Some(existing) if existing == *point => Change::Unchanged,
                Some(_) => Change::Updated,
            };
            (Some(*point), change)
        }
        ReferencePointEvent::Deleted => {
            let change = if current.is_some() {
                Change::Removed
            } else {
                Change::Unchanged
            };
            (None, change)
        }
    }
}

/// Distance in metres and initial bearing in degrees from `reference` to `target`.
pub fn relative(reference: &Coordinate, target: &Coordinate) -> (f64, f64) {
    (reference.distance_to(target), reference.bearing_to(target))
}
