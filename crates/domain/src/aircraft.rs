//! Tracked aircraft and the aircraft reducer.
//!
//! A track keeps an append-only coordinate history per `aircraftId`. Updates
//! append their samples and shallow-merge every other field; kinematics are
//! replaced, never accumulated.
//!
//! Unreachable aircraft are handled per event kind:
//! - `lost` reclassifies the track to [`Classification::Extrapolated`] in place
//! - `deleted` and `extrapolation-delete` remove the track
//! - `extrapolation` runs through the same path as a live update

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tacsync_core::Coordinate;

use crate::model::Change;
use crate::wire;

/// Track classification as assigned by the air picture producer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Classification {
    #[serde(rename = "ENEMY", alias = "HOSTILE", alias = "hostile")]
    Hostile,
    #[serde(rename = "FRIENDLY", alias = "friendly")]
    Friendly,
    #[serde(rename = "MISLEADING", alias = "DECOY", alias = "decoy")]
    Decoy,
    #[default]
    #[serde(rename = "NEW", alias = "UNKNOWN", alias = "unknown")]
    Unknown,
    #[serde(rename = "EXTRAPOLATED", alias = "extrapolated")]
    Extrapolated,
}

impl Classification {
    /// Every classification, in palette order.
    pub const ALL: [Classification; 5] = [
        Classification::Hostile,
        Classification::Extrapolated,
        Classification::Friendly,
        Classification::Unknown,
        Classification::Decoy,
    ];

    /// Marker colour for the map layer.
    pub fn color(self) -> &'static str {
        match self {
            Classification::Hostile => "#F11D36",
            Classification::Extrapolated => "#808080",
            Classification::Friendly => "#00FF09",
            Classification::Unknown => "#FFFFFF",
            Classification::Decoy => "#800080",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Classification::Hostile => "Hostile",
            Classification::Extrapolated => "Extrapolated",
            Classification::Friendly => "Friendly",
            Classification::Unknown => "Unknown",
            Classification::Decoy => "Decoy",
        }
    }
}

/// Inbound update for one aircraft (`updated` and `extrapolation` topics).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AircraftUpdate {
    #[serde(deserialize_with = "wire::id")]
    pub aircraft_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, deserialize_with = "wire::samples")]
    pub coordinates: Vec<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Producer-specific attributes, merged key by key.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload that only identifies an aircraft (`deleted`, `lost`, `extrapolation-delete`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AircraftRef {
    #[serde(deserialize_with = "wire::id")]
    pub aircraft_id: String,
}

/// Reconciled state of one tracked aircraft.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AircraftTrack {
    pub aircraft_id: String,
    #[serde(rename = "type")]
    pub classification: Classification,
    /// Oldest first; serialized under the wire name `coordinates`.
    #[serde(rename = "coordinates")]
    pub coordinate_history: Vec<Coordinate>,
    pub course: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AircraftTrack {
    /// Seed a new track from its first update (or its snapshot entry).
    pub fn from_update(update: &AircraftUpdate) -> Self {
        let mut track = Self {
            aircraft_id: update.aircraft_id.clone(),
            classification: update.classification.unwrap_or_default(),
            coordinate_history: Vec::with_capacity(update.coordinates.len()),
            course: update.course,
            altitude: update.altitude,
            speed: update.speed,
            extra: update.extra.clone(),
        };
        track.append_samples(&update.coordinates);
        track
    }

    /// Most recent position, if any sample has been seen.
    pub fn last_position(&self) -> Option<Coordinate> {
        self.coordinate_history.last().copied()
    }

    fn merge(&mut self, update: &AircraftUpdate) {
        self.append_samples(&update.coordinates);
        if let Some(classification) = update.classification {
            self.classification = classification;
        }
        if update.course.is_some() {
            self.course = update.course;
        }
        if update.altitude.is_some() {
            self.altitude = update.altitude;
        }
        if update.speed.is_some() {
            self.speed = update.speed;
        }
        for (key, value) in &update.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Every reported sample is kept, including repeats of the last fix
    /// from a stationary target.
    fn append_samples(&mut self, samples: &[Coordinate]) {
        self.coordinate_history.extend_from_slice(samples);
    }
}

/// Aircraft-domain events, one per aircraft topic.
#[derive(Debug, Clone, PartialEq)]
pub enum AircraftEvent {
    Updated(AircraftUpdate),
    Deleted(AircraftRef),
    Lost(AircraftRef),
    Extrapolated(AircraftUpdate),
    ExtrapolationDeleted(AircraftRef),
}

/// Fold one aircraft event into the collection.
pub fn reduce(mut tracks: Vec<AircraftTrack>, event: &AircraftEvent) -> (Vec<AircraftTrack>, Change) {
    let change = match event {
        AircraftEvent::Updated(update) | AircraftEvent::Extrapolated(update) => {
            upsert(&mut tracks, update)
        }
        AircraftEvent::Deleted(target) | AircraftEvent::ExtrapolationDeleted(target) => {
            remove(&mut tracks, &target.aircraft_id)
        }
        AircraftEvent::Lost(target) => {
            match tracks.iter_mut().find(|t| t.aircraft_id == target.aircraft_id) {
                Some(track) if track.classification != Classification::Extrapolated => {
                    track.classification = Classification::Extrapolated;
                    Change::Updated
                }
                _ => Change::Unchanged,
            }
        }
    };
    (tracks, change)
}

fn upsert(tracks: &mut Vec<AircraftTrack>, update: &AircraftUpdate) -> Change {
    match tracks.iter_mut().find(|t| t.aircraft_id == update.aircraft_id) {
        Some(track) => {
            let before = track.clone();
            track.merge(update);
            if *track == before {
                Change::Unchanged
            } else {
                Change::Updated
            }
        }
        None => {
            tracks.push(AircraftTrack::from_update(update));
            Change::Inserted
        }
    }
}

/// Remove a track by id; shared with the task-removal cascade.
pub(crate) fn remove(tracks: &mut Vec<AircraftTrack>, aircraft_id: &str) -> Change {
    let before = tracks.len();
    tracks.retain(|t| t.aircraft_id != aircraft_id);
    if tracks.len() < before {
        Change::Removed
    } else {
        Change::Unchanged
    }
}
