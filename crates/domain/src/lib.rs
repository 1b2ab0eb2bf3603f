//! Domain model for the TacSync field client.
//!
//! This crate contains the reconciled session state with no I/O:
//! - Tracked aircraft, tasks, peer operators, reference point and equipment
//! - Pure reducers folding inbound deltas into each collection
//! - The shared model handle observed by the UI layer

pub mod aircraft;
pub mod equipment;
pub mod error;
pub mod model;
pub mod operator;
pub mod reference;
pub mod snapshot;
pub mod task;
mod wire;

pub use aircraft::{AircraftEvent, AircraftRef, AircraftTrack, AircraftUpdate, Classification};
pub use equipment::{Equipment, EquipmentLayer, Sector};
pub use error::{DomainError, Result};
pub use model::{Change, ModelEvent, SharedModel, SyncModel};
pub use operator::{OperatorEvent, OperatorUpdate, PeerOperator};
pub use reference::{ReferencePointEvent, ReferencePointPayload};
pub use snapshot::Snapshot;
pub use task::{Task, TaskEvent, TaskRef, TaskStatus, TaskStatusChange, TaskTarget};
