//! Full-state snapshot as returned by the global-state endpoint.

use serde::{Deserialize, Serialize};

use crate::aircraft::AircraftUpdate;
use crate::equipment::Equipment;
use crate::operator::PeerOperator;
use crate::reference::ReferencePointPayload;
use crate::task::Task;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Snapshot {
    #[serde(default)]
    pub mogs: Vec<PeerOperator>,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
    #[serde(default)]
    pub aircrafts: Vec<AircraftUpdate>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub refpoint: Option<ReferencePointPayload>,
}
