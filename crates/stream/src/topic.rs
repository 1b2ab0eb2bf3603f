//! Closed topic set and the `{topic, payload}` frame codec.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use tacsync_core::Coordinate;
use tacsync_domain::{
    AircraftEvent, ModelEvent, OperatorEvent, ReferencePointEvent, ReferencePointPayload, TaskEvent,
};

use crate::error::{DecodeError, SendError};

/// Every topic the coordination server publishes, plus the presence topic
/// this client publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// Live aircraft update
    AircraftUpdated,
    /// Aircraft removed by the producer
    AircraftDeleted,
    /// Aircraft no longer observed
    AircraftLost,
    /// Extrapolated aircraft position
    AircraftExtrapolation,
    /// Extrapolated aircraft removed
    AircraftExtrapolationDelete,
    /// Task created
    TaskCreated,
    /// Task edited
    TaskEdited,
    /// Task target impacted
    TaskImpacted,
    /// Task accepted by its assignee
    TaskAccepted,
    /// Task rejected by its assignee
    TaskRejected,
    /// Task completed
    TaskCompleted,
    /// Task removed
    TaskRemoved,
    /// Task deleted
    TaskDeleted,
    /// Operator joined
    OperatorEntered,
    /// Operator presence update (also the outbound presence topic)
    OperatorUpdated,
    /// Operator connection dropped
    OperatorDisconnected,
    /// Operator left for good
    OperatorQuit,
    /// Reference point set
    ReferencePointCreated,
    /// Reference point moved
    ReferencePointUpdated,
    /// Reference point cleared
    ReferencePointDeleted,
}

impl Topic {
    /// All topics in wire order.
    pub const ALL: [Topic; 20] = [
        Topic::AircraftUpdated,
        Topic::AircraftDeleted,
        Topic::AircraftLost,
        Topic::AircraftExtrapolation,
        Topic::AircraftExtrapolationDelete,
        Topic::TaskCreated,
        Topic::TaskEdited,
        Topic::TaskImpacted,
        Topic::TaskAccepted,
        Topic::TaskRejected,
        Topic::TaskCompleted,
        Topic::TaskRemoved,
        Topic::TaskDeleted,
        Topic::OperatorEntered,
        Topic::OperatorUpdated,
        Topic::OperatorDisconnected,
        Topic::OperatorQuit,
        Topic::ReferencePointCreated,
        Topic::ReferencePointUpdated,
        Topic::ReferencePointDeleted,
    ];

    /// Wire name of the topic.
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::AircraftUpdated => "aircraft.updated",
            Topic::AircraftDeleted => "aircraft.deleted",
            Topic::AircraftLost => "aircraft.lost",
            Topic::AircraftExtrapolation => "aircraft.extrapolation",
            Topic::AircraftExtrapolationDelete => "aircraft.extrapolation-delete",
            Topic::TaskCreated => "task.created",
            Topic::TaskEdited => "task.edited",
            Topic::TaskImpacted => "task.impacted",
            Topic::TaskAccepted => "task.accepted",
            Topic::TaskRejected => "task.rejected",
            Topic::TaskCompleted => "task.completed",
            Topic::TaskRemoved => "task.removed",
            Topic::TaskDeleted => "task.deleted",
            Topic::OperatorEntered => "mog.entered",
            Topic::OperatorUpdated => "mog.updated",
            Topic::OperatorDisconnected => "mog.disconnected",
            Topic::OperatorQuit => "mog.quit",
            Topic::ReferencePointCreated => "refpoint.created",
            Topic::ReferencePointUpdated => "refpoint.updated",
            Topic::ReferencePointDeleted => "refpoint.deleted",
        }
    }

    /// Decode `payload` into the event this topic carries.
    pub fn decode_payload(self, payload: Value) -> Result<ModelEvent, serde_json::Error> {
        use serde_json::from_value;
        Ok(match self {
            Topic::AircraftUpdated => ModelEvent::Aircraft(AircraftEvent::Updated(from_value(payload)?)),
            Topic::AircraftDeleted => ModelEvent::Aircraft(AircraftEvent::Deleted(from_value(payload)?)),
            Topic::AircraftLost => ModelEvent::Aircraft(AircraftEvent::Lost(from_value(payload)?)),
            Topic::AircraftExtrapolation => {
                ModelEvent::Aircraft(AircraftEvent::Extrapolated(from_value(payload)?))
            }
            Topic::AircraftExtrapolationDelete => {
                ModelEvent::Aircraft(AircraftEvent::ExtrapolationDeleted(from_value(payload)?))
            }
            Topic::TaskCreated => ModelEvent::Task(TaskEvent::Created(from_value(payload)?)),
            Topic::TaskEdited => ModelEvent::Task(TaskEvent::Edited(from_value(payload)?)),
            Topic::TaskImpacted => ModelEvent::Task(TaskEvent::Impacted(from_value(payload)?)),
            Topic::TaskAccepted => ModelEvent::Task(TaskEvent::Accepted(from_value(payload)?)),
            Topic::TaskRejected => ModelEvent::Task(TaskEvent::Rejected(from_value(payload)?)),
            Topic::TaskCompleted => ModelEvent::Task(TaskEvent::Completed(from_value(payload)?)),
            Topic::TaskRemoved => ModelEvent::Task(TaskEvent::Removed(from_value(payload)?)),
            Topic::TaskDeleted => ModelEvent::Task(TaskEvent::Deleted(from_value(payload)?)),
            Topic::OperatorEntered => ModelEvent::Operator(OperatorEvent::Entered(from_value(payload)?)),
            Topic::OperatorUpdated => ModelEvent::Operator(OperatorEvent::Updated(from_value(payload)?)),
            Topic::OperatorDisconnected => {
                ModelEvent::Operator(OperatorEvent::Disconnected(from_value(payload)?))
            }
            Topic::OperatorQuit => ModelEvent::Operator(OperatorEvent::Quit(from_value(payload)?)),
            Topic::ReferencePointCreated => ModelEvent::ReferencePoint(ReferencePointEvent::Created(
                from_value::<ReferencePointPayload>(payload)?.coordinate(),
            )),
            Topic::ReferencePointUpdated => ModelEvent::ReferencePoint(ReferencePointEvent::Updated(
                from_value::<ReferencePointPayload>(payload)?.coordinate(),
            )),
            Topic::ReferencePointDeleted => ModelEvent::ReferencePoint(ReferencePointEvent::Deleted),
        })
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownTopic(s.to_string()))
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Raw frame before the topic is resolved.
#[derive(Debug, Deserialize)]
struct RawFrame {
    topic: String,
    #[serde(default)]
    payload: Value,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Topic the frame arrived on
    pub topic: Topic,
    /// Typed payload
    pub event: ModelEvent,
}

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<InboundFrame, DecodeError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let topic: Topic = raw.topic.parse()?;
    let event = topic
        .decode_payload(raw.payload)
        .map_err(|source| DecodeError::InvalidPayload { topic, source })?;
    Ok(InboundFrame { topic, event })
}

#[derive(Serialize)]
struct OutboundFrame<'a, T: Serialize> {
    topic: Topic,
    payload: &'a T,
}

/// Encode an outbound `{topic, payload}` frame.
pub fn encode_frame<T: Serialize>(topic: Topic, payload: &T) -> Result<String, SendError> {
    Ok(serde_json::to_string(&OutboundFrame { topic, payload })?)
}

/// Operator presence published on [`Topic::OperatorUpdated`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    /// Operator account name
    pub username: String,
    /// Radio call sign
    pub call_sign: String,
    /// Readiness flag
    pub ready: bool,
    /// Current own position
    pub coordinates: Coordinate,
}

impl PresencePayload {
    /// Encode as a complete outbound frame.
    pub fn to_frame(&self) -> Result<String, SendError> {
        encode_frame(Topic::OperatorUpdated, self)
    }
}
