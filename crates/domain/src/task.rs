//! Tasks and the task reducer.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use tacsync_core::Coordinate;

use crate::model::Change;
use crate::wire;

/// Task lifecycle status.
///
/// `Pending` moves to `Accepted` or `Rejected`; `Accepted` moves to
/// `Completed`. `Rejected` and `Completed` are terminal.
///
/// Inbound events may skip or reorder steps, so the reducer only checks
/// that a status never moves backwards (see [`TaskStatus::supersedes`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "accepted")]
    Accepted,
    #[serde(alias = "rejected")]
    Rejected,
    #[serde(alias = "completed")]
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Accepted,
        TaskStatus::Rejected,
        TaskStatus::Completed,
    ];

    /// Whether the operator may move a task in this status to `next`.
    ///
    /// Re-delivery of the current status is always allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Accepted) | (Pending, Rejected) | (Accepted, Completed)
            )
    }

    /// Whether `self` lies strictly further along the lifecycle than `other`.
    ///
    /// The two terminal statuses never supersede each other.
    pub fn supersedes(self, other: TaskStatus) -> bool {
        self.rank() > other.rank()
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Accepted => 1,
            TaskStatus::Rejected | TaskStatus::Completed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Rejected | TaskStatus::Completed)
    }

    /// Pending and accepted tasks keep their aircraft on the map.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Accepted)
    }

    /// Marker colour that overrides the target's own colour.
    pub fn color(self) -> &'static str {
        match self {
            TaskStatus::Pending => "#FFA726",
            TaskStatus::Accepted => "#42A5F5",
            TaskStatus::Completed => "#66BB6A",
            TaskStatus::Rejected => "#EF5350",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Accepted => "ACCEPTED",
            TaskStatus::Rejected => "REJECTED",
            TaskStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a task points at, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TaskTarget {
    #[serde(rename = "TO_POINT")]
    ToPoint { coordinates: Coordinate },
    #[serde(rename = "TO_AIRCRAFT", rename_all = "camelCase")]
    ToAircraft {
        #[serde(deserialize_with = "crate::wire::id")]
        aircraft_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    #[serde(flatten)]
    pub target: TaskTarget,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(
        default,
        deserialize_with = "wire::optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Task {
    /// Referenced aircraft for to-aircraft tasks.
    pub fn aircraft_id(&self) -> Option<&str> {
        match &self.target {
            TaskTarget::ToAircraft { aircraft_id } => Some(aircraft_id),
            TaskTarget::ToPoint { .. } => None,
        }
    }

    pub fn point(&self) -> Option<Coordinate> {
        match &self.target {
            TaskTarget::ToPoint { coordinates } => Some(*coordinates),
            TaskTarget::ToAircraft { .. } => None,
        }
    }
}

/// Payload of a status event: always an id, sometimes the full task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusChange {
    pub id: String,
    /// Present when the producer sent the whole record.
    pub task: Option<Task>,
}

impl<'de> Deserialize<'de> for TaskStatusChange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        let id = wire::id_field(&raw, "id")
            .or_else(|| wire::id_field(&raw, "taskId"))
            .ok_or_else(|| serde::de::Error::missing_field("id"))?;
        let task = Task::deserialize(raw).ok();
        Ok(Self { id, task })
    }
}

/// Payload of `removed`/`deleted`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    #[serde(
        default,
        deserialize_with = "wire::optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub aircraft_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Created(Task),
    Edited(Task),
    Impacted(Task),
    Accepted(TaskStatusChange),
    Rejected(TaskStatusChange),
    Completed(TaskStatusChange),
    Removed(TaskRef),
    Deleted(TaskRef),
}

impl TaskEvent {
    fn target_status(&self) -> Option<(TaskStatus, &TaskStatusChange)> {
        match self {
            TaskEvent::Accepted(change) => Some((TaskStatus::Accepted, change)),
            TaskEvent::Rejected(change) => Some((TaskStatus::Rejected, change)),
            TaskEvent::Completed(change) => Some((TaskStatus::Completed, change)),
            _ => None,
        }
    }
}

/// Fold one task event into the collection.
pub fn reduce(mut tasks: Vec<Task>, event: &TaskEvent) -> (Vec<Task>, Change) {
    let change = match event {
        TaskEvent::Created(task) => match position(&tasks, &task.id) {
            Some(index) => replace(&mut tasks, index, task),
            None => {
                tasks.insert(0, task.clone());
                Change::Inserted
            }
        },
        TaskEvent::Edited(task) | TaskEvent::Impacted(task) => match position(&tasks, &task.id) {
            Some(index) => replace(&mut tasks, index, task),
            None => {
                debug!(task_id = %task.id, "Edit for unknown task treated as creation");
                tasks.insert(0, task.clone());
                Change::Inserted
            }
        },
        TaskEvent::Removed(target) | TaskEvent::Deleted(target) => {
            let before = tasks.len();
            tasks.retain(|t| t.id != target.id);
            if tasks.len() < before {
                Change::Removed
            } else {
                Change::Unchanged
            }
        }
        TaskEvent::Accepted(_) | TaskEvent::Rejected(_) | TaskEvent::Completed(_) => {
            match event.target_status() {
                Some((status, change)) => set_status(&mut tasks, status, change),
                None => Change::Unchanged,
            }
        }
    };
    (tasks, change)
}

/// Aircraft that must leave the map together with the task `event` removes.
///
/// Evaluated against the collection before the event is applied.
pub fn cascade_target(tasks: &[Task], event: &TaskEvent) -> Option<String> {
    let target = match event {
        TaskEvent::Removed(target) | TaskEvent::Deleted(target) => target,
        _ => return None,
    };
    tasks
        .iter()
        .find(|t| t.id == target.id)
        .and_then(|t| t.aircraft_id().map(str::to_string))
        .or_else(|| target.aircraft_id.clone())
}

/// Move a task forward to `status`; stale or backward statuses are ignored.
pub fn apply_status(tasks: &mut [Task], id: &str, status: TaskStatus) -> Change {
    let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
        return Change::Unchanged;
    };
    if task.status == status {
        return Change::Unchanged;
    }
    if !status.supersedes(task.status) {
        warn!(
            task_id = %id,
            from = %task.status,
            to = %status,
            "Ignoring stale task status"
        );
        return Change::Unchanged;
    }
    task.status = status;
    Change::Updated
}

fn set_status(tasks: &mut Vec<Task>, status: TaskStatus, change: &TaskStatusChange) -> Change {
    if position(tasks, &change.id).is_some() {
        return apply_status(tasks, &change.id, status);
    }
    match &change.task {
        Some(task) => {
            debug!(task_id = %change.id, %status, "Status for unknown task treated as creation");
            let mut task = task.clone();
            task.status = status;
            tasks.insert(0, task);
            Change::Inserted
        }
        None => {
            debug!(task_id = %change.id, %status, "Status for unknown task dropped");
            Change::Unchanged
        }
    }
}

fn position(tasks: &[Task], id: &str) -> Option<usize> {
    tasks.iter().position(|t| t.id == id)
}

// Whole-record replacement that never rolls the status back.
fn replace(tasks: &mut [Task], index: usize, task: &Task) -> Change {
    let mut incoming = task.clone();
    let stored = tasks[index].status;
    if stored.supersedes(incoming.status) {
        debug!(task_id = %task.id, %stored, stale = %incoming.status, "Keeping newer task status");
        incoming.status = stored;
    }
    if tasks[index] == incoming {
        Change::Unchanged
    } else {
        tasks[index] = incoming;
        Change::Updated
    }
}
