//! The reconciled in-memory model and its shared, observable handle.
//!
//! [`SyncModel`] is a plain value: reducers fold events into it and selectors
//! read from it. [`SharedModel`] wraps it behind a lock so a task removal and
//! the aircraft removal it implies land in a single write, and bumps a
//! revision counter on every effective change so observers can re-render.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use tokio::sync::watch;
use tracing::{debug, trace};

use tacsync_core::{config::AircraftVisibility, now_ms, Coordinate};

use crate::aircraft::{self, AircraftEvent, AircraftTrack};
use crate::equipment::{Equipment, EquipmentLayer};
use crate::error::{DomainError, Result};
use crate::operator::{self, OperatorEvent, PeerOperator};
use crate::reference::{self, ReferencePointEvent};
use crate::snapshot::Snapshot;
use crate::task::{self, Task, TaskEvent, TaskStatus};

/// Effect of applying one event to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Inserted,
    Updated,
    Removed,
    Unchanged,
}

impl Change {
    pub fn is_effective(self) -> bool {
        self != Change::Unchanged
    }
}

/// Any inbound delta, grouped by the collection it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    Aircraft(AircraftEvent),
    Task(TaskEvent),
    Operator(OperatorEvent),
    ReferencePoint(ReferencePointEvent),
}

/// Memory-only reconciled state of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncModel {
    pub aircraft: Vec<AircraftTrack>,
    pub tasks: Vec<Task>,
    /// Wall-clock ms of the last task collection change.
    pub tasks_updated_ms: Option<u64>,
    /// Most recent task mutation or refresh failure.
    pub task_error: Option<String>,
    pub operators: Vec<PeerOperator>,
    pub reference_point: Option<Coordinate>,
    pub equipment: EquipmentLayer,
}

impl SyncModel {
    /// Build a model from a snapshot, replacing anything held before.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut model = Self::default();
        model.load_snapshot(snapshot);
        model
    }

    pub fn load_snapshot(&mut self, snapshot: Snapshot) {
        // Folded through the reducer so duplicate ids in the snapshot merge.
        let mut tracks = Vec::with_capacity(snapshot.aircrafts.len());
        for update in snapshot.aircrafts {
            let (next, _) = aircraft::reduce(tracks, &AircraftEvent::Updated(update));
            tracks = next;
        }
        self.aircraft = tracks;
        self.tasks = snapshot.tasks;
        self.tasks_updated_ms = Some(now_ms());
        self.task_error = None;
        self.operators = snapshot.mogs;
        self.reference_point = snapshot.refpoint.map(|p| p.coordinate());
        self.equipment.set(snapshot.equipment);
    }

    /// Apply one event. Task removals also remove the referenced aircraft.
    pub fn apply(&mut self, event: &ModelEvent) -> Change {
        match event {
            ModelEvent::Aircraft(event) => {
                let (tracks, change) = aircraft::reduce(std::mem::take(&mut self.aircraft), event);
                self.aircraft = tracks;
                change
            }
            ModelEvent::Task(event) => {
                let cascade = task::cascade_target(&self.tasks, event);
                let (tasks, change) = task::reduce(std::mem::take(&mut self.tasks), event);
                self.tasks = tasks;
                if change.is_effective() {
                    self.tasks_updated_ms = Some(now_ms());
                }
                match cascade {
                    Some(aircraft_id) => {
                        let removed = aircraft::remove(&mut self.aircraft, &aircraft_id);
                        if removed.is_effective() {
                            debug!(aircraft_id = %aircraft_id, "Removed aircraft with its task");
                            return Change::Removed;
                        }
                        change
                    }
                    None => change,
                }
            }
            ModelEvent::Operator(event) => {
                let (operators, change) = operator::reduce(std::mem::take(&mut self.operators), event);
                self.operators = operators;
                change
            }
            ModelEvent::ReferencePoint(event) => {
                let (point, change) = reference::reduce(self.reference_point, event);
                self.reference_point = point;
                change
            }
        }
    }

    pub fn aircraft(&self, aircraft_id: &str) -> Option<&AircraftTrack> {
        self.aircraft.iter().find(|a| a.aircraft_id == aircraft_id)
    }

    pub fn operator(&self, username: &str) -> Option<&PeerOperator> {
        self.operators.iter().find(|o| o.username == username)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    pub fn point_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.point().is_some()).collect()
    }

    pub fn aircraft_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.aircraft_id().is_some()).collect()
    }

    pub fn status_counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts: HashMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for task in &self.tasks {
            *counts.entry(task.status).or_default() += 1;
        }
        counts
    }

    /// Aircraft the map may show under `visibility`.
    pub fn visible_aircraft(&self, visibility: AircraftVisibility) -> Vec<&AircraftTrack> {
        match visibility {
            AircraftVisibility::All => self.aircraft.iter().collect(),
            AircraftVisibility::TaskedOnly => self
                .aircraft
                .iter()
                .filter(|a| {
                    self.tasks
                        .iter()
                        .any(|t| t.status.is_active() && t.aircraft_id() == Some(a.aircraft_id.as_str()))
                })
                .collect(),
        }
    }

    /// Marker colour: the first to-aircraft task's status colour, else the classification colour.
    pub fn aircraft_color(&self, track: &AircraftTrack) -> &'static str {
        self.tasks
            .iter()
            .find(|t| t.aircraft_id() == Some(track.aircraft_id.as_str()))
            .map(|t| t.status.color())
            .unwrap_or_else(|| track.classification.color())
    }

    /// Distance (m) and bearing (deg) from the reference point, when one is set.
    pub fn relative_to_reference(&self, target: &Coordinate) -> Option<(f64, f64)> {
        self.reference_point
            .as_ref()
            .map(|reference| reference::relative(reference, target))
    }
}

/// Cloneable handle to the session's model.
#[derive(Clone)]
pub struct SharedModel {
    inner: Arc<RwLock<SyncModel>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SharedModel {
    fn default() -> Self {
        Self::new(SyncModel::default())
    }
}

impl SharedModel {
    pub fn new(model: SyncModel) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(model)),
            revision: Arc::new(revision),
        }
    }

    /// Receiver of the revision counter; changes after every effective update.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Apply an event under one write lock.
    pub fn apply(&self, event: &ModelEvent) -> Result<Change> {
        let change = self.write()?.apply(event);
        if change.is_effective() {
            self.bump();
        } else {
            trace!(?event, "Event left model unchanged");
        }
        Ok(change)
    }

    /// Run `f` against a consistent view of the model.
    pub fn read<R>(&self, f: impl FnOnce(&SyncModel) -> R) -> Result<R> {
        let guard = self.inner.read().map_err(|_| DomainError::LockPoisoned)?;
        Ok(f(&guard))
    }

    pub fn snapshot(&self) -> Result<SyncModel> {
        self.read(SyncModel::clone)
    }

    pub fn load_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.write()?.load_snapshot(snapshot);
        self.bump();
        Ok(())
    }

    /// Optimistic local status change ahead of the REST call.
    pub fn set_task_status_local(&self, id: &str, status: TaskStatus) -> Result<Change> {
        let change = {
            let mut model = self.write()?;
            let current = model
                .task(id)
                .map(|t| t.status)
                .ok_or_else(|| DomainError::InvalidPayload(format!("unknown task {}", id)))?;
            if !current.can_transition_to(status) {
                return Err(DomainError::InvalidTransition {
                    task_id: id.to_string(),
                    from: current,
                    to: status,
                });
            }
            let change = task::apply_status(&mut model.tasks, id, status);
            if change.is_effective() {
                model.tasks_updated_ms = Some(now_ms());
            }
            change
        };
        if change.is_effective() {
            self.bump();
        }
        Ok(change)
    }

    /// Local removal of a task, cascading like a `removed` event.
    pub fn remove_task_local(&self, id: &str) -> Result<Change> {
        self.apply(&ModelEvent::Task(TaskEvent::Removed(task::TaskRef {
            id: id.to_string(),
            aircraft_id: None,
        })))
    }

    /// Replace the task collection after a list refresh.
    pub fn replace_tasks(&self, tasks: Vec<Task>) -> Result<()> {
        {
            let mut model = self.write()?;
            model.tasks = tasks;
            model.tasks_updated_ms = Some(now_ms());
            model.task_error = None;
        }
        self.bump();
        Ok(())
    }

    pub fn record_task_error(&self, message: impl Into<String>) -> Result<()> {
        self.write()?.task_error = Some(message.into());
        self.bump();
        Ok(())
    }

    pub fn clear_task_error(&self) -> Result<()> {
        self.write()?.task_error = None;
        self.bump();
        Ok(())
    }

    pub fn set_equipment(&self, items: Vec<Equipment>) -> Result<()> {
        self.write()?.equipment.set(items);
        self.bump();
        Ok(())
    }

    pub fn delete_equipment(&self, ids: &[String]) -> Result<usize> {
        let removed = self.write()?.equipment.delete(ids);
        if removed > 0 {
            self.bump();
        }
        Ok(removed)
    }

    pub fn toggle_equipment_visible(&self) -> Result<bool> {
        let visible = self.write()?.equipment.toggle_visible();
        self.bump();
        Ok(visible)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, SyncModel>> {
        self.inner.write().map_err(|_| DomainError::LockPoisoned)
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl std::fmt::Debug for SharedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedModel")
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}
