//! Task mutations as two-phase operations.
//!
//! The change is applied to the shared model first, then sent to the server.
//! A failed request is not rolled back: the local state stays as applied,
//! the error is recorded in the task collection's error slot and returned.
//! The next snapshot, list refresh or task event reconciles the difference.

use std::sync::Arc;

use tracing::{info, warn};

use tacsync_domain::{SharedModel, TaskStatus};

use crate::client::TaskApi;
use crate::error::Result;

pub struct TaskCommands {
    api: Arc<dyn TaskApi>,
    model: SharedModel,
}

impl TaskCommands {
    pub fn new(api: Arc<dyn TaskApi>, model: SharedModel) -> Self {
        Self { api, model }
    }

    pub async fn set_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        self.model.set_task_status_local(id, status)?;
        match self.api.update_task_status(id, status).await {
            Ok(()) => {
                info!(task_id = %id, %status, "Task status updated");
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %id, %status, error = %e, "Task status update failed");
                self.model.record_task_error(e.to_string())?;
                Err(e)
            }
        }
    }

    pub async fn accept(&self, id: &str) -> Result<()> {
        self.set_status(id, TaskStatus::Accepted).await
    }

    pub async fn reject(&self, id: &str) -> Result<()> {
        self.set_status(id, TaskStatus::Rejected).await
    }

    pub async fn complete(&self, id: &str) -> Result<()> {
        self.set_status(id, TaskStatus::Completed).await
    }

    /// Remove locally (with the aircraft cascade), then DELETE on the server.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.model.remove_task_local(id)?;
        if let Err(e) = self.api.delete_task(id).await {
            warn!(task_id = %id, error = %e, "Task delete failed");
            self.model.record_task_error(e.to_string())?;
            return Err(e);
        }
        info!(task_id = %id, "Task deleted");
        Ok(())
    }

    /// Replace the task collection with the server's list.
    pub async fn refresh(&self) -> Result<usize> {
        match self.api.fetch_tasks().await {
            Ok(tasks) => {
                let count = tasks.len();
                self.model.replace_tasks(tasks)?;
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "Task list refresh failed");
                self.model.record_task_error(e.to_string())?;
                Err(e)
            }
        }
    }
}
