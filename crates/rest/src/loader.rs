//! Session-start snapshot load.

use std::sync::Arc;

use tracing::{error, info};

use tacsync_domain::SharedModel;

use crate::client::SnapshotSource;
use crate::error::Result;

/// Seeds the shared model from one snapshot fetch.
pub struct SnapshotLoader {
    source: Arc<dyn SnapshotSource>,
    model: SharedModel,
}

impl SnapshotLoader {
    pub fn new(source: Arc<dyn SnapshotSource>, model: SharedModel) -> Self {
        Self { source, model }
    }

    /// Fetch and replace the model. On failure the model is left untouched.
    pub async fn load(&self) -> Result<()> {
        let snapshot = self.source.fetch_snapshot().await.map_err(|e| {
            error!(error = %e, "Snapshot fetch failed");
            e
        })?;
        info!(
            aircraft = snapshot.aircrafts.len(),
            tasks = snapshot.tasks.len(),
            operators = snapshot.mogs.len(),
            equipment = snapshot.equipment.len(),
            "Snapshot loaded"
        );
        self.model.load_snapshot(snapshot)?;
        Ok(())
    }
}
