use crate::{error::StoreError, state::RunStore};
use chrono::{DateTime, Utc};
use model::sync::{
    run::{ProgressUpdate, RunId, RunUpdateError, SyncRun},
    scope::SyncScope,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable, queryable view of sync runs.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn RunStore>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        ProgressTracker { store }
    }

    /// Persists a new `pending` run for the scope.
    pub async fn create_run(
        &self,
        scope: &SyncScope,
        requester: &str,
    ) -> Result<SyncRun, StoreError> {
        let run = SyncRun::new(scope.key(), requester);
        self.store.insert(&run).await?;
        info!(run_id = %run.id, scope = %run.scope_key, requester, "Created sync run");
        Ok(run)
    }

    pub async fn update_progress(
        &self,
        run_id: RunId,
        update: ProgressUpdate,
    ) -> Result<SyncRun, StoreError> {
        let run = self.store.update(run_id, &update).await?;
        match (update.status, run.percent()) {
            (Some(status), _) => {
                info!(run_id = %run_id, status = %status, processed = run.processed_records, "Sync run status changed")
            }
            (None, Some(percent)) if update.processed_records.is_some() => info!(
                run_id = %run_id,
                processed = run.processed_records,
                total = run.total_records.unwrap_or_default(),
                "Sync progress {:.1}%",
                percent
            ),
            _ => debug!(run_id = %run_id, "Sync run updated"),
        }
        Ok(run)
    }

    pub async fn get_status(&self, run_id: RunId) -> Result<SyncRun, StoreError> {
        self.store
            .get(run_id)
            .await?
            .ok_or(StoreError::RunNotFound(run_id))
    }

    pub async fn get_last_incomplete_run(
        &self,
        scope: &SyncScope,
    ) -> Result<Option<SyncRun>, StoreError> {
        self.store.last_incomplete(&scope.key()).await
    }

    /// Records a terminal failure. A run that already ended keeps its state;
    /// the returned flag tells whether this call changed it.
    pub async fn record_failure(&self, run_id: RunId, message: &str) -> Result<bool, StoreError> {
        match self
            .update_progress(run_id, ProgressUpdate::failed(message))
            .await
        {
            Ok(_) => Ok(true),
            Err(StoreError::Update(RunUpdateError::Terminal { status, .. })) => {
                debug!(run_id = %run_id, %status, "Run already terminal, failure not recorded");
                Ok(false)
            }
            Err(err) => {
                warn!(run_id = %run_id, "Failed to record run failure: {}", err);
                Err(err)
            }
        }
    }

    pub async fn stale_runs(&self, before: DateTime<Utc>) -> Result<Vec<SyncRun>, StoreError> {
        self.store.stale_in_progress(before).await
    }
}
