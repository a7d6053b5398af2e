use crate::registry::TaskRegistry;
use engine_core::{
    error::{StoreError, SyncError},
    progress::ProgressTracker,
};
use model::sync::{
    run::{ProgressUpdate, RunUpdateError, SyncRun},
    scope::SyncScope,
};
use tracing::{debug, info, warn};

/// Supersedes an unfinished run of a scope before a new one starts.
///
/// Runs are never resumed at an offset: the upserts are idempotent, so a
/// fresh run over the whole scope converges to the same target state.
#[derive(Clone)]
pub struct ResumeCoordinator {
    tracker: ProgressTracker,
    registry: TaskRegistry,
}

impl ResumeCoordinator {
    pub fn new(tracker: ProgressTracker, registry: TaskRegistry) -> Self {
        Self { tracker, registry }
    }

    /// Abandons the scope's last incomplete run, if any, and creates a new
    /// `pending` run.
    pub async fn begin(&self, scope: &SyncScope, requester: &str) -> Result<SyncRun, SyncError> {
        if let Some(prior) = self.tracker.get_last_incomplete_run(scope).await? {
            let message = format!(
                "superseded by a new sync request from '{requester}' for {}",
                scope.key()
            );
            match self
                .tracker
                .update_progress(prior.id, ProgressUpdate::abandoned(message))
                .await
            {
                Ok(_) => {
                    let signalled = self.registry.cancel(prior.id);
                    warn!(
                        run_id = %prior.id,
                        scope = %scope,
                        processed = prior.processed_records,
                        signalled,
                        "Abandoned incomplete sync run"
                    );
                }
                Err(StoreError::Update(RunUpdateError::Terminal { status, .. })) => {
                    debug!(run_id = %prior.id, %status, "Prior run ended before it could be abandoned");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let run = self.tracker.create_run(scope, requester).await?;
        info!(run_id = %run.id, scope = %scope, "Starting fresh sync run");
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::state::sled_store::SledRunStore;
    use model::sync::{
        entity::SyncEntity,
        run::SyncStatus,
        scope::{ScopeFilter, SourceKind},
    };
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn scope() -> SyncScope {
        SyncScope::new(SourceKind::Ticketing, SyncEntity::Stops, ScopeFilter::All)
    }

    #[tokio::test]
    async fn in_progress_run_is_abandoned_and_signalled() {
        let tracker = ProgressTracker::new(Arc::new(SledRunStore::temporary().unwrap()));
        let registry = TaskRegistry::new();
        let coordinator = ResumeCoordinator::new(tracker.clone(), registry.clone());

        let first = coordinator.begin(&scope(), "ops").await.unwrap();
        tracker
            .update_progress(first.id, ProgressUpdate::status(SyncStatus::InProgress))
            .await
            .unwrap();
        let token = CancellationToken::new();
        registry.register(first.id, token.clone());

        let second = coordinator.begin(&scope(), "ops").await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(token.is_cancelled());

        let first = tracker.get_status(first.id).await.unwrap();
        assert_eq!(first.status, SyncStatus::Abandoned);
        assert!(first.error_message.unwrap().contains("superseded"));
        assert_eq!(
            tracker.get_last_incomplete_run(&scope()).await.unwrap().map(|r| r.id),
            Some(second.id)
        );
    }

    #[tokio::test]
    async fn finished_runs_are_left_alone() {
        let tracker = ProgressTracker::new(Arc::new(SledRunStore::temporary().unwrap()));
        let coordinator = ResumeCoordinator::new(tracker.clone(), TaskRegistry::new());

        let first = coordinator.begin(&scope(), "ops").await.unwrap();
        tracker
            .update_progress(first.id, ProgressUpdate::status(SyncStatus::InProgress))
            .await
            .unwrap();
        tracker
            .update_progress(first.id, ProgressUpdate::status(SyncStatus::Completed))
            .await
            .unwrap();

        coordinator.begin(&scope(), "ops").await.unwrap();
        let first = tracker.get_status(first.id).await.unwrap();
        assert_eq!(first.status, SyncStatus::Completed);
    }
}
