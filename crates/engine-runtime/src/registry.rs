use engine_core::{error::SyncError, progress::ProgressTracker};
use model::sync::run::{RunId, SyncSummary};
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, warn};

/// Background runs of this process, keyed by run id.
///
/// Every run started through [`TaskRegistry::spawn_supervised`] stays listed
/// until its task ends. A failure or panic of the task is always written to
/// the tracker before the handle resolves.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<RunId, CancellationToken>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn_supervised<F>(
        &self,
        run_id: RunId,
        cancel: CancellationToken,
        tracker: ProgressTracker,
        task: F,
    ) -> JoinHandle<Result<SyncSummary, SyncError>>
    where
        F: Future<Output = Result<SyncSummary, SyncError>> + Send + 'static,
    {
        self.register(run_id, cancel);
        // Run tasks log under the caller's span.
        let inner = tokio::spawn(task.in_current_span());
        let registry = self.clone();

        let supervisor = async move {
            let result = match inner.await {
                Ok(result) => result,
                Err(join_err) => {
                    error!(run_id = %run_id, "Sync task ended abnormally: {}", join_err);
                    Err(SyncError::Fatal(format!(
                        "sync task ended abnormally: {join_err}"
                    )))
                }
            };

            if let Err(err) = &result
                && let Err(store_err) = tracker.record_failure(run_id, &err.to_string()).await
            {
                warn!(run_id = %run_id, "Could not record failure of background run: {}", store_err);
            }

            registry.remove(run_id);
            result
        };
        tokio::spawn(supervisor.in_current_span())
    }

    pub fn register(&self, run_id: RunId, cancel: CancellationToken) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(run_id, cancel);
        }
    }

    pub fn remove(&self, run_id: RunId) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.remove(&run_id);
        }
    }

    /// Signals the run's workers to stop at their next batch boundary.
    /// Returns whether the run was executing in this process.
    pub fn cancel(&self, run_id: RunId) -> bool {
        let token = self
            .tasks
            .lock()
            .ok()
            .and_then(|tasks| tasks.get(&run_id).cloned());
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> Vec<RunId> {
        self.tasks
            .lock()
            .map(|tasks| tasks.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::state::sled_store::SledRunStore;
    use model::sync::{
        entity::SyncEntity,
        run::{ProgressUpdate, SyncStatus},
        scope::{ScopeFilter, SourceKind, SyncScope},
    };
    use tracing::info;
    use tracing_test::traced_test;

    async fn started_run(tracker: &ProgressTracker) -> RunId {
        let scope = SyncScope::new(SourceKind::City, SyncEntity::ShiftGroups, ScopeFilter::All);
        let run = tracker.create_run(&scope, "test").await.unwrap();
        tracker
            .update_progress(run.id, ProgressUpdate::status(SyncStatus::InProgress))
            .await
            .unwrap();
        run.id
    }

    #[tokio::test]
    async fn panicking_task_is_recorded_as_failed() {
        let tracker = ProgressTracker::new(Arc::new(SledRunStore::temporary().unwrap()));
        let registry = TaskRegistry::new();
        let run_id = started_run(&tracker).await;

        let handle = registry.spawn_supervised(
            run_id,
            CancellationToken::new(),
            tracker.clone(),
            async move {
                if run_id.as_uuid().is_nil() {
                    return Err(SyncError::Fatal("nil run id".into()));
                }
                panic!("worker blew up")
            },
        );
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("ended abnormally"));

        let run = tracker.get_status(run_id).await.unwrap();
        assert_eq!(run.status, SyncStatus::Failed);
        assert!(run.error_message.unwrap().contains("ended abnormally"));
        assert!(registry.active().is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn task_logs_carry_the_callers_span() {
        let tracker = ProgressTracker::new(Arc::new(SledRunStore::temporary().unwrap()));
        let registry = TaskRegistry::new();
        let run_id = started_run(&tracker).await;

        let handle = registry.spawn_supervised(
            run_id,
            CancellationToken::new(),
            tracker.clone(),
            async move {
                info!(run_id = %run_id, "Worker checked in");
                Err(SyncError::Fatal("stopped after check-in".into()))
            },
        );
        handle.await.unwrap().unwrap_err();

        assert!(logs_contain("Worker checked in"));
        let run = tracker.get_status(run_id).await.unwrap();
        assert_eq!(run.error_message.as_deref(), Some("stopped after check-in"));
    }

    #[tokio::test]
    async fn cancel_reaches_registered_token() {
        let registry = TaskRegistry::new();
        let run_id = RunId::new();
        let token = CancellationToken::new();
        registry.register(run_id, token.clone());

        assert!(registry.cancel(run_id));
        assert!(token.is_cancelled());
        assert!(!registry.cancel(RunId::new()));
    }
}
