use crate::{
    execution::workers::{RunJob, WorkerPool, WorkerSettings},
    registry::TaskRegistry,
    resume::ResumeCoordinator,
};
use chrono::Utc;
use connectors::{credentials::LegacyConnection, target::SessionTimeouts};
use engine_core::{
    error::{StoreError, SyncError},
    progress::ProgressTracker,
};
use engine_processing::{extractor::Extractor, mapper::RecordMapper, upserter::BatchUpserter};
use model::sync::{
    run::{ProgressUpdate, RunId, RunUpdateError, SyncRun, SyncStatus, SyncSummary},
    scope::{SourceKind, SyncScope},
};
use std::{sync::Arc, time::Duration, time::Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub worker: WorkerSettings,
    pub session: SessionTimeouts,
    pub stale_after: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            worker: WorkerSettings::default(),
            session: SessionTimeouts::default(),
            stale_after: Duration::from_secs(30 * 60),
        }
    }
}

/// A run executing in the background.
pub struct SyncHandle {
    pub run_id: RunId,
    handle: JoinHandle<Result<SyncSummary, SyncError>>,
}

impl SyncHandle {
    /// Waits for the run to end. A failure has already been recorded in the
    /// tracker when this returns an error.
    pub async fn wait(self) -> Result<SyncSummary, SyncError> {
        self.handle
            .await
            .map_err(|err| SyncError::Fatal(format!("sync supervisor ended abnormally: {err}")))?
    }
}

struct EngineInner {
    extractor: Extractor,
    upserter: Arc<BatchUpserter>,
    tracker: ProgressTracker,
    resume: ResumeCoordinator,
    registry: TaskRegistry,
    options: EngineOptions,
    shutdown: CancellationToken,
}

/// Entry point for callers: starts runs, reports their state and sweeps
/// runs nobody is working on any more.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        extractor: Extractor,
        upserter: BatchUpserter,
        tracker: ProgressTracker,
        options: EngineOptions,
    ) -> Self {
        let registry = TaskRegistry::new();
        Self {
            inner: Arc::new(EngineInner {
                extractor,
                upserter: Arc::new(upserter),
                resume: ResumeCoordinator::new(tracker.clone(), registry.clone()),
                tracker,
                registry,
                options,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Starts a run and returns as soon as it is registered; processing
    /// continues in the background.
    pub async fn start_sync(
        &self,
        scope: SyncScope,
        requester: &str,
    ) -> Result<SyncHandle, SyncError> {
        scope.validate()?;
        let run = self.inner.resume.begin(&scope, requester).await?;
        let run_id = run.id;
        let cancel = self.inner.shutdown.child_token();

        let engine = self.clone();
        let task_cancel = cancel.clone();
        let handle = self.inner.registry.spawn_supervised(
            run_id,
            cancel,
            self.inner.tracker.clone(),
            async move { engine.execute(run, scope, task_cancel).await },
        );
        Ok(SyncHandle { run_id, handle })
    }

    /// Runs a scope to completion and returns its summary.
    pub async fn run_sync_blocking(
        &self,
        scope: SyncScope,
        requester: &str,
    ) -> Result<SyncSummary, SyncError> {
        self.start_sync(scope, requester).await?.wait().await
    }

    pub async fn get_sync_status(&self, run_id: RunId) -> Result<SyncRun, SyncError> {
        Ok(self.inner.tracker.get_status(run_id).await?)
    }

    pub async fn get_last_incomplete_run(
        &self,
        scope: &SyncScope,
    ) -> Result<Option<SyncRun>, SyncError> {
        Ok(self.inner.tracker.get_last_incomplete_run(scope).await?)
    }

    /// Abandons every `in_progress` run without a progress write for longer
    /// than the configured staleness window.
    pub async fn sweep_stale_runs(&self) -> Result<Vec<RunId>, SyncError> {
        let stale_after = self.inner.options.stale_after;
        let window = chrono::Duration::from_std(stale_after)
            .map_err(|err| SyncError::Fatal(format!("invalid staleness window: {err}")))?;
        let before = Utc::now() - window;

        let mut swept = Vec::new();
        for run in self.inner.tracker.stale_runs(before).await? {
            let message = format!(
                "no progress since {}, abandoned after {} minutes",
                run.updated_at.format("%Y-%m-%d %H:%M:%S"),
                stale_after.as_secs() / 60
            );
            match self
                .inner
                .tracker
                .update_progress(run.id, ProgressUpdate::abandoned(message))
                .await
            {
                Ok(_) => {
                    self.inner.registry.cancel(run.id);
                    warn!(run_id = %run.id, scope = %run.scope_key, "Swept stale sync run");
                    swept.push(run.id);
                }
                Err(err) => warn!(run_id = %run.id, "Could not sweep stale run: {}", err),
            }
        }
        Ok(swept)
    }

    /// Resolves a legacy source and opens one connection to it.
    pub async fn check_source(&self, source: SourceKind) -> Result<LegacyConnection, SyncError> {
        Ok(self.inner.extractor.check(source).await?)
    }

    /// Stops every run of this engine at its next batch boundary.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn active_runs(&self) -> Vec<RunId> {
        self.inner.registry.active()
    }

    async fn execute(
        &self,
        run: SyncRun,
        scope: SyncScope,
        cancel: CancellationToken,
    ) -> Result<SyncSummary, SyncError> {
        let run_id = run.id;
        let start = Instant::now();
        match self.drive(run_id, &scope, cancel).await {
            Ok(summary) => {
                info!(
                    run_id = %run_id,
                    scope = %scope,
                    processed = summary.total_processed,
                    upserted = summary.upserted,
                    skipped = summary.skipped,
                    errors = summary.errors,
                    duration_ms = start.elapsed().as_millis(),
                    "Sync run completed"
                );
                Ok(summary)
            }
            Err(err) => {
                self.record_end(run_id, &err).await;
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        run_id: RunId,
        scope: &SyncScope,
        cancel: CancellationToken,
    ) -> Result<SyncSummary, SyncError> {
        let inner = &self.inner;
        let tracker = &inner.tracker;

        let mut starting = ProgressUpdate::status(SyncStatus::InProgress);
        starting.workers = Some(inner.options.worker.workers as u32);
        self.advance(run_id, starting).await?;

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled("cancelled".into()));
        }

        let rows = inner.extractor.extract(scope).await?;
        self.advance(run_id, ProgressUpdate::default().with_total(rows.len() as u64))
            .await?;

        let counters = if rows.is_empty() {
            info!(run_id = %run_id, scope = %scope, "Scope is empty");
            Default::default()
        } else {
            inner.upserter.prepare_session(&inner.options.session).await?;
            let pool = WorkerPool::new(inner.options.worker, inner.upserter.clone(), tracker.clone());
            let job = RunJob {
                run_id,
                entity: scope.entity,
                mapper: RecordMapper::new(scope.source),
                cancel,
            };
            pool.run(&job, &rows).await?
        };

        let run = self
            .advance(run_id, counters.to_update().with_status(SyncStatus::Completed))
            .await?;
        Ok(run.summary())
    }

    /// Writes a run transition. A run abandoned by a newer request, even one
    /// still `pending`, rejects the write and ends as cancelled.
    async fn advance(&self, run_id: RunId, update: ProgressUpdate) -> Result<SyncRun, SyncError> {
        match self.inner.tracker.update_progress(run_id, update).await {
            Ok(run) => Ok(run),
            Err(StoreError::Update(RunUpdateError::Terminal {
                status: SyncStatus::Abandoned,
                ..
            })) => {
                info!(run_id = %run_id, "Run was abandoned before it finished, stopping");
                Err(SyncError::Cancelled("abandoned".into()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Makes the persisted status reflect how the run ended.
    async fn record_end(&self, run_id: RunId, err: &SyncError) {
        let tracker = &self.inner.tracker;
        if let SyncError::Cancelled(_) = err
            && let Ok(run) = tracker.get_status(run_id).await
            && run.status == SyncStatus::Abandoned
        {
            info!(run_id = %run_id, "Abandoned run stopped");
            return;
        }

        error!(run_id = %run_id, kind = %err.kind(), "Sync run failed: {}", err);
        if let Err(store_err) = tracker.record_failure(run_id, &err.to_string()).await {
            error!(run_id = %run_id, "Failed to record run failure: {}", store_err);
        }
    }
}
