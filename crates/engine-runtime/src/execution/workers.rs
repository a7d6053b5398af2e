use engine_core::{
    error::{StoreError, SyncError},
    metrics::{CountersSnapshot, RunCounters},
    progress::ProgressTracker,
};
use engine_processing::{
    mapper::RecordMapper,
    upserter::{BatchOutcome, BatchUpserter},
};
use futures::future::join_all;
use model::{
    records::{legacy::describe_row, row::LegacyRow},
    sync::{
        entity::SyncEntity,
        run::{RunId, RunUpdateError, SyncStatus},
    },
};
use std::{ops::Range, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub workers: usize,
    pub batch_size: usize,
    pub progress_every: usize,
    pub batch_pause: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            batch_size: 500,
            progress_every: 5,
            batch_pause: Duration::ZERO,
        }
    }
}

/// The contiguous slice of the row-set one worker owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPlan {
    pub worker: usize,
    pub rows: Range<usize>,
    /// Run-wide index of this worker's first batch.
    pub first_batch: usize,
}

impl WorkerPlan {
    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.rows.len().div_ceil(batch_size)
    }
}

/// Splits `total` rows into at most `workers` contiguous, non-empty chunks
/// whose sizes differ by at most one.
pub fn plan_workers(total: usize, workers: usize, batch_size: usize) -> Vec<WorkerPlan> {
    let workers = workers.clamp(1, total.max(1));
    let base = total / workers;
    let extra = total % workers;

    let mut plans = Vec::with_capacity(workers);
    let mut start = 0;
    let mut first_batch = 0;
    for worker in 0..workers {
        let len = base + usize::from(worker < extra);
        if len == 0 {
            break;
        }
        let plan = WorkerPlan {
            worker,
            rows: start..start + len,
            first_batch,
        };
        first_batch += plan.batch_count(batch_size.max(1));
        start += len;
        plans.push(plan);
    }
    plans
}

/// Identity of the run a pool works for.
#[derive(Debug, Clone)]
pub struct RunJob {
    pub run_id: RunId,
    pub entity: SyncEntity,
    pub mapper: RecordMapper,
    pub cancel: CancellationToken,
}

/// Drives mapped batches of one run through the upserter.
pub struct WorkerPool {
    settings: WorkerSettings,
    upserter: Arc<BatchUpserter>,
    tracker: ProgressTracker,
}

struct Shared<'a> {
    job: &'a RunJob,
    rows: &'a [LegacyRow],
    counters: RunCounters,
    /// Serializes progress writes; holds the highest batch index written.
    progress_lock: Mutex<Option<usize>>,
    /// Trips when any worker fails so the others stop early.
    abort: CancellationToken,
}

impl WorkerPool {
    pub fn new(settings: WorkerSettings, upserter: Arc<BatchUpserter>, tracker: ProgressTracker) -> Self {
        Self {
            settings,
            upserter,
            tracker,
        }
    }

    /// Processes every row of the run. Row-level failures are counted; any
    /// other failure ends the whole run.
    pub async fn run(&self, job: &RunJob, rows: &[LegacyRow]) -> Result<CountersSnapshot, SyncError> {
        let plans = plan_workers(rows.len(), self.settings.workers, self.settings.batch_size);
        info!(
            run_id = %job.run_id,
            rows = rows.len(),
            workers = plans.len(),
            batch_size = self.settings.batch_size,
            "Launching workers"
        );

        let shared = Shared {
            job,
            rows,
            counters: RunCounters::new(),
            progress_lock: Mutex::new(None),
            abort: job.cancel.child_token(),
        };

        let results = join_all(plans.iter().map(|plan| self.run_worker(&shared, plan))).await;

        let mut cancelled = None;
        for result in results {
            match result {
                Ok(()) => {}
                Err(err @ SyncError::Cancelled(_)) => {
                    cancelled.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        match cancelled {
            Some(err) => Err(err),
            None => Ok(shared.counters.snapshot()),
        }
    }

    async fn run_worker(&self, shared: &Shared<'_>, plan: &WorkerPlan) -> Result<(), SyncError> {
        let result = self.process_chunk(shared, plan).await;
        if let Err(err) = &result
            && !matches!(err, SyncError::Cancelled(_))
        {
            shared.abort.cancel();
        }
        result
    }

    async fn process_chunk(&self, shared: &Shared<'_>, plan: &WorkerPlan) -> Result<(), SyncError> {
        let job = shared.job;
        let batch_size = self.settings.batch_size.max(1);
        let chunk = &shared.rows[plan.rows.clone()];
        let batches = plan.batch_count(batch_size);

        for (local, slice) in chunk.chunks(batch_size).enumerate() {
            if shared.abort.is_cancelled() {
                info!(run_id = %job.run_id, worker = plan.worker, "Worker stopping at batch boundary");
                return Err(SyncError::Cancelled("cancelled".into()));
            }

            let batch = plan.first_batch + local;
            let outcome = self.process_batch(shared, batch, slice).await?;
            let last = local + 1 == batches;

            if last || (local + 1) % self.settings.progress_every.max(1) == 0 {
                self.write_progress(shared, batch, &outcome).await?;
            }

            if !last && !self.settings.batch_pause.is_zero() {
                tokio::select! {
                    _ = shared.abort.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.batch_pause) => {}
                }
            }
        }

        debug!(run_id = %job.run_id, worker = plan.worker, batches, "Worker finished");
        Ok(())
    }

    async fn process_batch(
        &self,
        shared: &Shared<'_>,
        batch: usize,
        slice: &[LegacyRow],
    ) -> Result<BatchOutcome, SyncError> {
        let job = shared.job;
        let mut mapped = Vec::with_capacity(slice.len());
        let mut row_errors = 0u64;
        for row in slice {
            match job.mapper.map_row(job.entity, row) {
                Ok(record) => mapped.push(record),
                Err(err) => {
                    row_errors += 1;
                    warn!(
                        run_id = %job.run_id,
                        batch,
                        row = %describe_row(job.entity, row),
                        error = %err,
                        "Skipping unmappable row"
                    );
                }
            }
        }

        let outcome = self
            .upserter
            .upsert(batch, mapped)
            .await
            .map_err(SyncError::from)?;

        let counters = &shared.counters;
        counters.add_processed(slice.len() as u64);
        counters.add_upserted(outcome.upserted as u64);
        counters.add_skipped(outcome.skipped as u64);
        counters.add_errors(row_errors + outcome.failed as u64);
        counters.add_affected_rows(outcome.affected_rows);
        counters.add_retries(outcome.retries as u64);
        counters.add_batches(1);
        Ok(outcome)
    }

    async fn write_progress(
        &self,
        shared: &Shared<'_>,
        batch: usize,
        outcome: &BatchOutcome,
    ) -> Result<(), SyncError> {
        let run_id = shared.job.run_id;
        // Snapshot under the lock so a slower writer never overwrites newer counts.
        let mut highest = shared.progress_lock.lock().await;
        let mut update = shared.counters.snapshot().to_update();
        // A worker behind another one leaves the batch position alone.
        let advances = highest.is_none_or(|seen| batch > seen);
        if advances {
            update.last_processed_batch_index = Some(batch as u64);
            update.last_processed_record_key =
                outcome.last_key.as_ref().map(ToString::to_string);
        }

        match self.tracker.update_progress(run_id, update).await {
            Ok(_) => {
                if advances {
                    *highest = Some(batch);
                }
                Ok(())
            }
            Err(StoreError::Update(RunUpdateError::Terminal {
                status: SyncStatus::Abandoned,
                ..
            })) => {
                warn!(run_id = %run_id, "Run was abandoned by a newer request, stopping");
                shared.abort.cancel();
                Err(SyncError::Cancelled("abandoned".into()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_contiguous_and_balanced() {
        let plans = plan_workers(1201, 3, 500);
        let ranges: Vec<_> = plans.iter().map(|p| p.rows.clone()).collect();
        assert_eq!(ranges, vec![0..401, 401..801, 801..1201]);
        assert_eq!(
            plans.iter().map(|p| p.first_batch).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let plans = plan_workers(1200, 1, 500);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].batch_count(500), 3);
    }

    #[test]
    fn never_more_workers_than_rows() {
        assert_eq!(plan_workers(2, 8, 500).len(), 2);
        assert!(plan_workers(0, 4, 500).is_empty());
    }
}
