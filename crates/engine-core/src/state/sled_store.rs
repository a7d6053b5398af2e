use crate::{error::StoreError, state::RunStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::sync::run::{ProgressUpdate, RunId, SyncRun, SyncStatus};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

pub struct SledRunStore {
    db: sled::Db,
}

impl SledRunStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Store that is removed when dropped.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    #[inline]
    fn run_key(id: RunId) -> String {
        format!("run:{id}")
    }

    fn runs(&self) -> impl Iterator<Item = Result<SyncRun, StoreError>> + '_ {
        self.db.scan_prefix("run:").map(|item| {
            let (_key, value) = item?;
            Ok(bincode::deserialize::<SyncRun>(&value)?)
        })
    }
}

#[async_trait]
impl RunStore for SledRunStore {
    async fn insert(&self, run: &SyncRun) -> Result<(), StoreError> {
        let bytes = bincode::serialize(run)?;
        self.db.insert(Self::run_key(run.id), bytes)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn update(&self, id: RunId, update: &ProgressUpdate) -> Result<SyncRun, StoreError> {
        let key = Self::run_key(id);

        // Check-and-set inside a transaction so concurrent writers cannot
        // resurrect a run that another writer just finalized.
        let result = self
            .db
            .transaction::<_, _, StoreError>(|tx_db| {
                let bytes = tx_db
                    .get(&key)?
                    .ok_or(ConflictableTransactionError::Abort(StoreError::RunNotFound(id)))?;
                let mut run: SyncRun = bincode::deserialize(&bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                run.apply(update)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;

                let new_bytes = bincode::serialize(&run)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                tx_db.insert(key.as_bytes(), new_bytes)?;
                Ok(run)
            });

        let run = match result {
            Ok(run) => run,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        };
        self.db.flush_async().await?;
        Ok(run)
    }

    async fn get(&self, id: RunId) -> Result<Option<SyncRun>, StoreError> {
        match self.db.get(Self::run_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn last_incomplete(&self, scope_key: &str) -> Result<Option<SyncRun>, StoreError> {
        let mut latest: Option<SyncRun> = None;
        for run in self.runs() {
            let run = run?;
            if run.scope_key != scope_key || run.status.is_terminal() {
                continue;
            }
            if latest.as_ref().is_none_or(|l| run.started_at > l.started_at) {
                latest = Some(run);
            }
        }
        Ok(latest)
    }

    async fn stale_in_progress(&self, before: DateTime<Utc>) -> Result<Vec<SyncRun>, StoreError> {
        let mut stale = Vec::new();
        for run in self.runs() {
            let run = run?;
            if run.status == SyncStatus::InProgress && run.updated_at < before {
                stale.push(run);
            }
        }
        stale.sort_by_key(|r| r.updated_at);
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn run_for(scope: &str) -> SyncRun {
        SyncRun::new(scope, "tester")
    }

    #[tokio::test]
    async fn updates_survive_reopening() {
        let dir = tempdir().unwrap();
        let run = run_for("ticketing/stops/all");
        {
            let store = SledRunStore::open(dir.path()).unwrap();
            store.insert(&run).await.unwrap();
            store
                .update(run.id, &ProgressUpdate::status(SyncStatus::InProgress))
                .await
                .unwrap();
            store
                .update(
                    run.id,
                    &ProgressUpdate {
                        total_records: Some(1200),
                        processed_records: Some(500),
                        last_processed_batch_index: Some(0),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let store = SledRunStore::open(dir.path()).unwrap();
        let loaded = store.get(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SyncStatus::InProgress);
        assert_eq!(loaded.total_records, Some(1200));
        assert_eq!(loaded.processed_records, 500);
        assert_eq!(loaded.last_processed_batch_index, Some(0));
    }

    #[tokio::test]
    async fn terminal_runs_are_frozen() {
        let store = SledRunStore::temporary().unwrap();
        let run = run_for("city/shift_days/all");
        store.insert(&run).await.unwrap();
        store
            .update(run.id, &ProgressUpdate::abandoned("superseded"))
            .await
            .unwrap();

        let err = store
            .update(run.id, &ProgressUpdate::status(SyncStatus::InProgress))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Update(_)));
        let loaded = store.get(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SyncStatus::Abandoned);
        assert_eq!(loaded.error_message.as_deref(), Some("superseded"));
    }

    #[tokio::test]
    async fn unknown_runs_are_reported() {
        let store = SledRunStore::temporary().unwrap();
        let id = RunId::new();
        assert!(store.get(id).await.unwrap().is_none());
        let err = store
            .update(id, &ProgressUpdate::status(SyncStatus::InProgress))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RunNotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn finds_latest_incomplete_run_of_a_scope() {
        let store = SledRunStore::temporary().unwrap();
        let mut older = run_for("ticketing/departures/all");
        older.started_at -= Duration::minutes(10);
        let newer = run_for("ticketing/departures/all");
        let finished = run_for("ticketing/departures/all");
        let other = run_for("city/departures/all");
        for run in [&older, &newer, &finished, &other] {
            store.insert(run).await.unwrap();
        }
        store
            .update(finished.id, &ProgressUpdate::abandoned("done elsewhere"))
            .await
            .unwrap();

        let found = store
            .last_incomplete("ticketing/departures/all")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newer.id);
        assert!(store.last_incomplete("ticketing/stops/all").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_sweep_only_sees_old_in_progress_runs() {
        let store = SledRunStore::temporary().unwrap();
        let mut idle = run_for("a");
        idle.status = SyncStatus::InProgress;
        idle.updated_at -= Duration::minutes(45);
        let mut busy = run_for("b");
        busy.status = SyncStatus::InProgress;
        let mut waiting = run_for("c");
        waiting.updated_at -= Duration::minutes(45);
        for run in [&idle, &busy, &waiting] {
            store.insert(run).await.unwrap();
        }

        let stale = store
            .stale_in_progress(Utc::now() - Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, idle.id);
    }
}
