use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::sync::run::{ProgressUpdate, RunId, SyncRun};

pub mod mysql_store;
pub mod sled_store;

/// Durable log of sync runs, one record per run, mutated in place.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn insert(&self, run: &SyncRun) -> Result<(), StoreError>;

    /// Applies `update` through [`SyncRun::apply`] and returns the stored result.
    async fn update(&self, id: RunId, update: &ProgressUpdate) -> Result<SyncRun, StoreError>;

    async fn get(&self, id: RunId) -> Result<Option<SyncRun>, StoreError>;

    /// Most recently started `pending` or `in_progress` run for the scope.
    async fn last_incomplete(&self, scope_key: &str) -> Result<Option<SyncRun>, StoreError>;

    /// `in_progress` runs not written since `before`.
    async fn stale_in_progress(&self, before: DateTime<Utc>) -> Result<Vec<SyncRun>, StoreError>;
}
