use crate::{error::StoreError, state::RunStore};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use model::sync::run::{ProgressUpdate, RunId, SyncRun, SyncStatus};
use mysql_async::{
    Params, Pool, Row, TxOpts, Value,
    prelude::{FromValue, Queryable},
};
use tracing::debug;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS sync_runs (
    id CHAR(36) NOT NULL PRIMARY KEY,
    scope_key VARCHAR(255) NOT NULL,
    requester VARCHAR(128) NOT NULL,
    status VARCHAR(16) NOT NULL,
    total_records BIGINT UNSIGNED NULL,
    processed_records BIGINT UNSIGNED NOT NULL DEFAULT 0,
    upserted_records BIGINT UNSIGNED NOT NULL DEFAULT 0,
    skipped_records BIGINT UNSIGNED NOT NULL DEFAULT 0,
    error_records BIGINT UNSIGNED NOT NULL DEFAULT 0,
    affected_rows BIGINT UNSIGNED NOT NULL DEFAULT 0,
    workers INT UNSIGNED NOT NULL DEFAULT 0,
    last_processed_batch_index BIGINT UNSIGNED NULL,
    last_processed_record_key VARCHAR(512) NULL,
    started_at DATETIME(6) NOT NULL,
    completed_at DATETIME(6) NULL,
    updated_at DATETIME(6) NOT NULL,
    error_message TEXT NULL,
    KEY idx_sync_runs_scope (scope_key, status, started_at),
    KEY idx_sync_runs_status (status, updated_at)
)";

const RUN_COLUMNS: &str = "id, scope_key, requester, status, total_records, processed_records, \
     upserted_records, skipped_records, error_records, affected_rows, workers, \
     last_processed_batch_index, last_processed_record_key, started_at, completed_at, \
     updated_at, error_message";

/// Run log kept in the `sync_runs` table of the target store.
#[derive(Clone)]
pub struct MySqlRunStore {
    pool: Pool,
}

impl MySqlRunStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Creates `sync_runs` when it does not exist yet.
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(CREATE_TABLE_SQL).await?;
        Ok(())
    }

    fn select(filter: &str) -> String {
        format!("SELECT {RUN_COLUMNS} FROM sync_runs WHERE {filter}")
    }
}

#[async_trait]
impl RunStore for MySqlRunStore {
    async fn insert(&self, run: &SyncRun) -> Result<(), StoreError> {
        let placeholders = vec!["?"; 17].join(", ");
        let sql = format!("INSERT INTO sync_runs ({RUN_COLUMNS}) VALUES ({placeholders})");
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(sql, run_params(run, true)).await?;
        debug!(run_id = %run.id, scope = %run.scope_key, "Inserted sync run");
        Ok(())
    }

    async fn update(&self, id: RunId, update: &ProgressUpdate) -> Result<SyncRun, StoreError> {
        let mut conn = self.pool.get_conn().await?;
        let mut tx = conn.start_transaction(TxOpts::default()).await?;

        let row: Option<Row> = tx
            .exec_first(Self::select("id = ? FOR UPDATE"), (id.to_string(),))
            .await?;
        let mut run = match row {
            Some(row) => decode_run(row)?,
            None => return Err(StoreError::RunNotFound(id)),
        };
        run.apply(update)?;

        tx.exec_drop(
            "UPDATE sync_runs SET status = ?, total_records = ?, processed_records = ?, \
             upserted_records = ?, skipped_records = ?, error_records = ?, affected_rows = ?, \
             workers = ?, last_processed_batch_index = ?, last_processed_record_key = ?, \
             completed_at = ?, updated_at = ?, error_message = ? WHERE id = ?",
            run_params(&run, false),
        )
        .await?;
        tx.commit().await?;
        Ok(run)
    }

    async fn get(&self, id: RunId) -> Result<Option<SyncRun>, StoreError> {
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn
            .exec_first(Self::select("id = ?"), (id.to_string(),))
            .await?;
        row.map(decode_run).transpose()
    }

    async fn last_incomplete(&self, scope_key: &str) -> Result<Option<SyncRun>, StoreError> {
        let sql = Self::select(
            "scope_key = ? AND status IN ('pending', 'in_progress') \
             ORDER BY started_at DESC LIMIT 1",
        );
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn.exec_first(sql, (scope_key,)).await?;
        row.map(decode_run).transpose()
    }

    async fn stale_in_progress(&self, before: DateTime<Utc>) -> Result<Vec<SyncRun>, StoreError> {
        let sql = Self::select("status = 'in_progress' AND updated_at < ? ORDER BY updated_at");
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.exec(sql, (before.naive_utc(),)).await?;
        rows.into_iter().map(decode_run).collect()
    }
}

/// Positional parameters for INSERT (every column) or UPDATE (mutable
/// columns followed by the id).
fn run_params(run: &SyncRun, for_insert: bool) -> Params {
    let mutable: Vec<Value> = vec![
        run.status.as_str().into(),
        run.total_records.into(),
        run.processed_records.into(),
        run.upserted_records.into(),
        run.skipped_records.into(),
        run.error_records.into(),
        run.affected_rows.into(),
        run.workers.into(),
        run.last_processed_batch_index.into(),
        run.last_processed_record_key.clone().into(),
    ];
    let completed_at: Value = run.completed_at.map(|t| t.naive_utc()).into();
    let updated_at: Value = run.updated_at.naive_utc().into();
    let error_message: Value = run.error_message.clone().into();

    let values = if for_insert {
        let mut values: Vec<Value> = vec![
            run.id.to_string().into(),
            run.scope_key.clone().into(),
            run.requester.clone().into(),
        ];
        values.extend(mutable);
        values.extend([
            run.started_at.naive_utc().into(),
            completed_at,
            updated_at,
            error_message,
        ]);
        values
    } else {
        let mut values = mutable;
        values.extend([
            completed_at,
            updated_at,
            error_message,
            run.id.to_string().into(),
        ]);
        values
    };
    Params::Positional(values)
}

fn column<T: FromValue>(row: &mut Row, idx: usize, name: &str) -> Result<T, StoreError> {
    row.take_opt::<T, _>(idx)
        .ok_or_else(|| StoreError::Corrupt(format!("missing column {name}")))?
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn timestamp(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}

fn decode_run(mut row: Row) -> Result<SyncRun, StoreError> {
    let id: String = column(&mut row, 0, "id")?;
    let status: String = column(&mut row, 3, "status")?;
    let completed_at: Option<NaiveDateTime> = column(&mut row, 14, "completed_at")?;

    Ok(SyncRun {
        id: id
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("run id '{id}': {e}")))?,
        scope_key: column(&mut row, 1, "scope_key")?,
        requester: column(&mut row, 2, "requester")?,
        status: status
            .parse::<SyncStatus>()
            .map_err(StoreError::Corrupt)?,
        total_records: column(&mut row, 4, "total_records")?,
        processed_records: column(&mut row, 5, "processed_records")?,
        upserted_records: column(&mut row, 6, "upserted_records")?,
        skipped_records: column(&mut row, 7, "skipped_records")?,
        error_records: column(&mut row, 8, "error_records")?,
        affected_rows: column(&mut row, 9, "affected_rows")?,
        workers: column(&mut row, 10, "workers")?,
        last_processed_batch_index: column(&mut row, 11, "last_processed_batch_index")?,
        last_processed_record_key: column(&mut row, 12, "last_processed_record_key")?,
        started_at: timestamp(column(&mut row, 13, "started_at")?),
        completed_at: completed_at.map(timestamp),
        updated_at: timestamp(column(&mut row, 15, "updated_at")?),
        error_message: column(&mut row, 16, "error_message")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_params_end_with_the_run_id() {
        let mut run = SyncRun::new("ticketing/stops/all", "ops");
        run.total_records = Some(12);
        let Params::Positional(values) = run_params(&run, false) else {
            panic!("expected positional params");
        };
        assert_eq!(values.len(), 14);
        assert_eq!(values[0], Value::from("pending"));
        assert_eq!(values[1], Value::from(12u64));
        assert_eq!(values[13], Value::from(run.id.to_string()));

        let Params::Positional(values) = run_params(&run, true) else {
            panic!("expected positional params");
        };
        assert_eq!(values.len(), RUN_COLUMNS.split(',').count());
    }
}
