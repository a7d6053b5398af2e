use crate::{
    error::ProcessingError,
    retry::{FailureClass, batch_retry_disposition, classify_db_error},
};
use connectors::{
    sql::{literal::MySqlLiteralEncoder, upsert::UpsertStatement},
    target::{BulkExecutor, SessionTimeouts},
};
use engine_core::retry::{RetryError, RetryPolicy};
use model::records::mapped::{BusinessKey, MappedRecord};
use std::{collections::HashSet, sync::Arc, time::Instant};
use tracing::{debug, info, warn};

/// What one batch did to the target store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Mapped records handed in.
    pub rows: usize,
    /// Earlier duplicates of a business key later in the same batch.
    pub skipped: usize,
    /// Rows carried by a statement that executed.
    pub upserted: usize,
    /// Raw count reported by the target store.
    pub affected_rows: u64,
    /// Rows of a statement that failed without ending the run.
    pub failed: usize,
    pub retries: usize,
    pub last_key: Option<BusinessKey>,
}

/// Writes batches of mapped records as single multi-row upserts.
pub struct BatchUpserter {
    executor: Arc<dyn BulkExecutor>,
    encoder: MySqlLiteralEncoder,
    retry: RetryPolicy,
}

impl BatchUpserter {
    pub fn new(executor: Arc<dyn BulkExecutor>, retry: RetryPolicy) -> Self {
        Self {
            executor,
            encoder: MySqlLiteralEncoder::new(),
            retry,
        }
    }

    pub async fn prepare_session(&self, timeouts: &SessionTimeouts) -> Result<(), ProcessingError> {
        self.executor
            .prepare_session(timeouts)
            .await
            .map_err(ProcessingError::Session)
    }

    /// Upserts `records`, which must all belong to one entity.
    ///
    /// Connection losses are retried under the policy. A statement failure
    /// of any other kind that does not end the run comes back as
    /// `failed` rows instead of an error.
    pub async fn upsert(
        &self,
        batch: usize,
        records: Vec<MappedRecord>,
    ) -> Result<BatchOutcome, ProcessingError> {
        let rows = records.len();
        let Some(table) = records.first().map(MappedRecord::table) else {
            return Ok(BatchOutcome::default());
        };

        let records = collapse_duplicates(records);
        let skipped = rows - records.len();
        if skipped > 0 {
            debug!(batch, table = table.name, skipped, "Collapsed duplicate business keys");
        }
        let last_key = records.last().map(MappedRecord::business_key);

        let statement = UpsertStatement::build(table, records, &self.encoder)
            .map_err(|source| ProcessingError::Execute { batch, source })?;

        let start = Instant::now();
        let mut retries = 0;
        let result = self
            .retry
            .run(
                || self.executor.execute(&statement),
                batch_retry_disposition,
                |attempt, err, delay| {
                    retries += 1;
                    warn!(
                        batch,
                        table = table.name,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Connection lost while writing batch, retrying"
                    );
                },
            )
            .await;

        match result {
            Ok(exec) => {
                let duration = start.elapsed();
                let upserted = statement.row_count();
                let rows_per_sec = upserted as f64 / duration.as_secs_f64().max(f64::EPSILON);
                info!(
                    batch,
                    table = table.name,
                    rows = upserted,
                    affected_rows = exec.affected_rows,
                    duration_ms = duration.as_millis(),
                    rows_per_sec = %format!("{:.2}", rows_per_sec),
                    "Batch upserted"
                );
                Ok(BatchOutcome {
                    rows,
                    skipped,
                    upserted,
                    affected_rows: exec.affected_rows,
                    failed: 0,
                    retries,
                    last_key,
                })
            }
            Err(RetryError::AttemptsExceeded { attempts, last }) => {
                Err(ProcessingError::RetriesExhausted {
                    attempts,
                    source: last,
                })
            }
            Err(RetryError::NotRetryable(err)) => match classify_db_error(&err) {
                FailureClass::Other => {
                    warn!(
                        batch,
                        table = table.name,
                        rows = statement.row_count(),
                        error = %err,
                        "Batch rejected by target store, counting its rows as errors"
                    );
                    Ok(BatchOutcome {
                        rows,
                        skipped,
                        upserted: 0,
                        affected_rows: 0,
                        failed: statement.row_count(),
                        retries,
                        last_key: None,
                    })
                }
                _ => Err(ProcessingError::Execute { batch, source: err }),
            },
        }
    }
}

/// Keeps the last record of every business key, preserving batch order.
fn collapse_duplicates(records: Vec<MappedRecord>) -> Vec<MappedRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut kept: Vec<MappedRecord> = records
        .into_iter()
        .rev()
        .filter(|record| seen.insert(record.business_key()))
        .collect();
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::{error::DbError, target::ExecOutcome};
    use model::{core::value::Value, sync::entity::SyncEntity};
    use mysql_async::ServerError;
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tracing_test::traced_test;

    /// Fails with the queued server codes, then succeeds.
    #[derive(Default)]
    struct ScriptedExecutor {
        failures: Mutex<VecDeque<u16>>,
        calls: AtomicUsize,
        statements: Mutex<Vec<usize>>,
    }

    impl ScriptedExecutor {
        fn failing_with(codes: &[u16]) -> Arc<Self> {
            Arc::new(Self {
                failures: Mutex::new(codes.iter().copied().collect()),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl BulkExecutor for ScriptedExecutor {
        async fn prepare_session(&self, _timeouts: &SessionTimeouts) -> Result<(), DbError> {
            Ok(())
        }

        async fn execute(&self, statement: &UpsertStatement) -> Result<ExecOutcome, DbError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(code) = self.failures.lock().unwrap().pop_front() {
                return Err(DbError::MySql(mysql_async::Error::Server(ServerError {
                    code,
                    message: "scripted".into(),
                    state: "HY000".into(),
                })));
            }
            self.statements.lock().unwrap().push(statement.row_count());
            Ok(ExecOutcome {
                affected_rows: statement.row_count() as u64,
                info: None,
            })
        }
    }

    fn day(turnus: i64, name: &str) -> MappedRecord {
        MappedRecord::from_pairs(
            SyncEntity::ShiftDays,
            vec![("turnus_id", Value::Int(turnus)), ("dayname", Value::from(name))],
        )
        .unwrap()
    }

    fn upserter(executor: Arc<ScriptedExecutor>) -> BatchUpserter {
        BatchUpserter::new(executor, RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn later_duplicates_win() {
        let records = vec![day(1, "pon"), day(1, "uto"), day(1, "pon"), day(2, "pon")];
        let kept = collapse_duplicates(records);
        let keys: Vec<String> = kept.iter().map(|r| r.business_key().to_string()).collect();
        assert_eq!(keys, vec!["1|uto", "1|pon", "2|pon"]);

        let executor = ScriptedExecutor::failing_with(&[]);
        let outcome = upserter(executor.clone())
            .upsert(0, vec![day(1, "pon"), day(1, "pon"), day(3, "sub")])
            .await
            .unwrap();
        assert_eq!(outcome.rows, 3);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.upserted, 2);
        assert_eq!(outcome.last_key.unwrap().to_string(), "3|sub");
        assert_eq!(*executor.statements.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    #[traced_test]
    async fn retried_batch_is_counted_once() {
        let executor = ScriptedExecutor::failing_with(&[2013, 2006]);
        let outcome = upserter(executor.clone())
            .upsert(7, vec![day(1, "pon"), day(2, "pon")])
            .await
            .unwrap();
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.retries, 2);
        assert_eq!(outcome.upserted, 2);
        assert_eq!(outcome.affected_rows, 2);
        assert_eq!(*executor.statements.lock().unwrap(), vec![2]);
        assert!(logs_contain("retrying"));
    }

    #[tokio::test]
    async fn exhausted_retries_end_the_run() {
        let executor = ScriptedExecutor::failing_with(&[2013, 2013, 2013]);
        let err = upserter(executor.clone())
            .upsert(1, vec![day(1, "pon")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeouts_are_not_retried() {
        let executor = ScriptedExecutor::failing_with(&[1205]);
        let err = upserter(executor.clone())
            .upsert(1, vec![day(1, "pon")])
            .await
            .unwrap_err();
        assert_eq!(err.class(), FailureClass::TimeoutFatal);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_failures_count_rows_as_errors() {
        let executor = ScriptedExecutor::failing_with(&[1366]);
        let outcome = upserter(executor)
            .upsert(2, vec![day(1, "pon"), day(2, "uto")])
            .await
            .unwrap();
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.upserted, 0);
        assert_eq!(outcome.last_key, None);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let executor = ScriptedExecutor::failing_with(&[]);
        let outcome = upserter(executor.clone()).upsert(0, Vec::new()).await.unwrap();
        assert_eq!(outcome, BatchOutcome::default());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }
}
