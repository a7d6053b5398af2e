//! In-memory stand-ins for a legacy database and the target store.

use async_trait::async_trait;
use connectors::{
    credentials::LegacyConnection,
    error::DbError,
    source::{ExtractQuery, Extracted, LegacySource},
    sql::upsert::UpsertStatement,
    target::{BulkExecutor, ExecOutcome, SessionTimeouts},
};
use model::{core::value::Value, records::row::LegacyRow};
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::oneshot;

pub fn server_error(code: u16) -> DbError {
    DbError::MySql(mysql_async::Error::Server(mysql_async::ServerError {
        code,
        message: format!("server error {code}"),
        state: "HY000".into(),
    }))
}

/// Legacy tables keyed by name. Filters are not evaluated: every query
/// returns the whole table, in insertion order.
#[derive(Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<&'static str, Vec<LegacyRow>>>,
    unreachable: Mutex<bool>,
    queries: Mutex<Vec<ExtractQuery>>,
}

impl MemorySource {
    pub fn with_table(self, table: &'static str, rows: Vec<LegacyRow>) -> Self {
        self.tables.lock().unwrap().insert(table, rows);
        self
    }

    pub fn unreachable() -> Self {
        let source = Self::default();
        *source.unreachable.lock().unwrap() = true;
        source
    }

    pub fn queries(&self) -> Vec<ExtractQuery> {
        self.queries.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> Result<(), DbError> {
        if *self.unreachable.lock().unwrap() {
            return Err(server_error(2003));
        }
        Ok(())
    }
}

#[async_trait]
impl LegacySource for MemorySource {
    async fn extract(
        &self,
        _conn: &LegacyConnection,
        query: &ExtractQuery,
    ) -> Result<Extracted, DbError> {
        self.check_reachable()?;
        self.queries.lock().unwrap().push(query.clone());
        Ok(match self.tables.lock().unwrap().get(query.table) {
            Some(rows) => Extracted::Rows(rows.clone()),
            None => Extracted::TableMissing,
        })
    }

    async fn ping(&self, _conn: &LegacyConnection) -> Result<(), DbError> {
        self.check_reachable()
    }
}

/// Holds the first `execute` call until the test lets it through.
pub struct Gate {
    entered: Option<oneshot::Sender<()>>,
    release: oneshot::Receiver<()>,
}

/// Test side of a [`Gate`].
pub struct GateHandle {
    entered: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl GateHandle {
    /// Waits until a batch is blocked inside the target.
    pub async fn entered(&mut self) {
        let _ = (&mut self.entered).await;
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }
}

type TableRows = BTreeMap<String, Vec<Value>>;

/// Applies upserts by business key and counts affected rows the way MySQL
/// does for `ON DUPLICATE KEY UPDATE`.
#[derive(Default)]
pub struct MemoryTarget {
    tables: Mutex<HashMap<&'static str, TableRows>>,
    failures: Mutex<VecDeque<u16>>,
    gate: Mutex<Option<Gate>>,
    executed: Mutex<Vec<usize>>,
    calls: AtomicUsize,
    sessions: AtomicUsize,
}

impl MemoryTarget {
    /// Server error codes returned by the next calls, one per call.
    pub fn fail_with(&self, codes: &[u16]) {
        self.failures.lock().unwrap().extend(codes.iter().copied());
    }

    pub fn gate(&self) -> GateHandle {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(Gate {
            entered: Some(entered_tx),
            release: release_rx,
        });
        GateHandle {
            entered: entered_rx,
            release: release_tx,
        }
    }

    pub fn rows(&self, table: &str) -> TableRows {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Row count of every statement that reached the store.
    pub fn executed(&self) -> Vec<usize> {
        self.executed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Applies the upsert and counts affected rows as MySQL does: 1 per
    /// insert, 2 per updated row. A table with a touch column rewrites it on
    /// every duplicate, so its unchanged rows still count 2.
    fn apply(&self, statement: &UpsertStatement) -> u64 {
        let table = statement.table();
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.entry(table.name).or_default();

        let mut affected = 0;
        for record in statement.records() {
            let key = record.business_key().to_string();
            let incoming = record.values().to_vec();
            match stored.get_mut(&key) {
                None => {
                    stored.insert(key, incoming);
                    affected += 1;
                }
                Some(existing) => {
                    let merged: Vec<Value> = table
                        .columns
                        .iter()
                        .zip(incoming)
                        .zip(existing.iter())
                        .map(|((column, new), old)| {
                            if new.is_null() && table.keep_existing_on_null.contains(column) {
                                old.clone()
                            } else {
                                new
                            }
                        })
                        .collect();
                    if merged != *existing {
                        *existing = merged;
                        affected += 2;
                    } else if table.touch_column.is_some() {
                        affected += 2;
                    }
                }
            }
        }
        affected
    }
}

#[async_trait]
impl BulkExecutor for MemoryTarget {
    async fn prepare_session(&self, _timeouts: &SessionTimeouts) -> Result<(), DbError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, statement: &UpsertStatement) -> Result<ExecOutcome, DbError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().take();
        if let Some(mut gate) = gate {
            if let Some(entered) = gate.entered.take() {
                let _ = entered.send(());
            }
            let _ = gate.release.await;
        }

        if let Some(code) = self.failures.lock().unwrap().pop_front() {
            return Err(server_error(code));
        }

        let affected_rows = self.apply(statement);
        self.executed.lock().unwrap().push(statement.row_count());
        Ok(ExecOutcome {
            affected_rows,
            info: None,
        })
    }
}
