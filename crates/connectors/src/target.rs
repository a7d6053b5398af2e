use crate::{error::DbError, sql::upsert::UpsertStatement};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Session variables raised above the server defaults before bulk writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimeouts {
    pub net_read_timeout: u32,
    pub net_write_timeout: u32,
    pub wait_timeout: u32,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            net_read_timeout: 600,
            net_write_timeout: 600,
            wait_timeout: 3600,
        }
    }
}

impl SessionTimeouts {
    pub fn statement(&self) -> String {
        format!(
            "SET SESSION net_read_timeout = {}, net_write_timeout = {}, wait_timeout = {}",
            self.net_read_timeout, self.net_write_timeout, self.wait_timeout
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Raw count from the server: 1 per inserted row, 2 per changed row,
    /// 0 per row left as it was.
    pub affected_rows: u64,
    pub info: Option<String>,
}

/// Executes bulk upserts against the target store.
#[async_trait]
pub trait BulkExecutor: Send + Sync {
    /// Applies the session timeouts before a run's first batch.
    async fn prepare_session(&self, timeouts: &SessionTimeouts) -> Result<(), DbError>;

    async fn execute(&self, statement: &UpsertStatement) -> Result<ExecOutcome, DbError>;
}
