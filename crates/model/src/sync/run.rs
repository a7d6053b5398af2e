use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Abandoned,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::Failed | SyncStatus::Abandoned
        )
    }

    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Abandoned)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Abandoned)
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "in_progress" => Ok(SyncStatus::InProgress),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            "abandoned" => Ok(SyncStatus::Abandoned),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunUpdateError {
    #[error("run {run_id} is already {status}")]
    Terminal { run_id: RunId, status: SyncStatus },

    #[error("run {run_id} cannot move from {from} to {to}")]
    IllegalTransition {
        run_id: RunId,
        from: SyncStatus,
        to: SyncStatus,
    },

    #[error("run {run_id}: processed {processed} exceeds total {total}")]
    ProcessedExceedsTotal {
        run_id: RunId,
        processed: u64,
        total: u64,
    },
}

/// Durable record of one sync invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: RunId,
    pub scope_key: String,
    pub requester: String,
    pub status: SyncStatus,
    /// Unknown until extraction has finished.
    pub total_records: Option<u64>,
    pub processed_records: u64,
    pub upserted_records: u64,
    pub skipped_records: u64,
    pub error_records: u64,
    /// Raw affected-row count reported by the target store.
    pub affected_rows: u64,
    pub workers: u32,
    pub last_processed_batch_index: Option<u64>,
    pub last_processed_record_key: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl SyncRun {
    pub fn new(scope_key: impl Into<String>, requester: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            scope_key: scope_key.into(),
            requester: requester.into(),
            status: SyncStatus::Pending,
            total_records: None,
            processed_records: 0,
            upserted_records: 0,
            skipped_records: 0,
            error_records: 0,
            affected_rows: 0,
            workers: 0,
            last_processed_batch_index: None,
            last_processed_record_key: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
            error_message: None,
        }
    }

    /// Applies a partial update, enforcing the status machine and
    /// `processed <= total`.
    pub fn apply(&mut self, update: &ProgressUpdate) -> Result<(), RunUpdateError> {
        if self.status.is_terminal() {
            return Err(RunUpdateError::Terminal {
                run_id: self.id,
                status: self.status,
            });
        }
        if let Some(next) = update.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(RunUpdateError::IllegalTransition {
                    run_id: self.id,
                    from: self.status,
                    to: next,
                });
            }
        }

        let total = update.total_records.or(self.total_records);
        let processed = update.processed_records.unwrap_or(self.processed_records);
        if let Some(total) = total {
            if processed > total {
                return Err(RunUpdateError::ProcessedExceedsTotal {
                    run_id: self.id,
                    processed,
                    total,
                });
            }
        }

        let now = Utc::now();
        if let Some(next) = update.status {
            if next.is_terminal() && !self.status.is_terminal() {
                self.completed_at = Some(now);
            }
            self.status = next;
        }
        self.total_records = total;
        self.processed_records = processed;
        if let Some(v) = update.upserted_records {
            self.upserted_records = v;
        }
        if let Some(v) = update.skipped_records {
            self.skipped_records = v;
        }
        if let Some(v) = update.error_records {
            self.error_records = v;
        }
        if let Some(v) = update.affected_rows {
            self.affected_rows = v;
        }
        if let Some(v) = update.workers {
            self.workers = v;
        }
        if let Some(v) = update.last_processed_batch_index {
            self.last_processed_batch_index = Some(v);
        }
        if let Some(v) = &update.last_processed_record_key {
            self.last_processed_record_key = Some(v.clone());
        }
        if let Some(v) = &update.error_message {
            self.error_message = Some(v.clone());
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn percent(&self) -> Option<f64> {
        match self.total_records {
            Some(0) => Some(100.0),
            Some(total) => Some(self.processed_records as f64 * 100.0 / total as f64),
            None => None,
        }
    }

    pub fn summary(&self) -> SyncSummary {
        SyncSummary {
            run_id: self.id,
            upserted: self.upserted_records,
            skipped: self.skipped_records,
            errors: self.error_records,
            total_processed: self.processed_records,
        }
    }
}

/// Field-level patch of a [`SyncRun`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub status: Option<SyncStatus>,
    pub total_records: Option<u64>,
    pub processed_records: Option<u64>,
    pub upserted_records: Option<u64>,
    pub skipped_records: Option<u64>,
    pub error_records: Option<u64>,
    pub affected_rows: Option<u64>,
    pub workers: Option<u32>,
    pub last_processed_batch_index: Option<u64>,
    pub last_processed_record_key: Option<String>,
    pub error_message: Option<String>,
}

impl ProgressUpdate {
    pub fn status(status: SyncStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(SyncStatus::Failed),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn abandoned(message: impl Into<String>) -> Self {
        Self {
            status: Some(SyncStatus::Abandoned),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total_records = Some(total);
        self
    }
}

/// Outcome returned to blocking callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub run_id: RunId,
    pub upserted: u64,
    pub skipped: u64,
    pub errors: u64,
    pub total_processed: u64,
}
