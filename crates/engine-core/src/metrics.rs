use model::sync::run::ProgressUpdate;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerCounters {
    processed: AtomicU64,
    upserted: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    affected_rows: AtomicU64,
    batches: AtomicU64,
    retries: AtomicU64,
}

/// Run-wide counters shared by every worker of one run.
#[derive(Debug, Clone, Default)]
pub struct RunCounters {
    inner: Arc<InnerCounters>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub processed: u64,
    pub upserted: u64,
    pub skipped: u64,
    pub errors: u64,
    pub affected_rows: u64,
    pub batches: u64,
    pub retries: u64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_processed(&self, count: u64) {
        self.inner.processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_upserted(&self, count: u64) {
        self.inner.upserted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, count: u64) {
        self.inner.skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_errors(&self, count: u64) {
        self.inner.errors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_affected_rows(&self, count: u64) {
        self.inner.affected_rows.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_batches(&self, count: u64) {
        self.inner.batches.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_retries(&self, count: u64) {
        self.inner.retries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            processed: self.inner.processed.load(Ordering::Relaxed),
            upserted: self.inner.upserted.load(Ordering::Relaxed),
            skipped: self.inner.skipped.load(Ordering::Relaxed),
            errors: self.inner.errors.load(Ordering::Relaxed),
            affected_rows: self.inner.affected_rows.load(Ordering::Relaxed),
            batches: self.inner.batches.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
        }
    }
}

impl CountersSnapshot {
    /// Counter fields of a run update; status and diagnostics stay untouched.
    pub fn to_update(&self) -> ProgressUpdate {
        ProgressUpdate {
            processed_records: Some(self.processed),
            upserted_records: Some(self.upserted),
            skipped_records: Some(self.skipped),
            error_records: Some(self.errors),
            affected_rows: Some(self.affected_rows),
            ..Default::default()
        }
    }
}
