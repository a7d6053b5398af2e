use model::sync::{
    run::{RunId, RunUpdateError},
    scope::ScopeError,
};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Run {0} not found")]
    RunNotFound(RunId),

    #[error("Rejected run update: {0}")]
    Update(#[from] RunUpdateError),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Failed to encode run state: {0}")]
    Codec(#[from] bincode::Error),

    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Corrupt run record: {0}")]
    Corrupt(String),
}

/// Coarse failure classes a run can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SourceUnavailable,
    PermissionDenied,
    TimeoutFatal,
    Fatal,
    Cancelled,
    InvalidScope,
    State,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::TimeoutFatal => "timeout_fatal",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidScope => "invalid_scope",
            ErrorKind::State => "state",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Legacy source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Statement timed out: {0}")]
    TimeoutFatal(String),

    #[error("{0}")]
    Fatal(String),

    #[error("{0}")]
    Cancelled(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(#[from] ScopeError),

    #[error("Run state error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            SyncError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            SyncError::TimeoutFatal(_) => ErrorKind::TimeoutFatal,
            SyncError::Fatal(_) => ErrorKind::Fatal,
            SyncError::Cancelled(_) => ErrorKind::Cancelled,
            SyncError::InvalidScope(_) => ErrorKind::InvalidScope,
            SyncError::Store(_) => ErrorKind::State,
        }
    }

    /// Escalation of a connection loss that survived every retry.
    pub fn retries_exhausted(attempts: usize, last: impl fmt::Display) -> Self {
        SyncError::Fatal(format!(
            "connection lost after {attempts} attempts: {last}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_retries_escalate_to_fatal() {
        assert_eq!(ErrorKind::TimeoutFatal.to_string(), "timeout_fatal");

        let err = SyncError::retries_exhausted(3, "server has gone away");
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(
            err.to_string(),
            "connection lost after 3 attempts: server has gone away"
        );
    }
}
