use crate::retry::{FailureClass, classify_db_error, classify_extract_error};
use connectors::error::{ConnectorError, DbError};
use engine_core::error::SyncError;
use model::records::{legacy::RowShapeError, mapped::ShapeError};
use thiserror::Error;

/// Why a single legacy row could not be turned into a target row.
#[derive(Error, Debug, PartialEq)]
pub enum MappingError {
    #[error(transparent)]
    Shape(#[from] RowShapeError),

    #[error("key column '{0}' is missing")]
    MissingKey(&'static str),

    #[error("key column '{column}' holds unusable value '{value}'")]
    InvalidKey { column: &'static str, value: String },

    #[error("column '{column}' must be 1 or 2, found {value}")]
    Direction { column: &'static str, value: i64 },

    #[error("target row is malformed: {0}")]
    Record(#[from] ShapeError),
}

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to resolve legacy source: {0}")]
    Resolve(#[source] ConnectorError),

    #[error("Extraction failed: {0}")]
    Extract(#[source] DbError),

    #[error("Failed to prepare target session: {0}")]
    Session(#[source] DbError),

    #[error("Batch {batch} failed: {source}")]
    Execute {
        batch: usize,
        #[source]
        source: DbError,
    },

    #[error("Batch failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: DbError,
    },
}

impl ProcessingError {
    pub fn class(&self) -> FailureClass {
        match self {
            ProcessingError::Resolve(ConnectorError::Database(err)) => classify_extract_error(err),
            ProcessingError::Resolve(ConnectorError::Decrypt(_)) => FailureClass::PermissionDenied,
            ProcessingError::Resolve(_) => FailureClass::SourceUnavailable,
            ProcessingError::Extract(err) => classify_extract_error(err),
            ProcessingError::Session(err) | ProcessingError::Execute { source: err, .. } => {
                classify_db_error(err)
            }
            ProcessingError::RetriesExhausted { .. } => FailureClass::TransientConnectionLoss,
        }
    }
}

impl From<ProcessingError> for SyncError {
    fn from(err: ProcessingError) -> Self {
        let class = err.class();
        match err {
            ProcessingError::RetriesExhausted { attempts, source } => {
                SyncError::retries_exhausted(attempts, source)
            }
            ProcessingError::Resolve(_) | ProcessingError::Extract(_) => match class {
                FailureClass::PermissionDenied => SyncError::PermissionDenied(err.to_string()),
                FailureClass::TimeoutFatal => SyncError::TimeoutFatal(err.to_string()),
                FailureClass::SourceUnavailable => SyncError::SourceUnavailable(err.to_string()),
                _ => SyncError::Fatal(err.to_string()),
            },
            ProcessingError::Session(_) | ProcessingError::Execute { .. } => match class {
                FailureClass::PermissionDenied => SyncError::PermissionDenied(err.to_string()),
                FailureClass::TimeoutFatal => SyncError::TimeoutFatal(err.to_string()),
                _ => SyncError::Fatal(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::error::ErrorKind;
    use mysql_async::ServerError;

    fn server(code: u16) -> DbError {
        DbError::MySql(mysql_async::Error::Server(ServerError {
            code,
            message: "denied".into(),
            state: "HY000".into(),
        }))
    }

    #[test]
    fn resolution_failures_keep_their_class() {
        let err: SyncError =
            ProcessingError::Resolve(ConnectorError::NotRegistered("city".into())).into();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);

        let err: SyncError =
            ProcessingError::Resolve(ConnectorError::Decrypt("bad key".into())).into();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err: SyncError = ProcessingError::Extract(server(1045)).into();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err: SyncError = ProcessingError::Extract(server(2013)).into();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }

    #[test]
    fn batch_failures_escalate() {
        let err: SyncError = ProcessingError::Execute {
            batch: 4,
            source: server(1205),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::TimeoutFatal);
        assert!(err.to_string().contains("Batch 4"));

        let err: SyncError = ProcessingError::RetriesExhausted {
            attempts: 3,
            source: server(2006),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("3 attempts"));
    }
}
