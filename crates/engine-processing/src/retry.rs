use connectors::error::DbError;
use engine_core::retry::RetryDisposition;
use mysql_async::Error as MySqlError;

/// How a database failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    PermissionDenied,
    SourceUnavailable,
    /// Retried with backoff.
    TransientConnectionLoss,
    /// Aborts the run at once.
    TimeoutFatal,
    /// Counted against the batch; the run continues.
    Other,
}

// See: https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html
const PERMISSION_CODES: [u16; 4] = [1044, 1045, 1142, 1227];
const UNAVAILABLE_CODES: [u16; 3] = [2002, 2003, 2005];
const CONNECTION_LOSS_CODES: [u16; 5] = [1040, 1042, 1053, 2006, 2013];
const TIMEOUT_CODES: [u16; 4] = [1205, 1317, 1969, 3024];

/// Classification of a failure while executing a statement on an open connection.
pub fn classify_db_error(err: &DbError) -> FailureClass {
    match err {
        DbError::MySql(mysql_err) => classify_mysql_error(mysql_err),
        DbError::ConnectTimeout(_) => FailureClass::TransientConnectionLoss,
        DbError::Url(_) => FailureClass::SourceUnavailable,
        DbError::QueryBuild(_) | DbError::Unknown(_) => FailureClass::Other,
    }
}

/// Classification of a failure while reaching a legacy source. Every
/// connection-level problem means the source is unavailable.
pub fn classify_extract_error(err: &DbError) -> FailureClass {
    match classify_db_error(err) {
        FailureClass::TransientConnectionLoss | FailureClass::SourceUnavailable => {
            FailureClass::SourceUnavailable
        }
        other => other,
    }
}

pub fn batch_retry_disposition(err: &DbError) -> RetryDisposition {
    match classify_db_error(err) {
        FailureClass::TransientConnectionLoss => RetryDisposition::Retry,
        _ => RetryDisposition::Stop,
    }
}

fn classify_mysql_error(err: &MySqlError) -> FailureClass {
    match err {
        MySqlError::Io(_) | MySqlError::Driver(_) => FailureClass::TransientConnectionLoss,
        MySqlError::Server(server_err) => {
            classify_mysql_server_error(server_err.code, server_err.state.as_str())
        }
        MySqlError::Url(_) => FailureClass::SourceUnavailable,
        _ => FailureClass::Other,
    }
}

fn classify_mysql_server_error(code: u16, state: &str) -> FailureClass {
    if PERMISSION_CODES.contains(&code) {
        FailureClass::PermissionDenied
    } else if UNAVAILABLE_CODES.contains(&code) {
        FailureClass::SourceUnavailable
    } else if CONNECTION_LOSS_CODES.contains(&code) || state == "08S01" {
        FailureClass::TransientConnectionLoss
    } else if TIMEOUT_CODES.contains(&code) || state == "HYT00" {
        FailureClass::TimeoutFatal
    } else {
        FailureClass::Other
    }
}
