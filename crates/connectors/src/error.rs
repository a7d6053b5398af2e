use std::time::Duration;
use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any MySQL driver or server error.
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// A connection URL could not be parsed.
    #[error("Invalid connection URL: {0}")]
    Url(#[from] mysql_async::UrlError),

    /// The server did not accept a connection within the allotted time.
    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A statement could not be assembled.
    #[error("Query build error: {0}")]
    QueryBuild(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DbError {
    /// MySQL server error code, when the server produced one.
    pub fn server_code(&self) -> Option<u16> {
        match self {
            DbError::MySql(mysql_async::Error::Server(err)) => Some(err.code),
            _ => None,
        }
    }

    pub fn server_state(&self) -> Option<&str> {
        match self {
            DbError::MySql(mysql_async::Error::Server(err)) => Some(err.state.as_str()),
            _ => None,
        }
    }
}

/// Errors resolving or opening a legacy source.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("No legacy database registered for subtype '{0}'")]
    NotRegistered(String),

    #[error("Legacy database '{subtype}' is of unsupported type '{engine}'")]
    UnsupportedEngine { subtype: String, engine: String },

    #[error("Credential decryption failed: {0}")]
    Decrypt(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl From<mysql_async::Error> for ConnectorError {
    fn from(err: mysql_async::Error) -> Self {
        ConnectorError::Database(DbError::MySql(err))
    }
}
