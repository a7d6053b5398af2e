use connectors::error::DbError;
use engine_config::error::ConfigError;
use engine_core::error::{StoreError, SyncError};
use thiserror::Error;

/// Errors assembling a [`crate::execution::executor::SyncEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Run state error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}
