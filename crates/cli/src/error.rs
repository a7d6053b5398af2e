use engine_config::error::ConfigError;
use engine_core::error::SyncError;
use engine_runtime::error::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read the settings file: {0}")]
    ConfigFileRead(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid env file: {0}")]
    EnvFile(String),

    #[error("Failed to start the engine: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
