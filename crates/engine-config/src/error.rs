use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating sync settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The settings file is not valid YAML for [`crate::settings::SyncSettings`].
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An environment override holds a value of the wrong shape.
    #[error("Invalid value '{value}' in {var}")]
    Env { var: &'static str, value: String },

    /// A setting is out of its accepted range.
    #[error("Invalid setting: {0}")]
    Invalid(String),
}
