//! Engine settings: YAML file, then environment overrides, then validation.

use crate::error::ConfigError;
use connectors::{credentials::LegacyConnection, target::SessionTimeouts};
use engine_core::retry::RetryPolicy;
use model::sync::scope::SourceKind;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

pub mod overrides;
pub mod validator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Rows per upsert statement.
    pub batch_size: usize,
    /// Concurrent workers per run. More than one is experimental.
    pub workers: usize,
    /// Write progress every this many batches (and on a worker's last batch).
    pub progress_every: usize,
    /// Pause between two batches of the same worker.
    pub batch_pause_ms: u64,
    /// `in_progress` runs idle for longer are swept to `abandoned`.
    pub stale_after_minutes: u64,
    pub connect_timeout_secs: u64,
    pub retry: RetrySettings,
    pub session: SessionTimeouts,
    /// MySQL URL of the target store.
    pub target_url: Option<String>,
    pub state: StateBackend,
    /// Fixed legacy connections; sources missing here are looked up in the
    /// target store's registry.
    pub legacy_sources: HashMap<SourceKind, LegacyConnection>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            workers: 1,
            progress_every: 5,
            batch_pause_ms: 0,
            stale_after_minutes: 30,
            connect_timeout_secs: 30,
            retry: RetrySettings::default(),
            session: SessionTimeouts::default(),
            target_url: None,
            state: StateBackend::default(),
            legacy_sources: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

/// Where run state is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StateBackend {
    /// `sync_runs` table in the target store.
    Mysql,
    /// Local sled directory; defaults to `~/.legacy-sync/state`.
    Sled {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl Default for StateBackend {
    fn default() -> Self {
        StateBackend::Sled { path: None }
    }
}

impl StateBackend {
    pub fn sled_path(&self) -> Option<PathBuf> {
        match self {
            StateBackend::Mysql => None,
            StateBackend::Sled { path: Some(path) } => Some(path.clone()),
            StateBackend::Sled { path: None } => Some(
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".legacy-sync")
                    .join("state"),
            ),
        }
    }
}

impl SyncSettings {
    /// Reads a YAML file, applies `LEGACY_SYNC_*` environment overrides and validates.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: SyncSettings = serde_yaml::from_str(&content)?;
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = SyncSettings::default();
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let settings: SyncSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validator::validate(self)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_minutes * 60)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
