use super::{StateBackend, SyncSettings};
use crate::error::ConfigError;
use std::{path::PathBuf, str::FromStr};
use tracing::debug;

pub const TARGET_URL_VAR: &str = "LEGACY_SYNC_TARGET_URL";
pub const BATCH_SIZE_VAR: &str = "LEGACY_SYNC_BATCH_SIZE";
pub const WORKERS_VAR: &str = "LEGACY_SYNC_WORKERS";
pub const STATE_PATH_VAR: &str = "LEGACY_SYNC_STATE_PATH";

impl SyncSettings {
    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Applies overrides from `lookup`; blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(TARGET_URL_VAR) {
            debug!("Target URL taken from {}", TARGET_URL_VAR);
            self.target_url = Some(url.trim().to_string());
        }
        if let Some(raw) = get(BATCH_SIZE_VAR) {
            self.batch_size = parse(BATCH_SIZE_VAR, &raw)?;
        }
        if let Some(raw) = get(WORKERS_VAR) {
            self.workers = parse(WORKERS_VAR, &raw)?;
        }
        if let Some(path) = get(STATE_PATH_VAR) {
            self.state = StateBackend::Sled {
                path: Some(PathBuf::from(path.trim())),
            };
        }
        Ok(())
    }
}

fn parse<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = SyncSettings::default();
        settings
            .apply_overrides(env(&[
                (TARGET_URL_VAR, "mysql://u:p@target/main"),
                (BATCH_SIZE_VAR, " 200 "),
                (WORKERS_VAR, ""),
                (STATE_PATH_VAR, "/tmp/sync-state"),
            ]))
            .unwrap();

        assert_eq!(settings.target_url.as_deref(), Some("mysql://u:p@target/main"));
        assert_eq!(settings.batch_size, 200);
        assert_eq!(settings.workers, 1);
        assert_eq!(
            settings.state.sled_path(),
            Some(PathBuf::from("/tmp/sync-state"))
        );
    }

    #[test]
    fn malformed_numbers_name_their_variable() {
        let mut settings = SyncSettings::default();
        let err = settings
            .apply_overrides(env(&[(WORKERS_VAR, "two")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: WORKERS_VAR, .. }));
    }
}
