use super::SyncSettings;
use crate::error::ConfigError;
use tracing::warn;

pub fn validate(settings: &SyncSettings) -> Result<(), ConfigError> {
    if settings.batch_size == 0 {
        return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
    }
    if settings.workers == 0 {
        return Err(ConfigError::Invalid("workers must be at least 1".into()));
    }
    if settings.progress_every == 0 {
        return Err(ConfigError::Invalid(
            "progress_every must be at least 1".into(),
        ));
    }
    if settings.retry.max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "retry.max_attempts must be at least 1".into(),
        ));
    }
    if settings.retry.max_delay_ms < settings.retry.base_delay_ms {
        return Err(ConfigError::Invalid(format!(
            "retry.max_delay_ms ({}) is below retry.base_delay_ms ({})",
            settings.retry.max_delay_ms, settings.retry.base_delay_ms
        )));
    }
    if let Some(url) = &settings.target_url
        && !url.starts_with("mysql://")
    {
        return Err(ConfigError::Invalid(
            "target_url must be a mysql:// URL".into(),
        ));
    }

    if settings.workers > 1 {
        warn!(
            workers = settings.workers,
            "More than one worker per run is experimental; concurrent bulk writes may destabilize the target store"
        );
    }
    Ok(())
}
