use crate::{
    error::EngineError,
    execution::{
        executor::{EngineOptions, SyncEngine},
        workers::WorkerSettings,
    },
};
use connectors::{
    credentials::{
        ChainedConnectionSupplier, ConnectionSupplier, PlaintextPasswords,
        RegistryConnectionSupplier, StaticConnectionSupplier,
    },
    sql::mysql::{source::MySqlLegacySource, target::MySqlTarget},
};
use engine_config::settings::{StateBackend, SyncSettings};
use engine_core::{
    progress::ProgressTracker,
    state::{RunStore, mysql_store::MySqlRunStore, sled_store::SledRunStore},
};
use engine_processing::{extractor::Extractor, upserter::BatchUpserter};
use std::sync::Arc;
use tracing::info;

/// Engine wired against a MySQL target, together with the pool it shares.
pub struct MySqlEngine {
    pub engine: SyncEngine,
    target: MySqlTarget,
}

impl MySqlEngine {
    /// Drains the target pool. Call once no run is in flight.
    pub async fn disconnect(self) -> Result<(), EngineError> {
        drop(self.engine);
        self.target.disconnect().await?;
        Ok(())
    }
}

pub fn engine_options(settings: &SyncSettings) -> EngineOptions {
    EngineOptions {
        worker: WorkerSettings {
            workers: settings.workers,
            batch_size: settings.batch_size,
            progress_every: settings.progress_every,
            batch_pause: settings.batch_pause(),
        },
        session: settings.session,
        stale_after: settings.stale_after(),
    }
}

/// Wires a MySQL-backed engine from validated settings.
pub async fn create_engine(settings: &SyncSettings) -> Result<MySqlEngine, EngineError> {
    let url = settings
        .target_url
        .as_deref()
        .ok_or_else(|| EngineError::Initialization("target_url is not configured".into()))?;
    let target = MySqlTarget::connect(url, settings.session)?;
    let pool = target.pool().clone();

    let store = create_store(settings, &target).await?;
    let tracker = ProgressTracker::new(store);

    let registry: Arc<dyn ConnectionSupplier> = Arc::new(RegistryConnectionSupplier::new(
        pool,
        Arc::new(PlaintextPasswords),
    ));
    let supplier: Arc<dyn ConnectionSupplier> = if settings.legacy_sources.is_empty() {
        registry
    } else {
        let fixed = StaticConnectionSupplier::new(settings.legacy_sources.clone());
        Arc::new(ChainedConnectionSupplier::new(Arc::new(fixed), registry))
    };

    let extractor = Extractor::new(
        supplier,
        Arc::new(MySqlLegacySource::new(settings.connect_timeout())),
    );
    let upserter = BatchUpserter::new(Arc::new(target.clone()), settings.retry_policy());

    Ok(MySqlEngine {
        engine: SyncEngine::new(extractor, upserter, tracker, engine_options(settings)),
        target,
    })
}

async fn create_store(
    settings: &SyncSettings,
    target: &MySqlTarget,
) -> Result<Arc<dyn RunStore>, EngineError> {
    match &settings.state {
        StateBackend::Mysql => {
            let store = MySqlRunStore::new(target.pool().clone());
            store.ensure_table().await?;
            info!("Run state kept in the target store");
            Ok(Arc::new(store))
        }
        backend @ StateBackend::Sled { .. } => {
            let path = backend.sled_path().ok_or_else(|| {
                EngineError::Initialization("could not determine state directory".into())
            })?;
            info!(path = %path.display(), "Run state kept in local sled store");
            Ok(Arc::new(SledRunStore::open(path)?))
        }
    }
}
