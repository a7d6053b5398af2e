#![allow(dead_code)]

use chrono::NaiveDate;
use connectors::credentials::{EngineType, LegacyConnection, StaticConnectionSupplier};
use engine_core::{progress::ProgressTracker, retry::RetryPolicy, state::sled_store::SledRunStore};
use engine_processing::{extractor::Extractor, upserter::BatchUpserter};
use engine_runtime::execution::{
    executor::{EngineOptions, SyncEngine},
    workers::WorkerSettings,
};
use memory::{MemorySource, MemoryTarget};
use model::{
    records::row::LegacyRow,
    sync::{
        entity::SyncEntity,
        scope::{ScopeFilter, SourceKind, SyncScope},
    },
};
use std::sync::Arc;

pub mod lifecycle;
pub mod memory;
pub mod scenarios;

pub const DAY: (i32, u32, u32) = (2023, 8, 31);

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(DAY.0, DAY.1, DAY.2).expect("valid date")
}

/// Engine wired to in-memory fakes plus handles to inspect them.
pub struct Harness {
    pub engine: SyncEngine,
    pub tracker: ProgressTracker,
    pub source: Arc<MemorySource>,
    pub target: Arc<MemoryTarget>,
}

impl Harness {
    pub fn new(source: MemorySource, options: EngineOptions) -> Self {
        let source = Arc::new(source);
        let target = Arc::new(MemoryTarget::default());
        let tracker = ProgressTracker::new(Arc::new(
            SledRunStore::temporary().expect("temporary run store"),
        ));

        let supplier = StaticConnectionSupplier::default()
            .with(SourceKind::Ticketing, legacy_conn("ticketing"))
            .with(SourceKind::City, legacy_conn("city"));
        let extractor = Extractor::new(Arc::new(supplier), source.clone());
        let upserter = BatchUpserter::new(target.clone(), RetryPolicy::immediate(3));

        Self {
            engine: SyncEngine::new(extractor, upserter, tracker.clone(), options),
            tracker,
            source,
            target,
        }
    }

    pub fn departures(rows: Vec<LegacyRow>) -> Self {
        Self::new(
            MemorySource::default().with_table(SyncEntity::Departures.legacy_table(), rows),
            options(500, 5),
        )
    }
}

pub fn options(batch_size: usize, progress_every: usize) -> EngineOptions {
    EngineOptions {
        worker: WorkerSettings {
            batch_size,
            progress_every,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn legacy_conn(database: &str) -> LegacyConnection {
    LegacyConnection {
        host: "legacy.local".into(),
        port: 3306,
        database: database.into(),
        username: "reader".into(),
        password: "secret".into(),
        engine: EngineType::Mysql,
    }
}

pub fn departures_scope() -> SyncScope {
    SyncScope::new(
        SourceKind::Ticketing,
        SyncEntity::Departures,
        ScopeFilter::Date { date: day() },
    )
}

/// A departure of line `L{n}` leaving at a minute derived from `n`.
pub fn departure(n: usize) -> LegacyRow {
    LegacyRow::new()
        .with("id", n as i64 + 1)
        .with("datum", "2023-08-31")
        .with("idlinije", format!("L{n}"))
        .with("smer", 1i64 + (n % 2) as i64)
        .with("pon", "1")
        .with(
            "datetime_from",
            format!("2023-08-31 {:02}:{:02}:00", 5 + (n / 60) % 18, n % 60),
        )
}

pub fn departures(count: usize) -> Vec<LegacyRow> {
    (0..count).map(departure).collect()
}
