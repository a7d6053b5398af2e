#[cfg(test)]
mod tests {
    use crate::{Harness, day, departure, departures, departures_scope, memory::MemorySource, options};
    use engine_core::error::SyncError;
    use engine_runtime::execution::{executor::EngineOptions, workers::WorkerSettings};
    use model::{
        core::value::Value,
        records::row::LegacyRow,
        sync::{
            entity::SyncEntity,
            run::SyncStatus,
            scope::{ScopeFilter, SourceKind, SyncScope},
        },
    };
    use tracing_test::traced_test;

    // Scenario: 1200 departures for one date, batch size 500.
    // Expected Outcome: three batches of 500, 500 and 200 rows, every row upserted
    // and the run completed with its last batch index recorded.
    #[traced_test]
    #[tokio::test]
    async fn full_date_is_synced_in_batches() {
        let harness = Harness::departures(departures(1200));

        let summary = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();
        assert_eq!(summary.total_processed, 1200);
        assert_eq!(summary.upserted, 1200);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.skipped, 0);

        assert_eq!(harness.target.executed(), vec![500, 500, 200]);
        assert_eq!(harness.target.sessions(), 1);
        assert_eq!(harness.target.rows("vremena_polaska").len(), 1200);

        let run = harness.engine.get_sync_status(summary.run_id).await.unwrap();
        assert_eq!(run.status, SyncStatus::Completed);
        assert_eq!(run.total_records, Some(1200));
        assert_eq!(run.processed_records, 1200);
        assert_eq!(run.affected_rows, 1200);
        assert_eq!(run.last_processed_batch_index, Some(2));
        assert_eq!(run.workers, 1);
        assert!(run.completed_at.is_some());
        assert!(run.last_processed_record_key.is_some());
        assert!(logs_contain("Batch upserted"));
    }

    // Scenario: the legacy database refuses connections.
    // Expected Outcome: the run fails before any total is known and nothing
    // reaches the target store.
    #[traced_test]
    #[tokio::test]
    async fn unreachable_source_fails_the_run() {
        let harness = Harness::new(MemorySource::unreachable(), options(500, 5));

        let handle = harness
            .engine
            .start_sync(departures_scope(), "scheduler")
            .await
            .unwrap();
        let run_id = handle.run_id;
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(_)), "{err:?}");

        let run = harness.engine.get_sync_status(run_id).await.unwrap();
        assert_eq!(run.status, SyncStatus::Failed);
        assert_eq!(run.total_records, None);
        assert_eq!(run.processed_records, 0);
        assert!(run.error_message.unwrap().contains("unavailable"));
        assert_eq!(harness.target.calls(), 0);
        assert_eq!(harness.target.sessions(), 0);
    }

    // Scenario: two of 100 rows carry an invalid direction and a zero date.
    // Expected Outcome: the run completes; both rows count as processed errors.
    #[traced_test]
    #[tokio::test]
    async fn malformed_rows_are_counted_not_fatal() {
        let mut rows = departures(100);
        rows[10] = LegacyRow::new()
            .with("id", 11i64)
            .with("datum", "2023-08-31")
            .with("idlinije", "L10")
            .with("smer", 3i64)
            .with("datetime_from", "2023-08-31 05:10:00");
        rows[57] = LegacyRow::new()
            .with("id", 58i64)
            .with("datum", "0000-00-00")
            .with("idlinije", "L57")
            .with("smer", 2i64)
            .with("datetime_from", "2023-08-31 05:57:00");
        let harness = Harness::departures(rows);

        let summary = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();
        assert_eq!(summary.total_processed, 100);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.upserted, 98);
        assert_eq!(harness.target.rows("vremena_polaska").len(), 98);

        let run = harness.engine.get_sync_status(summary.run_id).await.unwrap();
        assert_eq!(run.status, SyncStatus::Completed);
        assert!(logs_contain("Skipping unmappable row"));
    }

    // Scenario: the same scope is synced twice without legacy changes.
    // Expected Outcome: the target content is unchanged. The store still
    // reports every row of the second run as affected because each duplicate
    // rewrites `updated_at`.
    #[traced_test]
    #[tokio::test]
    async fn repeated_sync_leaves_target_unchanged() {
        let harness = Harness::departures(departures(750));

        let first = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();
        let after_first = harness.target.rows("vremena_polaska");

        let second = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(second.upserted, 750);
        assert_eq!(harness.target.rows("vremena_polaska"), after_first);

        let first = harness.engine.get_sync_status(first.run_id).await.unwrap();
        let second = harness.engine.get_sync_status(second.run_id).await.unwrap();
        assert_eq!(first.affected_rows, 750);
        assert_eq!(second.affected_rows, 1500);
        assert_eq!(second.upserted_records, 750);
    }

    // Scenario: a legacy row appears twice in one batch.
    // Expected Outcome: the later occurrence is written, the earlier one skipped.
    #[traced_test]
    #[tokio::test]
    async fn duplicate_keys_in_a_batch_keep_the_last_row() {
        let mut rows = departures(3);
        rows.push(departure(1).with("variation", 4i64));
        let harness = Harness::departures(rows);

        let summary = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();
        assert_eq!(summary.total_processed, 4);
        assert_eq!(summary.upserted, 3);
        assert_eq!(summary.skipped, 1);

        let stored = harness.target.rows("vremena_polaska");
        let variation = SyncEntity::Departures.target().position("variation").unwrap();
        let l1 = stored
            .iter()
            .find(|(key, _)| key.contains("|L1|"))
            .map(|(_, values)| values)
            .unwrap();
        assert_eq!(l1[variation], Value::Int(4));
    }

    // Scenario: the connection drops once while a batch is written.
    // Expected Outcome: the batch is retried and every row is counted once.
    #[traced_test]
    #[tokio::test]
    async fn lost_connection_is_retried_without_double_counting() {
        let harness = Harness::departures(departures(1200));
        harness.target.fail_with(&[2013]);

        let summary = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();
        assert_eq!(summary.upserted, 1200);
        assert_eq!(summary.total_processed, 1200);
        assert_eq!(harness.target.calls(), 4);
        assert_eq!(harness.target.executed(), vec![500, 500, 200]);
        assert!(logs_contain("retrying"));
    }

    // Scenario: the first batch loses its connection twice, then goes through.
    // Expected Outcome: the third attempt succeeds and the batch's rows are
    // counted exactly once.
    #[traced_test]
    #[tokio::test]
    async fn batch_succeeds_on_the_last_attempt() {
        let harness = Harness::departures(departures(1200));
        harness.target.fail_with(&[2013, 2006]);

        let summary = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();
        assert_eq!(summary.upserted, 1200);
        assert_eq!(summary.total_processed, 1200);
        assert_eq!(summary.errors, 0);
        assert_eq!(harness.target.calls(), 5);
        assert_eq!(harness.target.executed(), vec![500, 500, 200]);

        let run = harness.engine.get_sync_status(summary.run_id).await.unwrap();
        assert_eq!(run.affected_rows, 1200);
        assert_eq!(run.error_records, 0);
        assert!(logs_contain("retrying"));
    }

    // Scenario: the same 1200 rows synced with batch sizes around the row
    // count and batch boundaries, by one and by three workers.
    // Expected Outcome: every row reaches exactly one statement, no statement
    // exceeds the batch size and the run accounts for every row.
    #[tokio::test]
    async fn every_batch_size_covers_the_scope() {
        const ROWS: usize = 1200;
        for batch_size in [1, 2, 7, 499, 500, 501, 1200, 1201] {
            for workers in [1, 3] {
                let harness = Harness::new(
                    MemorySource::default()
                        .with_table(SyncEntity::Departures.legacy_table(), departures(ROWS)),
                    EngineOptions {
                        worker: WorkerSettings {
                            workers,
                            batch_size,
                            progress_every: 1000,
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                );

                let summary = harness
                    .engine
                    .run_sync_blocking(departures_scope(), "scheduler")
                    .await
                    .unwrap();
                let case = format!("batch_size={batch_size} workers={workers}");

                let executed = harness.target.executed();
                assert_eq!(executed.iter().sum::<usize>(), ROWS, "{case}");
                assert!(executed.iter().all(|&rows| rows <= batch_size), "{case}");
                if workers == 1 {
                    assert_eq!(executed.len(), ROWS.div_ceil(batch_size), "{case}");
                }

                let run = harness.engine.get_sync_status(summary.run_id).await.unwrap();
                assert_eq!(run.status, SyncStatus::Completed, "{case}");
                assert_eq!(run.total_records, Some(ROWS as u64), "{case}");
                assert_eq!(run.processed_records, ROWS as u64, "{case}");
                assert_eq!(run.upserted_records, ROWS as u64, "{case}");
                assert_eq!(harness.target.rows("vremena_polaska").len(), ROWS, "{case}");
            }
        }
    }

    // Scenario: three workers write progress after every batch.
    // Expected Outcome: the recorded batch position ends at the run's last
    // batch even when a worker owning earlier batches writes after it.
    #[tokio::test]
    async fn batch_position_never_moves_backwards() {
        let harness = Harness::new(
            MemorySource::default()
                .with_table(SyncEntity::Departures.legacy_table(), departures(1200)),
            EngineOptions {
                worker: WorkerSettings {
                    workers: 3,
                    batch_size: 100,
                    progress_every: 1,
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        let summary = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();

        let run = harness.engine.get_sync_status(summary.run_id).await.unwrap();
        assert_eq!(run.workers, 3);
        assert_eq!(run.processed_records, 1200);
        assert_eq!(run.last_processed_batch_index, Some(11));
        assert!(run.last_processed_record_key.unwrap().contains("|L1199|"));
    }

    // Scenario: the connection keeps dropping for one batch.
    // Expected Outcome: once the attempts run out the run fails.
    #[traced_test]
    #[tokio::test]
    async fn exhausted_retries_fail_the_run() {
        let harness = Harness::departures(departures(10));
        harness.target.fail_with(&[2013, 2006, 2013]);

        let handle = harness
            .engine
            .start_sync(departures_scope(), "scheduler")
            .await
            .unwrap();
        let run_id = handle.run_id;
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, SyncError::Fatal(_)), "{err:?}");

        let run = harness.engine.get_sync_status(run_id).await.unwrap();
        assert_eq!(run.status, SyncStatus::Failed);
        assert_eq!(run.total_records, Some(10));
        assert!(run.error_message.unwrap().contains("3 attempts"));
        assert!(harness.target.rows("vremena_polaska").is_empty());
    }

    // Scenario: a lock wait timeout while writing.
    // Expected Outcome: the run fails straight away without retrying.
    #[traced_test]
    #[tokio::test]
    async fn statement_timeout_is_fatal() {
        let harness = Harness::departures(departures(10));
        harness.target.fail_with(&[1205]);

        let err = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::TimeoutFatal(_)), "{err:?}");
        assert_eq!(harness.target.calls(), 1);
    }

    // Scenario: a departure dated 2023-08-31 is synced with a date filter.
    // Expected Outcome: the filter parameter and the stored date are both the
    // same calendar day.
    #[traced_test]
    #[tokio::test]
    async fn dates_keep_their_calendar_day() {
        let harness = Harness::departures(vec![departure(0)]);

        harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();

        let queries = harness.source.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].params, vec![Value::Date(day())]);

        let datum = SyncEntity::Departures.target().position("datum").unwrap();
        let stored = harness.target.rows("vremena_polaska");
        let values = stored.values().next().unwrap();
        assert_eq!(values[datum], Value::Date(day()));
    }

    // Scenario: the legacy table does not exist on the source.
    // Expected Outcome: the run completes with nothing to do.
    #[traced_test]
    #[tokio::test]
    async fn missing_legacy_table_completes_empty() {
        let harness = Harness::new(MemorySource::default(), options(500, 5));

        let summary = harness
            .engine
            .run_sync_blocking(departures_scope(), "scheduler")
            .await
            .unwrap();
        assert_eq!(summary.total_processed, 0);

        let run = harness.engine.get_sync_status(summary.run_id).await.unwrap();
        assert_eq!(run.status, SyncStatus::Completed);
        assert_eq!(run.total_records, Some(0));
        assert_eq!(harness.target.sessions(), 0);
    }

    // Scenario: the same stop is synced from both legacy sources.
    // Expected Outcome: each source fills its own legacy id and leaves the
    // other one in place.
    #[traced_test]
    #[tokio::test]
    async fn stops_keep_both_legacy_ids() {
        let stop = |id: &str| {
            LegacyRow::new()
                .with("unique_id", id)
                .with("station_name", "Trg Republike")
                .with("gpsx", Value::Float(44.81))
                .with("gpsy", Value::Float(20.46))
                .with("date_valid_from", "2024-01-15")
        };
        let source = MemorySource::default()
            .with_table(SyncEntity::Stops.legacy_table(), vec![stop("1043")]);
        let harness = Harness::new(source, options(500, 5));

        for source in [SourceKind::Ticketing, SourceKind::City] {
            let scope = SyncScope::new(source, SyncEntity::Stops, ScopeFilter::All);
            harness.engine.run_sync_blocking(scope, "ops").await.unwrap();
        }

        let table = SyncEntity::Stops.target();
        let stored = harness.target.rows(table.name);
        assert_eq!(stored.len(), 1);
        let values = stored.values().next().unwrap();
        let ticketing = table.position("legacy_ticketing_id").unwrap();
        let city = table.position("legacy_city_id").unwrap();
        assert_eq!(values[ticketing], Value::Int(1043));
        assert_eq!(values[city], Value::Int(1043));

        // No touch column, so an unchanged stop is not an affected row.
        let scope = SyncScope::new(SourceKind::City, SyncEntity::Stops, ScopeFilter::All);
        let again = harness.engine.run_sync_blocking(scope, "ops").await.unwrap();
        let run = harness.engine.get_sync_status(again.run_id).await.unwrap();
        assert_eq!(run.affected_rows, 0);
        assert_eq!(run.upserted_records, 1);
    }

    #[tokio::test]
    async fn invalid_scope_is_rejected_before_a_run_exists() {
        let harness = Harness::departures(departures(1));
        let scope = SyncScope::new(
            SourceKind::Ticketing,
            SyncEntity::Departures,
            ScopeFilter::DateAndLines {
                date: day(),
                lines: Vec::new(),
            },
        );

        let err = harness.engine.start_sync(scope.clone(), "ops").await.err().unwrap();
        assert!(matches!(err, SyncError::InvalidScope(_)));
        assert!(harness.engine.get_last_incomplete_run(&scope).await.unwrap().is_none());
    }
}
