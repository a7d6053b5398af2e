#[cfg(test)]
mod tests {
    use crate::{Harness, departures, departures_scope, memory::MemorySource, options};
    use engine_core::error::SyncError;
    use engine_runtime::execution::executor::EngineOptions;
    use model::sync::{entity::SyncEntity, run::ProgressUpdate, run::SyncStatus, scope::SourceKind};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn harness(rows: usize, batch_size: usize, progress_every: usize) -> Harness {
        Harness::new(
            MemorySource::default()
                .with_table(SyncEntity::Departures.legacy_table(), departures(rows)),
            options(batch_size, progress_every),
        )
    }

    // Scenario: a second request for the same scope arrives while the first run
    // is still writing.
    // Expected Outcome: the first run is abandoned and stops at its next batch
    // boundary; the second run completes the whole scope.
    #[traced_test]
    #[tokio::test]
    async fn newer_request_supersedes_running_sync() {
        let harness = harness(3, 1, 1);
        let mut gate = harness.target.gate();

        let first = harness
            .engine
            .start_sync(departures_scope(), "scheduler")
            .await
            .unwrap();
        let first_id = first.run_id;
        gate.entered().await;

        let running = harness.engine.get_sync_status(first_id).await.unwrap();
        assert_eq!(running.status, SyncStatus::InProgress);
        assert_eq!(running.total_records, Some(3));
        assert_eq!(harness.engine.active_runs(), vec![first_id]);

        let second = harness
            .engine
            .start_sync(departures_scope(), "operator")
            .await
            .unwrap();
        gate.release();

        let err = first.wait().await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled(_)), "{err:?}");
        let summary = second.wait().await.unwrap();
        assert_eq!(summary.total_processed, 3);
        assert_eq!(summary.upserted, 3);

        let abandoned = harness.engine.get_sync_status(first_id).await.unwrap();
        assert_eq!(abandoned.status, SyncStatus::Abandoned);
        assert!(abandoned.error_message.unwrap().contains("'operator'"));
        assert!(abandoned.processed_records < 3);

        let done = harness.engine.get_sync_status(summary.run_id).await.unwrap();
        assert_eq!(done.status, SyncStatus::Completed);
        assert_eq!(harness.target.rows("vremena_polaska").len(), 3);
        assert!(
            harness
                .engine
                .get_last_incomplete_run(&departures_scope())
                .await
                .unwrap()
                .is_none()
        );
        assert!(logs_contain("Abandoned incomplete sync run"));
    }

    // Scenario: two requests for the same scope arrive back to back, so the
    // first run is superseded before it leaves `pending`.
    // Expected Outcome: the first run ends as cancelled, not failed, without
    // touching the target; the second run completes the whole scope.
    #[traced_test]
    #[tokio::test]
    async fn pending_run_superseded_before_it_starts() {
        let harness = harness(3, 1, 1);

        let first = harness
            .engine
            .start_sync(departures_scope(), "scheduler")
            .await
            .unwrap();
        let first_id = first.run_id;
        let second = harness
            .engine
            .start_sync(departures_scope(), "operator")
            .await
            .unwrap();

        let err = first.wait().await.unwrap_err();
        assert!(matches!(&err, SyncError::Cancelled(reason) if reason == "abandoned"), "{err:?}");
        let summary = second.wait().await.unwrap();
        assert_eq!(summary.upserted, 3);

        let abandoned = harness.engine.get_sync_status(first_id).await.unwrap();
        assert_eq!(abandoned.status, SyncStatus::Abandoned);
        assert_eq!(abandoned.total_records, None);
        assert_eq!(abandoned.processed_records, 0);
        assert!(abandoned.error_message.unwrap().contains("'operator'"));

        assert_eq!(harness.target.executed(), vec![1, 1, 1]);
        assert!(harness.engine.active_runs().is_empty());
        assert!(logs_contain("abandoned before it finished"));
        assert!(!logs_contain("Sync run failed"));
    }

    // Scenario: the process shuts down while a batch is in flight.
    // Expected Outcome: the batch finishes, no further batch starts and the run
    // is recorded as failed with a cancellation message.
    #[traced_test]
    #[tokio::test]
    async fn shutdown_stops_at_batch_boundary() {
        let harness = harness(3, 1, 5);
        let mut gate = harness.target.gate();

        let handle = harness
            .engine
            .start_sync(departures_scope(), "scheduler")
            .await
            .unwrap();
        let run_id = handle.run_id;
        gate.entered().await;
        harness.engine.shutdown();
        gate.release();

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled(_)), "{err:?}");
        assert_eq!(harness.target.executed(), vec![1]);

        let run = harness.engine.get_sync_status(run_id).await.unwrap();
        assert_eq!(run.status, SyncStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("cancelled"));
        assert!(harness.engine.active_runs().is_empty());
    }

    // Scenario: an in-progress run stopped writing progress long ago.
    // Expected Outcome: the sweep abandons it and leaves finished runs alone.
    #[traced_test]
    #[tokio::test]
    async fn stale_runs_are_swept() {
        let harness = Harness::new(
            MemorySource::default(),
            EngineOptions {
                stale_after: Duration::ZERO,
                ..options(500, 5)
            },
        );
        let tracker = &harness.tracker;

        let stuck = tracker.create_run(&departures_scope(), "scheduler").await.unwrap();
        tracker
            .update_progress(stuck.id, ProgressUpdate::status(SyncStatus::InProgress))
            .await
            .unwrap();

        let finished = tracker.create_run(&departures_scope(), "scheduler").await.unwrap();
        tracker
            .update_progress(finished.id, ProgressUpdate::status(SyncStatus::InProgress))
            .await
            .unwrap();
        tracker
            .update_progress(finished.id, ProgressUpdate::status(SyncStatus::Completed))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let swept = harness.engine.sweep_stale_runs().await.unwrap();
        assert_eq!(swept, vec![stuck.id]);

        let stuck = harness.engine.get_sync_status(stuck.id).await.unwrap();
        assert_eq!(stuck.status, SyncStatus::Abandoned);
        assert!(stuck.error_message.unwrap().contains("no progress since"));
        let finished = harness.engine.get_sync_status(finished.id).await.unwrap();
        assert_eq!(finished.status, SyncStatus::Completed);
        assert!(logs_contain("Swept stale sync run"));
    }

    #[tokio::test]
    async fn recent_runs_survive_the_sweep() {
        let harness = harness(0, 500, 5);
        let run = harness
            .tracker
            .create_run(&departures_scope(), "scheduler")
            .await
            .unwrap();
        harness
            .tracker
            .update_progress(run.id, ProgressUpdate::status(SyncStatus::InProgress))
            .await
            .unwrap();

        assert!(harness.engine.sweep_stale_runs().await.unwrap().is_empty());
        let run = harness.engine.get_sync_status(run.id).await.unwrap();
        assert_eq!(run.status, SyncStatus::InProgress);
    }

    #[tokio::test]
    async fn source_check_resolves_and_connects() {
        let harness = harness(0, 500, 5);
        let conn = harness.engine.check_source(SourceKind::City).await.unwrap();
        assert_eq!(conn.endpoint(), "legacy.local:3306/city");

        let harness = Harness::new(MemorySource::unreachable(), options(500, 5));
        let err = harness
            .engine
            .check_source(SourceKind::Ticketing)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unknown_runs_are_reported() {
        let harness = harness(0, 500, 5);
        let err = harness
            .engine
            .get_sync_status(model::sync::run::RunId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Store(_)), "{err:?}");
    }
}
