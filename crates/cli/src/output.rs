use crate::error::CliError;
use model::sync::run::{RunId, SyncRun, SyncSummary};

pub fn print_run(run: &SyncRun, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(run)?);
    } else {
        print!("{}", run_table(run));
    }
    Ok(())
}

pub fn print_summary(summary: &SyncSummary) {
    println!(
        "Run {} finished: {} processed, {} upserted, {} skipped, {} errors",
        summary.run_id, summary.total_processed, summary.upserted, summary.skipped, summary.errors
    );
}

pub fn print_progress(run: &SyncRun) {
    let total = run
        .total_records
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".to_string());
    let percent = run
        .percent()
        .map(|p| format!(" ({p:.1}%)"))
        .unwrap_or_default();
    println!(
        "{} {}: {}/{}{}, {} errors",
        run.id, run.status, run.processed_records, total, percent, run.error_records
    );
}

pub fn print_swept(runs: &[RunId]) {
    if runs.is_empty() {
        println!("No stale runs");
        return;
    }
    for run in runs {
        println!("Abandoned stale run {run}");
    }
}

fn run_table(run: &SyncRun) -> String {
    let total = run
        .total_records
        .map(|t| t.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    let percent = run
        .percent()
        .map(|p| format!("{p:.1}%"))
        .unwrap_or_else(|| "n/a".to_string());
    let completed = run
        .completed_at
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| "n/a".to_string());

    let mut out = format!("Sync run '{}' ({}):\n", run.id, run.scope_key);
    out.push_str("-----------------------------\n");
    let mut row = |label: &str, value: &dyn std::fmt::Display| {
        out.push_str(&format!("{label:<16} {value}\n"));
    };
    row("Status", &run.status);
    row("Requested by", &run.requester);
    row("Total", &total);
    row("Processed", &run.processed_records);
    row("Progress", &percent);
    row("Upserted", &run.upserted_records);
    row("Skipped", &run.skipped_records);
    row("Errors", &run.error_records);
    row("Affected rows", &run.affected_rows);
    row("Workers", &run.workers);
    row("Started", &run.started_at.to_rfc3339());
    row("Last update", &run.updated_at.to_rfc3339());
    row("Completed", &completed);
    if let Some(message) = &run.error_message {
        row("Error", message);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::sync::run::{ProgressUpdate, SyncStatus};

    #[test]
    fn table_shows_counters_and_error() {
        let mut run = SyncRun::new("ticketing/departures/date=2023-08-31", "ops");
        run.apply(&ProgressUpdate::status(SyncStatus::InProgress).with_total(200))
            .unwrap();
        run.apply(&ProgressUpdate::failed("Legacy source unavailable: refused"))
            .unwrap();

        let table = run_table(&run);
        assert!(table.contains("ticketing/departures/date=2023-08-31"));
        assert!(table.contains("Status           failed"));
        assert!(table.contains("Total            200"));
        assert!(table.contains("Error            Legacy source unavailable: refused"));
    }
}
