use crate::{
    env::EnvManager,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::Commands;
use engine_config::settings::SyncSettings;
use engine_core::error::SyncError;
use engine_runtime::execution::{
    executor::{SyncEngine, SyncHandle},
    factory,
};
use model::sync::{
    run::{RunId, SyncSummary},
    scope::SourceKind,
};
use std::{path::PathBuf, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "legacy-sync",
    version = "0.1.0",
    about = "Synchronizes legacy ticketing data into the target store"
)]
struct Cli {
    #[arg(long, global = true, help = "Settings file (YAML)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Env file with LEGACY_SYNC_* overrides")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => ExitCode::Success,
        Err(CliError::Sync(SyncError::Cancelled(reason))) => {
            warn!("Sync stopped: {}", reason);
            ExitCode::ShutdownRequested
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let settings = load_settings(cli.config.as_ref(), cli.env_file.as_ref()).await?;
    let wired = factory::create_engine(&settings).await?;

    let result = dispatch(&wired.engine, cli.command).await;
    if let Err(err) = wired.disconnect().await {
        warn!("Failed to close the target pool: {}", err);
    }
    result
}

async fn dispatch(engine: &SyncEngine, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Sync {
            scope,
            requester,
            watch,
        } => {
            let scope = scope.to_scope()?;
            let shutdown = ShutdownCoordinator::new(engine.shutdown_token());
            shutdown.register_handlers();

            let handle = engine.start_sync(scope, &requester).await?;
            info!(run_id = %handle.run_id, "Sync started");
            let summary = match watch {
                Some(secs) => watch_run(engine, handle, Duration::from_secs(secs.max(1))).await?,
                None => handle.wait().await?,
            };
            output::print_summary(&summary);
        }
        Commands::Status { run, json } => {
            let run_id: RunId = run
                .parse()
                .map_err(|_| CliError::InvalidArgument(format!("'{run}' is not a run id")))?;
            let run = engine.get_sync_status(run_id).await?;
            output::print_run(&run, json)?;
        }
        Commands::LastIncomplete { scope, json } => {
            let scope = scope.to_scope()?;
            match engine.get_last_incomplete_run(&scope).await? {
                Some(run) => output::print_run(&run, json)?,
                None => println!("No incomplete run for {scope}"),
            }
        }
        Commands::SweepStale => {
            let swept = engine.sweep_stale_runs().await?;
            output::print_swept(&swept);
        }
        Commands::TestConn { source } => test_connection(engine, &source).await?,
    }

    Ok(())
}

async fn load_settings(
    config: Option<&PathBuf>,
    env_file: Option<&PathBuf>,
) -> Result<SyncSettings, CliError> {
    let mut settings = match config {
        Some(path) => SyncSettings::from_yaml(&tokio::fs::read_to_string(path).await?)?,
        None => SyncSettings::default(),
    };

    let mut env = EnvManager::from_process();
    if let Some(path) = env_file {
        env.load_from_file(path)?;
    }
    settings.apply_overrides(|var| env.get(var))?;
    settings.validate()?;
    Ok(settings)
}

/// Waits for the run while printing its persisted progress on every tick.
async fn watch_run(
    engine: &SyncEngine,
    handle: SyncHandle,
    every: Duration,
) -> Result<SyncSummary, CliError> {
    let run_id = handle.run_id;
    let wait = handle.wait();
    tokio::pin!(wait);

    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            result = &mut wait => return Ok(result?),
            _ = ticker.tick() => {
                let run = engine.get_sync_status(run_id).await?;
                output::print_progress(&run);
            }
        }
    }
}

async fn test_connection(engine: &SyncEngine, source: &str) -> Result<(), CliError> {
    let source: SourceKind = source.parse().map_err(CliError::InvalidArgument)?;
    let conn = engine.check_source(source).await?;
    println!("Connected to {} at {}", source, conn.endpoint());
    Ok(())
}
