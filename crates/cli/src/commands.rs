use crate::error::CliError;
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use model::sync::{
    entity::SyncEntity,
    scope::{ScopeFilter, SourceKind, SyncScope},
};

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize one scope and wait for the run to finish
    Sync {
        #[command(flatten)]
        scope: ScopeArgs,

        #[arg(long, default_value = "cli", help = "Who requested the run")]
        requester: String,

        #[arg(
            long,
            value_name = "SECS",
            help = "Print the run's progress every SECS seconds while it runs"
        )]
        watch: Option<u64>,
    },
    /// Show the persisted state of a run
    Status {
        #[arg(long, help = "Run ID to inspect")]
        run: String,

        #[arg(long, help = "Print the run as JSON instead of a table")]
        json: bool,
    },
    /// Show the latest unfinished run of a scope
    LastIncomplete {
        #[command(flatten)]
        scope: ScopeArgs,

        #[arg(long, help = "Print the run as JSON instead of a table")]
        json: bool,
    },
    /// Abandon in-progress runs that stopped reporting progress
    SweepStale,
    /// Resolve a legacy source and open a connection to it
    TestConn {
        /// Legacy source: "ticketing" or "city"
        #[arg(long)]
        source: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Legacy source: "ticketing" or "city"
    #[arg(long)]
    pub source: String,

    /// Entity to synchronize, e.g. "departures" or "shift-groups"
    #[arg(long)]
    pub entity: String,

    /// Restrict to one calendar day (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Restrict a dated scope to these lines (comma separated)
    #[arg(long, value_delimiter = ',', requires = "date")]
    pub lines: Vec<String>,

    /// Restrict to one shift group
    #[arg(long, conflicts_with = "date")]
    pub group: Option<i64>,
}

impl ScopeArgs {
    pub fn to_scope(&self) -> Result<SyncScope, CliError> {
        let source: SourceKind = self.source.parse().map_err(CliError::InvalidArgument)?;
        let entity: SyncEntity = self.entity.parse().map_err(CliError::InvalidArgument)?;

        let filter = match (&self.date, self.group) {
            (Some(_), Some(_)) => {
                return Err(CliError::InvalidArgument(
                    "--date and --group cannot be combined".into(),
                ));
            }
            (Some(date), None) => {
                let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
                    CliError::InvalidArgument(format!("'{date}' is not a YYYY-MM-DD date"))
                })?;
                if self.lines.is_empty() {
                    ScopeFilter::Date { date }
                } else {
                    ScopeFilter::DateAndLines {
                        date,
                        lines: self.lines.clone(),
                    }
                }
            }
            (None, Some(group_id)) => ScopeFilter::Group { group_id },
            (None, None) => ScopeFilter::All,
        };

        let scope = SyncScope::new(source, entity, filter);
        scope
            .validate()
            .map_err(|err| CliError::InvalidArgument(err.to_string()))?;
        Ok(scope)
    }
}
