use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use wakasync::cli::sync::SyncTarget;
use wakasync::cli::{stats, status, sync};
use wakasync::config::Config;
use wakasync::model::StatKind;
use wakasync::store::Store;
use wakasync::sync::{parse_date, Syncer};
use wakasync::upstream::WakaTimeClient;

#[derive(Parser)]
#[command(name = "wakasync")]
#[command(about = "Sync WakaTime coding activity into a local SQLite database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "wakasync.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync activity (yesterday by default)
    Sync {
        /// Sync the last N days ending yesterday
        #[arg(long, conflicts_with_all = ["date", "start", "end"])]
        days: Option<u32>,

        /// Sync a single day (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["start", "end"])]
        date: Option<String>,

        /// First day of a range (YYYY-MM-DD)
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Last day of a range (YYYY-MM-DD)
        #[arg(long, requires = "start")]
        end: Option<String>,
    },

    /// Sync and list projects
    Projects {
        /// Filter by name
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Show what is stored for a day (latest synced day by default)
    Status {
        #[arg(long)]
        date: Option<String>,
    },

    /// Totals per name across a date range
    Stats {
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// category, language, editor, os, project, dependency or machine
        #[arg(short, long, default_value = "language")]
        kind: String,
    },

    /// Daily totals with project breakdown
    Daily {
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,
    },

    /// Years with recorded activity
    Years,

    /// Activity calendar of one year
    Activity { year: i32 },

    /// Run the daily sync scheduler until interrupted
    Daemon,

    /// Sync everything from the configured start date through yesterday
    Backfill,
}

fn main() -> Result<()> {
    // LOG_FORMAT=json for machine-readable logs, human-readable otherwise
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").unwrap_or_default() == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    // Load config
    let config = Config::load(&cli.config).context("Failed to load config")?;

    // Initialize store
    let db_path = config.database_path();
    let store = Arc::new(
        Store::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );

    let syncer = || -> Result<Syncer<WakaTimeClient>> {
        let client = WakaTimeClient::from_config(&config.upstream)
            .context("Set upstream.api_key or WAKATIME_API_KEY")?;
        Ok(Syncer::new(Arc::clone(&store), client))
    };

    match cli.command {
        Commands::Sync {
            days,
            date,
            start,
            end,
        } => {
            let target = match (days, date, start, end) {
                (Some(days), _, _, _) => SyncTarget::Days(days),
                (_, Some(date), _, _) => SyncTarget::Date(parse_date(&date)?),
                (_, _, Some(start), Some(end)) => {
                    SyncTarget::Range(parse_date(&start)?, parse_date(&end)?)
                }
                _ => SyncTarget::Days(1),
            };
            sync::run(&syncer()?, target)?;
        }
        Commands::Projects { query } => {
            sync::projects(&syncer()?, query)?;
        }
        Commands::Status { date } => {
            let date = date.as_deref().map(parse_date).transpose()?;
            status::run(&store, date)?;
        }
        Commands::Stats { start, end, kind } => {
            let kind: StatKind = kind.parse()?;
            stats::stats(&store, parse_date(&start)?, parse_date(&end)?, kind)?;
        }
        Commands::Daily { start, end } => {
            stats::daily(&store, parse_date(&start)?, parse_date(&end)?)?;
        }
        Commands::Years => {
            stats::years(&store)?;
        }
        Commands::Activity { year } => {
            stats::activity(&store, year)?;
        }
        Commands::Daemon => {
            sync::daemon(Arc::new(syncer()?), config.schedule()?)?;
        }
        Commands::Backfill => {
            sync::backfill(&syncer()?, config.start_date()?)?;
        }
    }

    Ok(())
}
