//! `bonus`: batch runner for the loyalty bonus engine.
//!
//! Loads the registry from a JSON fixture, imports invoice exports, then runs
//! one operation and prints a JSON report on stdout.

mod fixture;
mod run;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use bonus_core::UserId;
use bonus_goals::GoalId;
use bonus_observability::LogFormat;

#[derive(Parser)]
#[command(name = "bonus")]
#[command(about = "Loyalty bonus points: invoice import, accrual, approval and goal evaluation")]
#[command(version)]
struct Cli {
    /// Registry fixture (brands, clients, contracts, goals) as JSON
    #[arg(short, long, env = "BONUS_REGISTRY")]
    registry: PathBuf,

    /// Invoice or credit note exports to import first, in order
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// Field delimiter of the exports
    #[arg(long, default_value = ";")]
    delimiter: char,

    /// Operator recorded on uploads and evaluations (random if omitted)
    #[arg(long)]
    operator: Option<UserId>,

    /// Log format: json or pretty
    #[arg(long, env = "BONUS_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the files and report per-upload results and balances
    Ingest,

    /// Confirm pending points of one month (default: the configured lag)
    Approve {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
        /// Reference date for the default month (default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// List goal periods due for evaluation, optionally evaluating them
    Evaluate {
        /// Evaluation date (default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Only this client number
        #[arg(long)]
        client: Option<String>,
        /// Evaluate every pending period instead of previewing
        #[arg(long)]
        apply: bool,
    },

    /// Project a goal from turnover booked so far
    Project {
        goal: GoalId,
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    bonus_observability::init_with(cli.log_format);

    let delimiter = u8::try_from(cli.delimiter)
        .map_err(|_| anyhow::anyhow!("delimiter must be a single-byte character"))?;
    let session = run::Session::open(&cli.registry, cli.operator.unwrap_or_default())?;
    let uploads = session.import(&cli.files, delimiter)?;

    let report = match cli.command {
        Commands::Ingest => session.ingest_report(uploads)?,
        Commands::Approve { year, month, today } => session.approve(year, month, today)?,
        Commands::Evaluate { today, client, apply } => {
            session.evaluate(today, client.as_deref(), apply)?
        }
        Commands::Project { goal, today } => session.project(goal, today)?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
