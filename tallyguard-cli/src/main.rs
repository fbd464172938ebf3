//! TallyGuard CLI - Transaction anomaly scanning in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{config, logs, repair, rules, scan, stats};

/// TallyGuard - find anomalies in transaction tables
#[derive(Parser)]
#[command(name = "tg", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a CSV or JSON table for anomalies
    Scan {
        /// Path to the table (reads CSV from stdin when omitted)
        file: Option<PathBuf>,
        /// Settings file to use instead of the TallyGuard directory's
        #[arg(long)]
        config: Option<PathBuf>,
        /// Detection mode (standard, ai, hybrid)
        #[arg(long)]
        mode: Option<String>,
        /// Use a saved AI provider reply instead of calling the API
        #[arg(long)]
        ai_response: Option<PathBuf>,
        /// Hide anomalies below this confidence
        #[arg(long, default_value = "0")]
        min_confidence: f64,
        /// Show at most this many anomalies
        #[arg(long)]
        limit: Option<usize>,
        /// Reference date for the future-date check (YYYY-MM-DD)
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show amount statistics and anomaly counts for a table
    Stats {
        /// Path to the table (reads CSV from stdin when omitted)
        file: Option<PathBuf>,
        /// Settings file to use instead of the TallyGuard directory's
        #[arg(long)]
        config: Option<PathBuf>,
        /// Reference date for the future-date check (YYYY-MM-DD)
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate an anomaly JSON file and repair it if needed
    Repair {
        /// Path to the anomaly list
        file: PathBuf,
        /// Output the repaired list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the transaction-type rules
    Rules {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },

    /// View and manage event logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan {
            file,
            config,
            mode,
            ai_response,
            min_confidence,
            limit,
            today,
            json,
        } => scan::run(scan::ScanArgs {
            file,
            config,
            mode,
            ai_response,
            min_confidence,
            limit,
            today,
            json,
        }),
        Commands::Stats {
            file,
            config,
            today,
            json,
        } => stats::run(file, config, today, json),
        Commands::Repair { file, json } => repair::run(&file, json),
        Commands::Rules { json } => rules::run(json),
        Commands::Config { command } => config::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
