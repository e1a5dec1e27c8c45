//! Command-line interface argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pump-researcher - find crypto pumps and the news behind them
///
/// Prints the prompts the research agent runs with, stores what the agent
/// reports back, and checks that the MCP services it needs are configured.
///
/// Examples:
///   pump-researcher prompt --threshold 7.5 | claude -p --allowedTools 'mcp__*'
///   pump-researcher ingest-pumps detector.json
///   claude -p "$(pump-researcher investigate-prompt PEPE 14.2)" | pump-researcher ingest-investigation --pump-id 3
///   pump-researcher validate
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Database connection string
    #[arg(long, global = true, env = "DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Initialize the database and print the full orchestrator prompt
    Prompt {
        /// Minimum price change in percent
        #[arg(long, value_name = "PCT")]
        threshold: Option<f64>,

        /// Detection window in minutes
        #[arg(long, value_name = "MINUTES")]
        window: Option<u32>,

        /// Do not touch the database
        #[arg(long)]
        skip_init: bool,
    },

    /// Print the pump detection prompt
    DetectPrompt {
        #[arg(long, value_name = "PCT")]
        threshold: Option<f64>,

        #[arg(long, value_name = "MINUTES")]
        window: Option<u32>,
    },

    /// Print the investigation prompt for one symbol
    InvestigatePrompt {
        symbol: String,

        /// Observed price change in percent
        #[arg(allow_negative_numbers = true)]
        price_change_pct: f64,
    },

    /// Record pumps from detector output (file or stdin)
    IngestPumps {
        /// Detector output; `-` or nothing reads stdin
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Window recorded for pumps that omit one
        #[arg(long, value_name = "MINUTES")]
        window: Option<u32>,
    },

    /// Store findings and trigger from investigator output (file or stdin)
    IngestInvestigation {
        #[arg(long)]
        pump_id: i64,

        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Print the prompt asking the agent to send a Telegram alert
    ReportPrompt {
        #[arg(long)]
        pump_id: i64,

        /// Investigator output; `-` or nothing reads stdin
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Render the alert for a stored pump and record it as a notification
    Notify {
        #[arg(long)]
        pump_id: i64,

        #[arg(long, default_value = "telegram")]
        channel: String,

        /// Print the alert without recording it
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete a pump with its findings, trigger and notifications
    DeletePump {
        #[arg(long)]
        pump_id: i64,
    },

    /// Check MCP credentials; exits with 1 when not ready
    Validate,

    /// Create or migrate the database schema
    InitDb,
}
