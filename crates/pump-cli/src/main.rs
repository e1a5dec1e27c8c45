//! pump-researcher command line
//!
//! Prints agent prompts, ingests agent output into the database and checks
//! MCP configuration.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Error, or `validate` found missing credentials

mod cli;
mod commands;

use clap::Parser;
use cli::Args;
use pump_core::Settings;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(args.verbose);

    let mut settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Error: {}", e.user_message());
            std::process::exit(1);
        }
    };
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }

    match commands::run(args.command, &settings).await {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("❌ Error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so stdout stays clean for prompts and JSON
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
