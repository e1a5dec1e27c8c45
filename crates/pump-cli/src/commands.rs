//! Subcommand implementations

use std::path::Path;

use anyhow::{Context, Result, bail};
use pump_agents::reporter::ALERT_FINDINGS;
use pump_agents::{
    detection_prompt, format_alert, full_prompt, investigation_prompt, parse_investigation,
    parse_pump_results, telegram_report_prompt,
};
use pump_core::Settings;
use pump_core::mcp::ServiceRegistry;
use pump_store::Store;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::cli::Command;

#[derive(Debug, Serialize)]
pub struct IngestedPump {
    pub id: i64,
    pub symbol: String,
    pub price_change_pct: f64,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct DeletedPump {
    pub pump_id: i64,
    pub symbol: String,
    pub findings_removed: i64,
}

#[derive(Debug, Serialize)]
pub struct IngestedInvestigation {
    pub pump_id: i64,
    pub findings_saved: usize,
    pub trigger_saved: bool,
    pub trigger_type: String,
}

/// Execute one subcommand, returning the process exit code
pub async fn run(command: Command, settings: &Settings) -> Result<i32> {
    match command {
        Command::Prompt {
            threshold,
            window,
            skip_init,
        } => {
            let (threshold, window) = detection_params(settings, threshold, window)?;
            if !skip_init {
                open_store(settings).await?;
            }
            println!("{}", full_prompt(threshold, window));
        }
        Command::DetectPrompt { threshold, window } => {
            let (threshold, window) = detection_params(settings, threshold, window)?;
            println!("{}", detection_prompt(threshold, window));
        }
        Command::InvestigatePrompt {
            symbol,
            price_change_pct,
        } => {
            if symbol.trim().is_empty() {
                bail!("Symbol must not be empty");
            }
            println!("{}", investigation_prompt(&symbol.trim().to_uppercase(), price_change_pct));
        }
        Command::IngestPumps { input, window } => {
            let text = read_input(input.as_deref()).await?;
            let store = open_store(settings).await?;
            let window = window.unwrap_or(settings.pump_time_window_minutes);
            let pumps = ingest_pumps(&store, &text, window).await?;
            println!("{}", serde_json::to_string_pretty(&pumps)?);
        }
        Command::IngestInvestigation { pump_id, input } => {
            let text = read_input(input.as_deref()).await?;
            let store = open_store(settings).await?;
            let saved = ingest_investigation(&store, pump_id, &text).await?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
        Command::ReportPrompt { pump_id, input } => {
            let text = read_input(input.as_deref()).await?;
            let store = open_store(settings).await?;
            println!("{}", report_prompt(&store, pump_id, &text).await?);
        }
        Command::Notify {
            pump_id,
            channel,
            dry_run,
        } => {
            let store = open_store(settings).await?;
            println!("{}", notify(&store, pump_id, &channel, dry_run).await?);
        }
        Command::DeletePump { pump_id } => {
            let store = open_store(settings).await?;
            let summary = delete_pump(&store, pump_id).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Validate => {
            let report = ServiceRegistry::default().validate_env();
            println!("{}", report.render());
            if !report.is_ready() {
                return Ok(1);
            }
        }
        Command::InitDb => {
            open_store(settings).await?;
            println!("✓ Database ready: {}", settings.database_url);
        }
    }
    Ok(0)
}

fn detection_params(
    settings: &Settings,
    threshold: Option<f64>,
    window: Option<u32>,
) -> Result<(f64, u32)> {
    let threshold = threshold.unwrap_or(settings.pump_threshold_pct);
    let window = window.unwrap_or(settings.pump_time_window_minutes);
    if !(threshold.is_finite() && threshold > 0.0) {
        bail!("Threshold must be a positive percentage, got {threshold}");
    }
    if window == 0 {
        bail!("Window must be at least one minute");
    }
    Ok((threshold, window))
}

async fn open_store(settings: &Settings) -> Result<Store> {
    Store::connect(&settings.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", settings.database_url))
}

/// Read a file, or stdin for `-` and no path
pub async fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Record every pump found in detector output
pub async fn ingest_pumps(
    store: &Store,
    text: &str,
    default_window: u32,
) -> Result<Vec<IngestedPump>> {
    let detected = parse_pump_results(text, default_window);
    if detected.is_empty() {
        warn!("No pumps found in detector output");
    }

    let mut recorded = Vec::with_capacity(detected.len());
    for pump in &detected {
        let saved = store
            .record_pump(pump)
            .await
            .with_context(|| format!("Failed to record pump {}", pump.symbol))?;
        debug!(id = saved.id, symbol = %pump.symbol, created = saved.created, "Pump recorded");
        recorded.push(IngestedPump {
            id: saved.id,
            symbol: pump.symbol.clone(),
            price_change_pct: pump.price_change_pct,
            created: saved.created,
        });
    }

    info!(count = recorded.len(), "Ingested detector output");
    Ok(recorded)
}

/// Store findings and trigger from investigator output
pub async fn ingest_investigation(
    store: &Store,
    pump_id: i64,
    text: &str,
) -> Result<IngestedInvestigation> {
    let investigation = parse_investigation(text);
    let saved = store
        .record_investigation(pump_id, &investigation)
        .await
        .with_context(|| format!("Failed to store investigation for pump {pump_id}"))?;

    Ok(IngestedInvestigation {
        pump_id,
        findings_saved: saved.findings_saved,
        trigger_saved: saved.trigger_saved,
        trigger_type: investigation.trigger_type().to_string(),
    })
}

pub async fn report_prompt(store: &Store, pump_id: i64, text: &str) -> Result<String> {
    let pump = store.get_pump(pump_id).await?;
    let investigation = parse_investigation(text);
    Ok(telegram_report_prompt(&pump, &investigation))
}

/// Render the alert for a stored pump and record it unless `dry_run`
pub async fn notify(store: &Store, pump_id: i64, channel: &str, dry_run: bool) -> Result<String> {
    let detail = store.pump_detail(pump_id, ALERT_FINDINGS).await?;
    let message = format_alert(&detail.pump, detail.trigger.as_ref(), &detail.findings);

    if !dry_run {
        let id = store.save_notification(pump_id, channel, &message, "sent").await?;
        info!(notification_id = id, pump_id, channel, "Notification recorded");
    }
    Ok(message)
}

/// Remove a pump with its findings, trigger and notifications
pub async fn delete_pump(store: &Store, pump_id: i64) -> Result<DeletedPump> {
    let pump = store.get_pump(pump_id).await?;
    let findings_removed = store.count_findings(pump_id).await?;
    store.delete_pump(pump_id).await?;

    Ok(DeletedPump {
        pump_id,
        symbol: pump.symbol,
        findings_removed,
    })
}
