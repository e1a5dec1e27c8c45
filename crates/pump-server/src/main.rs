//! pump-researcher HTTP Server
//!
//! Serves the dashboard API and runs the research agent on demand and on a
//! schedule.

use std::sync::Arc;

use pump_core::Settings;
use pump_core::mcp::ServiceRegistry;
use pump_runtime::ClaudeCliRunner;
use pump_server::{AppState, router, spawn_scheduler};
use pump_store::Store;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    // Database
    let store = Store::connect(&settings.database_url).await?;
    let stale = store.fail_stale_runs().await?;
    if stale > 0 {
        tracing::warn!("⚠ Marked {} interrupted run(s) as failed", stale);
    }

    // Agent runner
    let runner = Arc::new(ClaudeCliRunner::from_settings(&settings));
    if runner.check_availability().await {
        tracing::info!("✓ Agent CLI available");
    } else {
        tracing::warn!("⚠ Agent CLI not available - runs will fail");
        tracing::warn!("  Set AGENT_CLI_PATH (and AGENT_CLI_ARGS) in .env");
    }

    // MCP credentials
    let report = ServiceRegistry::default().validate_env();
    if report.is_ready() {
        tracing::info!("✓ MCP services configured");
    } else {
        tracing::warn!("⚠ MCP configuration incomplete - run `pump-researcher validate`");
    }
    for warning in report.warnings() {
        tracing::warn!("  {}", warning);
    }

    let addr = settings.bind_addr.clone();
    let schedule = settings.run_schedule;
    let state = AppState::new(store, runner, settings);
    if spawn_scheduler(state.clone()).is_none() {
        tracing::info!("Run scheduler disabled");
    }

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 pump-researcher server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health             - Health check");
    tracing::info!("  GET  /api/stats          - Totals");
    tracing::info!("  GET  /api/pumps          - Recent pumps");
    tracing::info!("  GET  /api/pumps/groups   - Pumps grouped by symbol");
    tracing::info!("  GET  /api/runs           - Run history");
    tracing::info!("  POST /api/runs           - Start a run");
    tracing::info!("  GET  /api/runs/{{id}}/logs - Logs of one run");
    tracing::info!("  GET  /api/logs?from=N    - Live log tail");
    tracing::info!("  GET  /api/status         - Agent status");
    if let Some(every) = schedule {
        tracing::info!("");
        tracing::info!("Scheduled runs every {} seconds", every.as_secs());
    }
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
