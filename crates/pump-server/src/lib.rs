//! # pump-server
//!
//! HTTP API for the pump researcher dashboard, plus the worker that runs the
//! agent in the background.

pub mod handlers;
pub mod state;
pub mod worker;

use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::handlers::{
    agent_status, health_check, list_pumps, list_runs, live_logs, pump_groups, run_logs, stats,
    trigger_run,
};

pub use state::AppState;
pub use worker::{ORPHANED_MESSAGE, RunTracker, StartOutcome, spawn_scheduler, start_run};

/// Build the application router. Paths outside the API are served from the
/// configured static directory.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_files = ServeDir::new(&state.settings.static_dir);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Dashboard data
        .route("/api/stats", get(stats))
        .route("/api/pumps", get(list_pumps))
        .route("/api/pumps/groups", get(pump_groups))

        // Agent runs
        .route("/api/runs", get(list_runs).post(trigger_run))
        .route("/api/runs/{id}/logs", get(run_logs))
        .route("/api/logs", get(live_logs))
        .route("/api/status", get(agent_status))

        // Static dashboard
        .fallback_service(static_files)

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
