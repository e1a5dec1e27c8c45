//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pump_core::{AgentRun, PumpDetail, PumpGroup, Stats};
use pump_store::StoreError;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::worker::{StartOutcome, start_run};

/// Findings embedded per pump in listings
const FINDINGS_PER_PUMP: usize = 5;

const DEFAULT_PUMP_LIMIT: usize = 50;
const DEFAULT_GROUP_LIMIT: usize = 100;
const DEFAULT_RUN_LIMIT: usize = 100;

/// Upper bound for any `limit` query parameter
const MAX_LIMIT: usize = 1000;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database_ok: bool,
    pub agent_runner: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub from: usize,
}

/// Run listing entry
#[derive(Debug, Serialize)]
pub struct RunView {
    #[serde(flatten)]
    pub run: AgentRun,
    pub duration_secs: Option<f64>,
}

impl From<AgentRun> for RunView {
    fn from(run: AgentRun) -> Self {
        let duration_secs = run
            .duration()
            .map(|d| d.num_milliseconds() as f64 / 1000.0);
        Self { run, duration_secs }
    }
}

#[derive(Debug, Serialize)]
pub struct RunStartedResponse {
    pub run_id: i64,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RunBusyResponse {
    pub running: bool,
    pub run_id: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RunLogsResponse {
    pub logs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LiveLogsResponse {
    pub logs: Vec<String>,
    pub index: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub run_id: Option<i64>,
}

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn store_error(e: &StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e.user_message(), "NOT_FOUND"),
        StoreError::AlreadyRunning(_) => {
            api_error(StatusCode::CONFLICT, e.user_message(), "ALREADY_RUNNING")
        }
        StoreError::Invalid(_) | StoreError::InvalidTransition { .. } => {
            api_error(StatusCode::BAD_REQUEST, e.user_message(), "INVALID_REQUEST")
        }
        _ => {
            tracing::error!("Store error: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.user_message(), "DATABASE_ERROR")
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = state.store.ping().await;

    Json(HealthResponse {
        status: if database_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database_ok,
        agent_runner: state.runner.name().to_string(),
    })
}

/// Dashboard counters
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<Stats>> {
    state.store.stats().await.map(Json).map_err(|e| store_error(&e))
}

/// Recent pumps with trigger and top findings
pub async fn list_pumps(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<PumpDetail>>> {
    state
        .store
        .recent_pumps(query.limit_or(DEFAULT_PUMP_LIMIT), FINDINGS_PER_PUMP)
        .await
        .map(Json)
        .map_err(|e| store_error(&e))
}

/// Recent pumps grouped by symbol
pub async fn pump_groups(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<PumpGroup>>> {
    state
        .store
        .pump_groups(query.limit_or(DEFAULT_GROUP_LIMIT), FINDINGS_PER_PUMP)
        .await
        .map(Json)
        .map_err(|e| store_error(&e))
}

/// Run history without logs
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<RunView>>> {
    let runs = state
        .store
        .recent_runs(query.limit_or(DEFAULT_RUN_LIMIT))
        .await
        .map_err(|e| store_error(&e))?;
    Ok(Json(runs.into_iter().map(RunView::from).collect()))
}

/// Trigger a run
pub async fn trigger_run(State(state): State<AppState>) -> ApiResult<Response> {
    match start_run(&state).await {
        Ok(StartOutcome::Started(run_id)) => Ok((
            StatusCode::ACCEPTED,
            Json(RunStartedResponse {
                run_id,
                status: "queued",
            }),
        )
            .into_response()),
        Ok(StartOutcome::AlreadyRunning(run_id)) => Ok((
            StatusCode::CONFLICT,
            Json(RunBusyResponse {
                running: true,
                run_id,
                message: "Agent is already running".into(),
            }),
        )
            .into_response()),
        Err(e) => Err(store_error(&e)),
    }
}

/// Logs of one run; live lines while it is still executing
pub async fn run_logs(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> ApiResult<Json<RunLogsResponse>> {
    if let Some(logs) = state.tracker.run_lines(run_id).await {
        return Ok(Json(RunLogsResponse { logs }));
    }

    match state.store.get_run(run_id).await {
        Ok(run) => Ok(Json(RunLogsResponse {
            logs: run.log_lines(),
        })),
        Err(StoreError::NotFound(_)) => Err(api_error(
            StatusCode::NOT_FOUND,
            "Run not found",
            "NOT_FOUND",
        )),
        Err(e) => Err(store_error(&e)),
    }
}

/// Live log lines since an absolute index
pub async fn live_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<LiveLogsResponse> {
    let (logs, index) = state.tracker.logs_since(query.from).await;
    Json(LiveLogsResponse { logs, index })
}

/// Whether a run is active
pub async fn agent_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let run_id = match state.tracker.active().await {
        Some(id) => Some(id),
        None => state
            .store
            .active_run()
            .await
            .map_err(|e| store_error(&e))?
            .map(|run| run.id),
    };

    Ok(Json(StatusResponse {
        running: run_id.is_some(),
        run_id,
    }))
}
