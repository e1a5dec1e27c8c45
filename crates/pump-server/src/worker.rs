//! Run Worker
//!
//! Starts agent runs one at a time, tails their output into the live log
//! buffer, and records the outcome.

use std::time::Duration;

use pump_agents::full_prompt;
use pump_core::{LogBuffer, PumpError, RunStats, RunStatus};
use pump_runtime::RunOutcome;
use pump_store::{RunFinish, StoreError};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// Tries at writing a run's final state before failing it outright
const FINISH_ATTEMPTS: u32 = 3;

const FINISH_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Error recorded on an active run that no task in this process is driving
pub const ORPHANED_MESSAGE: &str = "abandoned: no worker was driving this run";

/// Result of asking for a new run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// Run queued and handed to a background task
    Started(i64),

    /// Another run is queued or running
    AlreadyRunning(i64),
}

#[derive(Debug)]
struct TrackerInner {
    active: Option<i64>,

    /// Absolute log index where the active run began
    run_start: usize,

    logs: LogBuffer,
}

/// In-process guard that keeps at most one run active and holds the live
/// log buffer polled by the dashboard
#[derive(Debug)]
pub struct RunTracker {
    inner: Mutex<TrackerInner>,
}

impl RunTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                active: None,
                run_start: 0,
                logs: LogBuffer::new(capacity),
            }),
        }
    }

    /// Id of the run this process is executing
    pub async fn active(&self) -> Option<i64> {
        self.inner.lock().await.active
    }

    pub async fn push(&self, line: impl Into<String>) {
        self.inner.lock().await.logs.push(line);
    }

    /// Live lines from absolute index `from`, plus the next index to poll
    pub async fn logs_since(&self, from: usize) -> (Vec<String>, usize) {
        self.inner.lock().await.logs.since(from)
    }

    /// Retained lines of the active run, if `run_id` is the active one
    pub async fn run_lines(&self, run_id: i64) -> Option<Vec<String>> {
        let inner = self.inner.lock().await;
        (inner.active == Some(run_id)).then(|| inner.logs.since(inner.run_start).0)
    }

    async fn finish(&self, run_id: i64) {
        let mut inner = self.inner.lock().await;
        if inner.active == Some(run_id) {
            inner.active = None;
        }
    }
}

/// Queue a run and execute it in the background, unless one is active
pub async fn start_run(state: &AppState) -> Result<StartOutcome, StoreError> {
    let mut inner = state.tracker.inner.lock().await;
    if let Some(id) = inner.active {
        return Ok(StartOutcome::AlreadyRunning(id));
    }

    let run = match state.store.create_run().await {
        Ok(run) => run,
        Err(StoreError::AlreadyRunning(id)) => {
            // The tracker lock is held and idle, so nothing here owns that row
            warn!(run_id = id, "Failing orphaned run");
            state.store.abandon_run(id, ORPHANED_MESSAGE, None).await?;
            match state.store.create_run().await {
                Ok(run) => run,
                Err(StoreError::AlreadyRunning(id)) => {
                    return Ok(StartOutcome::AlreadyRunning(id));
                }
                Err(e) => return Err(e),
            }
        }
        Err(e) => return Err(e),
    };

    inner.active = Some(run.id);
    inner.run_start = inner.logs.total();
    drop(inner);

    tokio::spawn(execute(state.clone(), run.id));
    Ok(StartOutcome::Started(run.id))
}

/// Lines for one run, mirrored into the shared live buffer
struct RunLog<'a> {
    state: &'a AppState,
    lines: LogBuffer,
}

impl<'a> RunLog<'a> {
    fn new(state: &'a AppState) -> Self {
        Self {
            state,
            lines: LogBuffer::new(state.settings.log_buffer_lines),
        }
    }

    async fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        self.state.tracker.push(line.clone()).await;
        self.lines.push(line);
    }
}

async fn execute(state: AppState, run_id: i64) {
    let mut log = RunLog::new(&state);
    let finish = drive(&state, run_id, &mut log).await;
    let finish = finish.logs(log.lines.joined());

    record_finish(&state, run_id, finish).await;
    state.tracker.finish(run_id).await;
}

/// Write the final state of a run. When that keeps failing, the row is failed
/// directly so it cannot hold the single run slot.
async fn record_finish(state: &AppState, run_id: i64, finish: RunFinish) {
    let mut last_error = None;
    for attempt in 1..=FINISH_ATTEMPTS {
        match state.store.finish_run(run_id, finish.clone()).await {
            Ok(_) => return,
            Err(e @ StoreError::Database(_)) if attempt < FINISH_ATTEMPTS => {
                warn!(run_id, attempt, error = %e, "Retrying run result");
                tokio::time::sleep(FINISH_RETRY_DELAY).await;
            }
            Err(e) => {
                last_error = Some(e);
                break;
            }
        }
    }

    let reason = last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
    error!(run_id, error = %reason, "Failed to record run result");
    let message = format!("Run result could not be recorded: {reason}");
    if let Err(e) = state
        .store
        .abandon_run(run_id, &message, finish.logs.as_deref())
        .await
    {
        error!(run_id, error = %e, "Run is still marked active in the database");
    }
}

async fn drive(state: &AppState, run_id: i64, log: &mut RunLog<'_>) -> RunFinish {
    if let Err(e) = state.store.mark_running(run_id).await {
        error!(run_id, error = %e, "Run could not be started");
        log.push(format!("Error: {e}")).await;
        return RunFinish::new(RunStatus::Failed).error(e.to_string());
    }

    let settings = &state.settings;
    info!(run_id, runner = state.runner.name(), "Agent run started");
    log.push(format!("Starting pump research agent (run #{run_id})")).await;
    log.push(format!("Threshold: {}%", settings.pump_threshold_pct)).await;
    log.push(format!("Time window: {} minutes", settings.pump_time_window_minutes)).await;

    let prompt = full_prompt(settings.pump_threshold_pct, settings.pump_time_window_minutes);
    log.push(format!("Prompt generated ({} bytes)", prompt.len())).await;
    log.push(format!("Starting {}...", state.runner.name())).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = state.runner.clone();
    let handle = tokio::spawn(async move { runner.run(&prompt, tx).await });

    let mut stats = RunStats::default();
    while let Some(line) = rx.recv().await {
        stats.scan_line(&line);
        log.push(line).await;
    }

    let outcome = handle
        .await
        .unwrap_or_else(|e| Err(PumpError::Runner(format!("Runner task failed: {e}"))));
    debug!(run_id, ?stats, "Agent output finished");

    let finish = |status| RunFinish::new(status).counts(stats.pumps_detected, stats.findings_count);
    match outcome {
        Ok(RunOutcome::Exited { success: true, .. }) => {
            log.push("Agent completed successfully").await;
            finish(RunStatus::Completed)
        }
        Ok(RunOutcome::Exited { code, .. }) => {
            let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            let message = format!("Agent exited with code {code}");
            warn!(run_id, "{}", message);
            log.push(message.clone()).await;
            finish(RunStatus::Failed).error(message)
        }
        Ok(RunOutcome::TimedOut { after }) => {
            let message = PumpError::Timeout(after.as_secs()).to_string();
            warn!(run_id, "{}", message);
            log.push(message.clone()).await;
            finish(RunStatus::Timeout).error(message)
        }
        Err(e) => {
            error!(run_id, error = %e, "Agent run failed");
            log.push(format!("Error: {e}")).await;
            finish(RunStatus::Failed).error(e.to_string())
        }
    }
}

/// Start runs periodically. Ticks that find a run active are skipped.
pub fn spawn_scheduler(state: AppState) -> Option<JoinHandle<()>> {
    let period = state.settings.run_schedule?;
    info!(every_secs = period.as_secs(), "Run scheduler enabled");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match start_run(&state).await {
                Ok(StartOutcome::Started(id)) => info!(run_id = id, "Scheduled run started"),
                Ok(StartOutcome::AlreadyRunning(id)) => {
                    info!(run_id = id, "Skipping scheduled run, agent already running");
                }
                Err(e) => error!(error = %e, "Scheduled run could not be queued"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use pump_core::Settings;
    use pump_runtime::AgentRunner;
    use pump_store::Store;
    use tokio::sync::Notify;
    use tokio::sync::mpsc::UnboundedSender;

    /// Runner that blocks until released
    struct GatedRunner {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl AgentRunner for GatedRunner {
        fn name(&self) -> &str {
            "gated"
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn run(
            &self,
            _prompt: &str,
            _lines: UnboundedSender<String>,
        ) -> pump_core::Result<RunOutcome> {
            self.gate.notified().await;
            Ok(RunOutcome::success())
        }
    }

    async fn scheduled_state(run_schedule: Option<Duration>, gate: Arc<Notify>) -> AppState {
        let store = Store::in_memory().await.unwrap();
        let settings = Settings {
            run_schedule,
            ..Settings::default()
        };
        AppState::new(store, Arc::new(GatedRunner { gate }), settings)
    }

    async fn run_count(state: &AppState) -> i64 {
        state.store.stats().await.unwrap().total_runs
    }

    async fn wait_for_runs(state: &AppState, count: i64) {
        for _ in 0..300 {
            if run_count(state).await >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} scheduled runs");
    }

    #[tokio::test]
    async fn test_scheduler_disabled() {
        let state = scheduled_state(None, Arc::new(Notify::new())).await;
        assert!(spawn_scheduler(state).is_none());
    }

    #[tokio::test]
    async fn test_scheduler_skips_ticks_while_running() {
        let gate = Arc::new(Notify::new());
        let state = scheduled_state(Some(Duration::from_millis(200)), gate.clone()).await;
        let handle = spawn_scheduler(state.clone()).unwrap();

        // The immediate first tick does not start a run
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(run_count(&state).await, 0);

        wait_for_runs(&state, 1).await;
        let first = state.tracker.active().await.unwrap();

        // Several ticks pass while the first run is held open
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(run_count(&state).await, 1);
        assert_eq!(state.tracker.active().await, Some(first));

        gate.notify_one();
        wait_for_runs(&state, 2).await;
        let first = state.store.get_run(first).await.unwrap();
        assert_eq!(first.status, RunStatus::Completed);

        handle.abort();
    }

    #[tokio::test]
    async fn test_tracker_logs() {
        let tracker = RunTracker::new(3);
        for i in 0..5 {
            tracker.push(format!("line {i}")).await;
        }
        let (lines, next) = tracker.logs_since(0).await;
        assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(next, 5);
        assert!(tracker.logs_since(5).await.0.is_empty());
        assert!(tracker.active().await.is_none());
    }

    #[tokio::test]
    async fn test_tracker_run_lines() {
        let tracker = RunTracker::new(10);
        tracker.push("previous run").await;
        {
            let mut inner = tracker.inner.lock().await;
            inner.active = Some(4);
            inner.run_start = inner.logs.total();
        }
        tracker.push("current run").await;

        assert_eq!(tracker.run_lines(4).await, Some(vec!["current run".to_string()]));
        assert_eq!(tracker.run_lines(3).await, None);

        tracker.finish(4).await;
        assert!(tracker.active().await.is_none());
        assert_eq!(tracker.run_lines(4).await, None);
    }
}
