//! Agent run records

use chrono::Utc;
use pump_core::{AgentRun, RunStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::pumps::sql_limit;
use crate::{Result, Store, StoreError};

/// Error recorded on runs a previous process left unfinished
pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

const RUN_COLUMNS: &str =
    "id, status, started_at, completed_at, pumps_detected, findings_count, error_message, logs";

/// Run listing without the (potentially large) log text
const RUN_SUMMARY_COLUMNS: &str =
    "id, status, started_at, completed_at, pumps_detected, findings_count, error_message, NULL AS logs";

/// Final state written by `Store::finish_run`
#[derive(Clone, Debug)]
pub struct RunFinish {
    pub status: RunStatus,
    pub pumps_detected: i64,
    pub findings_count: i64,
    pub error_message: Option<String>,
    pub logs: Option<String>,
}

impl RunFinish {
    pub const fn new(status: RunStatus) -> Self {
        Self {
            status,
            pumps_detected: 0,
            findings_count: 0,
            error_message: None,
            logs: None,
        }
    }

    #[must_use]
    pub fn counts(mut self, pumps_detected: i64, findings_count: i64) -> Self {
        self.pumps_detected = pumps_detected;
        self.findings_count = findings_count;
        self
    }

    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = Some(logs.into());
        self
    }
}

fn run_from_row(row: &SqliteRow) -> Result<AgentRun> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<RunStatus>()
        .map_err(|e| StoreError::Decode(e.to_string()))?;

    Ok(AgentRun {
        id: row.try_get("id")?,
        status,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        pumps_detected: row.try_get("pumps_detected")?,
        findings_count: row.try_get("findings_count")?,
        error_message: row.try_get("error_message")?,
        logs: row.try_get("logs")?,
    })
}

impl Store {
    /// Queue a new run unless one is already queued or running
    pub async fn create_run(&self) -> Result<AgentRun> {
        let mut tx = self.pool.begin().await?;

        let active: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM agent_runs WHERE status IN ('queued', 'running') ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(id) = active {
            return Err(StoreError::AlreadyRunning(id));
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO agent_runs (status, started_at) VALUES (?, ?) RETURNING id",
        )
        .bind(RunStatus::Queued.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(run_id = id, "Queued agent run");
        self.get_run(id).await
    }

    /// Move a run between statuses, refusing illegal changes
    async fn transition_run(&self, id: i64, to: RunStatus) -> Result<RunStatus> {
        let from = self.get_run(id).await?.status;
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { id, from, to });
        }
        Ok(from)
    }

    /// Mark a queued run as running, resetting its start time
    pub async fn mark_running(&self, id: i64) -> Result<AgentRun> {
        let from = self.transition_run(id, RunStatus::Running).await?;

        let result = sqlx::query(
            "UPDATE agent_runs SET status = ?, started_at = ? WHERE id = ? AND status = ?",
        )
        .bind(RunStatus::Running.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidTransition {
                id,
                from,
                to: RunStatus::Running,
            });
        }

        debug!(run_id = id, "Run started");
        self.get_run(id).await
    }

    /// Write the terminal state of a run
    pub async fn finish_run(&self, id: i64, finish: RunFinish) -> Result<AgentRun> {
        if !finish.status.is_terminal() {
            return Err(StoreError::Invalid(format!(
                "{} is not a final run status",
                finish.status
            )));
        }
        let from = self.transition_run(id, finish.status).await?;

        let result = sqlx::query(
            r"
            UPDATE agent_runs
            SET status = ?, completed_at = ?, pumps_detected = ?, findings_count = ?,
                error_message = ?, logs = ?
            WHERE id = ? AND status = ?
            ",
        )
        .bind(finish.status.as_str())
        .bind(Utc::now())
        .bind(finish.pumps_detected)
        .bind(finish.findings_count)
        .bind(finish.error_message.as_deref())
        .bind(finish.logs.as_deref())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidTransition {
                id,
                from,
                to: finish.status,
            });
        }

        info!(
            run_id = id,
            status = %finish.status,
            pumps = finish.pumps_detected,
            findings = finish.findings_count,
            "Run finished"
        );
        self.get_run(id).await
    }

    /// Fail a run that is still queued or running without validating the
    /// transition. Used when the regular final write could not be made.
    pub async fn abandon_run(&self, id: i64, message: &str, logs: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE agent_runs
            SET status = 'failed', completed_at = ?, error_message = ?, logs = COALESCE(?, logs)
            WHERE id = ? AND status IN ('queued', 'running')
            ",
        )
        .bind(Utc::now())
        .bind(message)
        .bind(logs)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let abandoned = result.rows_affected() > 0;
        if abandoned {
            warn!(run_id = id, message, "Run marked failed");
        }
        Ok(abandoned)
    }

    /// A run including its stored logs
    pub async fn get_run(&self, id: i64) -> Result<AgentRun> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM agent_runs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound("Run".into()))?;
        run_from_row(&row)
    }

    /// Most recent runs, newest first, without logs
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<AgentRun>> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_SUMMARY_COLUMNS} FROM agent_runs ORDER BY id DESC LIMIT ?"
        ))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_from_row).collect()
    }

    /// The queued or running run, if any
    pub async fn active_run(&self) -> Result<Option<AgentRun>> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_SUMMARY_COLUMNS} FROM agent_runs WHERE status IN ('queued', 'running') ORDER BY id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    pub async fn latest_run(&self) -> Result<Option<AgentRun>> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_SUMMARY_COLUMNS} FROM agent_runs ORDER BY id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    /// Fail every run a previous process left queued or running
    pub async fn fail_stale_runs(&self) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE agent_runs
            SET status = 'failed', completed_at = ?, error_message = ?
            WHERE status IN ('queued', 'running')
            ",
        )
        .bind(Utc::now())
        .bind(INTERRUPTED_MESSAGE)
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            warn!(count, "Marked interrupted runs as failed");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = Store::in_memory().await.unwrap();

        let run = store.create_run().await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.completed_at.is_none());

        let run = store.mark_running(run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);

        let finish = RunFinish::new(RunStatus::Completed)
            .counts(3, 11)
            .logs("line one\nline two");
        let run = store.finish_run(run.id, finish).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.pumps_detected, 3);
        assert_eq!(run.findings_count, 11);
        assert!(run.duration().is_some());
        assert_eq!(run.log_lines(), vec!["line one", "line two"]);
    }

    #[tokio::test]
    async fn test_single_active_run() {
        let store = Store::in_memory().await.unwrap();
        let first = store.create_run().await.unwrap();

        let err = store.create_run().await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyRunning(id) if id == first.id));
        assert_eq!(store.active_run().await.unwrap().map(|r| r.id), Some(first.id));

        store
            .finish_run(first.id, RunFinish::new(RunStatus::Failed).error("could not start"))
            .await
            .unwrap();
        assert!(store.active_run().await.unwrap().is_none());
        assert!(store.create_run().await.is_ok());
    }

    #[tokio::test]
    async fn test_terminal_runs_do_not_transition() {
        let store = Store::in_memory().await.unwrap();
        let run = store.create_run().await.unwrap();
        store.mark_running(run.id).await.unwrap();
        store.finish_run(run.id, RunFinish::new(RunStatus::Timeout)).await.unwrap();

        let err = store
            .finish_run(run.id, RunFinish::new(RunStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition { from: RunStatus::Timeout, to: RunStatus::Completed, .. }
        ));
        assert!(store.mark_running(run.id).await.is_err());
    }

    #[tokio::test]
    async fn test_queued_cannot_complete() {
        let store = Store::in_memory().await.unwrap();
        let run = store.create_run().await.unwrap();
        assert!(store.finish_run(run.id, RunFinish::new(RunStatus::Completed)).await.is_err());
        assert!(matches!(
            store.finish_run(run.id, RunFinish::new(RunStatus::Running)).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_runs_omit_logs() {
        let store = Store::in_memory().await.unwrap();
        for _ in 0..3 {
            let run = store.create_run().await.unwrap();
            store.mark_running(run.id).await.unwrap();
            store
                .finish_run(run.id, RunFinish::new(RunStatus::Completed).logs("output"))
                .await
                .unwrap();
        }

        let runs = store.recent_runs(2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].id > runs[1].id);
        assert!(runs.iter().all(|r| r.logs.is_none()));
        assert_eq!(store.get_run(runs[0].id).await.unwrap().logs.as_deref(), Some("output"));
        assert_eq!(store.latest_run().await.unwrap().map(|r| r.id), Some(runs[0].id));
        assert_eq!(store.stats().await.unwrap().total_runs, 3);
    }

    #[tokio::test]
    async fn test_fail_stale_runs() {
        let store = Store::in_memory().await.unwrap();
        let run = store.create_run().await.unwrap();
        store.mark_running(run.id).await.unwrap();

        assert_eq!(store.fail_stale_runs().await.unwrap(), 1);
        let run = store.get_run(run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert_eq!(store.fail_stale_runs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_abandon_run() {
        let store = Store::in_memory().await.unwrap();
        let run = store.create_run().await.unwrap();
        store.mark_running(run.id).await.unwrap();

        assert!(store.abandon_run(run.id, "result lost", Some("partial")).await.unwrap());
        let run = store.get_run(run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("result lost"));
        assert_eq!(run.logs.as_deref(), Some("partial"));
        assert!(run.completed_at.is_some());

        // Terminal runs are left alone
        assert!(!store.abandon_run(run.id, "again", None).await.unwrap());
        assert_eq!(
            store.get_run(run.id).await.unwrap().error_message.as_deref(),
            Some("result lost")
        );
        assert!(store.active_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_run() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.get_run(7).await.unwrap_err().is_not_found());
    }
}
