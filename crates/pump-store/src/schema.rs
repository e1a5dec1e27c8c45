//! Schema and migrations

use sqlx::Executor;
use tracing::info;

use crate::{Result, Store};

/// Idempotent schema. Timestamp defaults match the text format sqlx writes
/// for `DateTime<Utc>`.
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS pumps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    price_change_pct REAL NOT NULL,
    time_window_minutes INTEGER NOT NULL DEFAULT 60,
    detected_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f+00:00', 'now')),
    price_at_detection TEXT,
    volume_change_pct REAL,
    market_cap TEXT,
    source TEXT NOT NULL DEFAULT 'coinmarketcap'
);

CREATE INDEX IF NOT EXISTS idx_pumps_symbol_detected ON pumps (symbol, detected_at);
CREATE INDEX IF NOT EXISTS idx_pumps_detected ON pumps (detected_at);

CREATE TABLE IF NOT EXISTS findings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pump_id INTEGER NOT NULL REFERENCES pumps (id) ON DELETE CASCADE,
    source_type TEXT NOT NULL,
    source_url TEXT,
    content TEXT NOT NULL,
    relevance_score REAL NOT NULL DEFAULT 0.5,
    sentiment TEXT NOT NULL DEFAULT 'neutral',
    found_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f+00:00', 'now')),
    UNIQUE (pump_id, content)
);

CREATE INDEX IF NOT EXISTS idx_findings_pump ON findings (pump_id);

CREATE TABLE IF NOT EXISTS news_triggers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pump_id INTEGER NOT NULL UNIQUE REFERENCES pumps (id) ON DELETE CASCADE,
    trigger_type TEXT NOT NULL DEFAULT 'unknown',
    description TEXT NOT NULL DEFAULT '',
    confidence REAL NOT NULL DEFAULT 0.5,
    identified_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f+00:00', 'now'))
);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pump_id INTEGER NOT NULL REFERENCES pumps (id) ON DELETE CASCADE,
    channel TEXT NOT NULL DEFAULT 'telegram',
    message TEXT NOT NULL,
    sent_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f+00:00', 'now')),
    status TEXT NOT NULL DEFAULT 'sent'
);

CREATE INDEX IF NOT EXISTS idx_notifications_pump ON notifications (pump_id);

CREATE TABLE IF NOT EXISTS agent_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT NOT NULL DEFAULT 'queued',
    started_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f+00:00', 'now')),
    completed_at TEXT,
    pumps_detected INTEGER NOT NULL DEFAULT 0,
    findings_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    logs TEXT
);

CREATE INDEX IF NOT EXISTS idx_agent_runs_status ON agent_runs (status);
";

impl Store {
    /// Create missing tables and bring older databases up to date
    pub async fn migrate(&self) -> Result<()> {
        self.pool.execute(SCHEMA).await?;

        // Databases created before run logs were kept lack the column.
        let has_logs: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('agent_runs') WHERE name = 'logs'",
        )
        .fetch_one(&self.pool)
        .await?;

        if has_logs == 0 {
            info!("Adding logs column to agent_runs");
            sqlx::query("ALTER TABLE agent_runs ADD COLUMN logs TEXT")
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn logs_column_count(store: &Store) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('agent_runs') WHERE name = 'logs'",
        )
        .fetch_one(store.pool())
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
        assert_eq!(logs_column_count(&store).await, 1);
    }

    #[tokio::test]
    async fn test_migrate_adds_logs_column() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE agent_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL DEFAULT 'queued',
                started_at TEXT NOT NULL,
                completed_at TEXT,
                pumps_detected INTEGER NOT NULL DEFAULT 0,
                findings_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = Store::from_pool(pool);
        assert_eq!(logs_column_count(&store).await, 0);
        store.migrate().await.unwrap();
        assert_eq!(logs_column_count(&store).await, 1);
    }
}
