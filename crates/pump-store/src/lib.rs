//! # pump-store
//!
//! SQLite persistence for pumps, findings, triggers, notifications and agent
//! runs.
//!
//! ## Rules enforced here
//!
//! - a symbol detected again within an hour reuses the existing pump
//! - findings of 50 characters or fewer are dropped, duplicates per pump ignored
//! - a pump keeps one trigger, replaced only by a higher confidence
//! - deleting a pump removes everything attached to it
//! - at most one run is queued or running
//!
//! Timestamps are stored as RFC 3339 text in UTC, so they compare correctly
//! as strings. Decimal prices are stored as text.

pub mod error;
mod pumps;
mod runs;
mod schema;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub use error::{Result, StoreError};
pub use pumps::{DEDUPE_WINDOW_MINUTES, InvestigationSaved, RecordedPump};
pub use runs::{INTERRUPTED_MESSAGE, RunFinish};

/// Handle to the research database
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url` and apply the schema
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = is_memory_url(url);

        if let Some(parent) = database_path(url).as_deref().and_then(std::path::Path::parent) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its connection.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self::from_pool(pool);
        store.migrate().await?;
        info!(url, "Database ready");
        Ok(store)
    }

    /// Fresh private in-memory database
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Wrap an existing pool without touching the schema
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether the database answers a trivial query
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// File path named by a sqlite URL, if it names one
fn database_path(url: &str) -> Option<PathBuf> {
    if is_memory_url(url) {
        return None;
    }
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path() {
        assert_eq!(
            database_path("sqlite://data/research.db"),
            Some(PathBuf::from("data/research.db"))
        );
        assert_eq!(
            database_path("sqlite:///var/lib/pump/research.db?mode=rwc"),
            Some(PathBuf::from("/var/lib/pump/research.db"))
        );
        assert_eq!(database_path("sqlite::memory:"), None);
        assert_eq!(database_path("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn test_in_memory_store_is_usable() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.ping().await);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_pumps, 0);
    }

    #[tokio::test]
    async fn test_connect_creates_database_file() {
        let dir = std::env::temp_dir().join(format!("pump-store-test-{}", std::process::id()));
        let file = dir.join("nested").join("research.db");
        let url = format!("sqlite://{}", file.display());

        let store = Store::connect(&url).await.unwrap();
        assert!(store.ping().await);
        store.close().await;
        assert!(file.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
