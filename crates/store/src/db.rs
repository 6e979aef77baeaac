//! The shared SQLite pool.

use crate::error::{DatabaseResultExt, ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Pragmas the connect options have no setter for. Run on every pooled
/// connection, not just the first.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA temp_store = MEMORY;
    PRAGMA cache_size = -32768;
    PRAGMA wal_autocheckpoint = 1000;
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// How long a statement waits on a locked database before failing with
    /// [`ErrorKind::Busy`].
    pub busy_timeout: Duration,
}
impl Default for PoolSettings {
    fn default() -> Self {
        Self { max_connections: 5, busy_timeout: Duration::from_millis(5000) }
    }
}

/// Pool shared by the engine, the query layer and the repositories.
/// Migrations are applied before a `Database` is handed out.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, PoolSettings::default()).await
    }

    /// Open (creating if needed) the database file at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect_with(path: impl AsRef<Path>, settings: PoolSettings) -> Result<Self> {
        let options = options(settings.busy_timeout).filename(path.as_ref()).create_if_missing(true);
        Self::open(options, settings.max_connections.max(1)).await
    }

    /// A private in-memory database, for tests in this and other crates.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool
    /// is capped at one connection.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = options(PoolSettings::default().busy_timeout).filename(":memory:");
        Self::open(options, 1).await
    }

    async fn open(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .after_connect(|conn, meta| Box::pin(on_connect(conn, meta)))
            .connect_with(options)
            .await
            .or_database()?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)?;
        debug!("migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for checked-out connections to come back, then close them all.
    pub async fn close(&self) {
        // Best effort: refreshes planner statistics for the exclusion indexes.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

fn options(busy_timeout: Duration) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        // Listings keep reading while a recompute holds the write lock.
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(busy_timeout)
        // Exclusion rows churn on every recompute; freed pages get reused.
        .auto_vacuum(SqliteAutoVacuum::None)
}

async fn on_connect(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
    sqlx::query(CONNECTION_PRAGMAS).execute(conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::connect_in_memory().await.unwrap();
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('exclusions', 'visibility_stats', 'deferred_recomputes')",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, 3);
        // Already applied: a second run is a no-op.
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[rstest]
    #[case("PRAGMA foreign_keys", 1)]
    #[case("PRAGMA wal_autocheckpoint", 1000)]
    #[case("PRAGMA temp_store", 2)]
    #[tokio::test]
    async fn test_pragmas(#[case] pragma: &str, #[case] expected: i64) {
        let db = Database::connect_in_memory().await.unwrap();
        let value: i64 = sqlx::query_scalar(pragma).fetch_one(db.pool()).await.unwrap();
        assert_eq!(value, expected);
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("veil.db");
        let db = Database::connect_with(&path, PoolSettings { max_connections: 2, ..Default::default() })
            .await
            .unwrap();
        assert!(path.exists());
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(mode, "wal");
        db.close().await;
    }

    #[tokio::test]
    async fn test_exclusions_are_indexed_by_entity() {
        let db = Database::connect_in_memory().await.unwrap();
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'exclusions'")
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert!(names.iter().any(|n| n == "exclusions_entity"));
    }
}
