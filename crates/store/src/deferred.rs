//! Durable queue of full recomputes owed to users.
//!
//! An unhide removes its raw input and enqueues a recompute in the same
//! transaction, so a crash between the two can never lose the recompute.
//! At most one entry exists per user; re-requesting bumps its generation.

use crate::Database;
use crate::error::{DatabaseResultExt, ErrorKind, Result};
use crate::models::UserId;
use exn::ResultExt;
use sqlx::{SqliteExecutor, SqlitePool};
use time::UtcDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRecompute {
    pub user_id: UserId,
    pub requested_at: UtcDateTime,
    pub generation: i64,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(sqlx::FromRow)]
struct DeferredRow {
    user_id: i64,
    requested_at: i64,
    generation: i64,
    attempts: i64,
    last_error: Option<String>,
}
impl TryFrom<DeferredRow> for DeferredRecompute {
    type Error = crate::error::Error;
    fn try_from(row: DeferredRow) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id,
            requested_at: UtcDateTime::from_unix_timestamp(row.requested_at)
                .or_raise(|| ErrorKind::InvalidData("requested at"))?,
            generation: row.generation,
            attempts: u32::try_from(row.attempts).or_raise(|| ErrorKind::InvalidData("attempts"))?,
            last_error: row.last_error,
        })
    }
}

/// Request a full recompute for `user_id`.
///
/// Safe to call inside the transaction that made the recompute necessary.
pub async fn enqueue<'e>(executor: impl SqliteExecutor<'e>, user_id: UserId) -> Result<()> {
    sqlx::query(include_str!("../queries/enqueue_deferred.sql"))
        .bind(user_id)
        .bind(UtcDateTime::now().unix_timestamp())
        .execute(executor)
        .await
        .or_database()?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DeferredRepository {
    pool: SqlitePool,
}
impl From<&Database> for DeferredRepository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl DeferredRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, user_id: UserId) -> Result<()> {
        enqueue(&self.pool, user_id).await
    }

    /// Oldest requests first.
    pub async fn pending(&self, limit: usize) -> Result<Vec<DeferredRecompute>> {
        let limit = i64::try_from(limit).or_raise(|| ErrorKind::InvalidData("limit"))?;
        let rows: Vec<DeferredRow> = sqlx::query_as(
            "SELECT user_id, requested_at, generation, attempts, last_error FROM deferred_recomputes ORDER BY requested_at, user_id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .or_database()?;
        rows.into_iter().map(DeferredRecompute::try_from).collect()
    }

    /// Remove a finished request. Returns `false` when the user was
    /// re-requested while the recompute ran; that newer entry stays queued.
    pub async fn complete(&self, task: &DeferredRecompute) -> Result<bool> {
        let result = sqlx::query("DELETE FROM deferred_recomputes WHERE user_id = ? AND generation = ?")
            .bind(task.user_id)
            .bind(task.generation)
            .execute(&self.pool)
            .await
            .or_database()?;
        Ok(result.rows_affected() > 0)
    }

    /// Count a failed attempt and keep the request queued.
    pub async fn record_failure(&self, task: &DeferredRecompute, error: impl AsRef<str>) -> Result<()> {
        sqlx::query("UPDATE deferred_recomputes SET attempts = attempts + 1, last_error = ? WHERE user_id = ?")
            .bind(error.as_ref())
            .bind(task.user_id)
            .execute(&self.pool)
            .await
            .or_database()?;
        Ok(())
    }

    /// Drop a request regardless of generation (after exhausting retries).
    pub async fn discard(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM deferred_recomputes WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .or_database()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Library;

    async fn setup() -> (Database, DeferredRepository) {
        let db = Database::connect_in_memory().await.unwrap();
        Library::new(&db).user(1, "alice").await.user(2, "bob").await;
        let repo = DeferredRepository::from(&db);
        (db, repo)
    }

    #[tokio::test]
    async fn test_enqueue_is_one_entry_per_user() {
        let (_db, repo) = setup().await;
        repo.enqueue(1).await.unwrap();
        repo.enqueue(1).await.unwrap();
        repo.enqueue(2).await.unwrap();
        let pending = repo.pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        let alice = pending.iter().find(|t| t.user_id == 1).unwrap();
        assert_eq!(alice.generation, 1);
    }

    #[tokio::test]
    async fn test_complete_keeps_newer_request() {
        let (_db, repo) = setup().await;
        repo.enqueue(1).await.unwrap();
        let task = repo.pending(1).await.unwrap().remove(0);
        // Re-requested while the recompute was running.
        repo.enqueue(1).await.unwrap();
        assert!(!repo.complete(&task).await.unwrap());
        let task = repo.pending(1).await.unwrap().remove(0);
        assert!(repo.complete(&task).await.unwrap());
        assert!(repo.pending(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_counts_attempts() {
        let (_db, repo) = setup().await;
        repo.enqueue(2).await.unwrap();
        let task = repo.pending(1).await.unwrap().remove(0);
        repo.record_failure(&task, "database busy").await.unwrap();
        repo.record_failure(&task, "database busy").await.unwrap();
        let task = repo.pending(1).await.unwrap().remove(0);
        assert_eq!(task.attempts, 2);
        assert_eq!(task.last_error.as_deref(), Some("database busy"));
        repo.discard(2).await.unwrap();
        assert!(repo.pending(1).await.unwrap().is_empty());
    }
}
