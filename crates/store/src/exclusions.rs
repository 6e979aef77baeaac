//! Read access to the exclusion set and its visibility stats.
//!
//! The visibility engine is the only writer of these tables. This repository
//! serves tests, diagnostics and the O(1) visible-count lookup.

use crate::Database;
use crate::error::{DatabaseResultExt, ErrorKind, Result};
use crate::models::{EntityId, EntityType, ExclusionRecord, ExclusionRow, StatsRow, UserId, VisibilityStats};
use exn::ResultExt;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// Exclusion-table size, broken down per user and per type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionReport {
    pub total_rows: u64,
    pub users: Vec<UserExclusions>,
    pub pending_recomputes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserExclusions {
    pub user_id: UserId,
    pub rows: u64,
    pub by_type: BTreeMap<EntityType, u64>,
}

#[derive(Debug, Clone)]
pub struct ExclusionRepository {
    pool: SqlitePool,
}
impl From<&Database> for ExclusionRepository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl ExclusionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every exclusion record for a user, optionally limited to one type,
    /// ordered by type then id.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<ExclusionRecord>> {
        let rows: Vec<ExclusionRow> = sqlx::query_as(include_str!("../queries/list_exclusions_for_user.sql"))
            .bind(user_id)
            .bind(entity_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await
            .or_database()?;
        rows.into_iter().map(ExclusionRecord::try_from).collect()
    }

    /// Ids of the entities of one type that a user cannot see, ascending.
    pub async fn excluded_ids(&self, user_id: UserId, entity_type: EntityType) -> Result<Vec<EntityId>> {
        sqlx::query_scalar("SELECT entity_id FROM exclusions WHERE user_id = ? AND entity_type = ? ORDER BY entity_id")
            .bind(user_id)
            .bind(entity_type.as_str())
            .fetch_all(&self.pool)
            .await
            .or_database()
    }

    pub async fn get(
        &self,
        user_id: UserId,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<ExclusionRecord>> {
        let row: Option<ExclusionRow> = sqlx::query_as(
            "SELECT user_id, entity_type, entity_id, reason, computed_at FROM exclusions WHERE user_id = ? AND entity_type = ? AND entity_id = ?",
        )
        .bind(user_id)
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .or_database()?;
        row.map(ExclusionRecord::try_from).transpose()
    }

    pub async fn count_for_user(&self, user_id: UserId, entity_type: EntityType) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exclusions WHERE user_id = ? AND entity_type = ?")
            .bind(user_id)
            .bind(entity_type.as_str())
            .fetch_one(&self.pool)
            .await
            .or_database()?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("exclusion count"))
    }

    /// Pre-computed visible count, if stats have been computed for the user.
    pub async fn stats(&self, user_id: UserId, entity_type: EntityType) -> Result<Option<VisibilityStats>> {
        let row: Option<StatsRow> = sqlx::query_as(
            "SELECT user_id, entity_type, visible_count, updated_at FROM visibility_stats WHERE user_id = ? AND entity_type = ?",
        )
        .bind(user_id)
        .bind(entity_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .or_database()?;
        row.map(VisibilityStats::try_from).transpose()
    }

    pub async fn stats_for_user(&self, user_id: UserId) -> Result<Vec<VisibilityStats>> {
        let rows: Vec<StatsRow> = sqlx::query_as(
            "SELECT user_id, entity_type, visible_count, updated_at FROM visibility_stats WHERE user_id = ? ORDER BY entity_type",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .or_database()?;
        rows.into_iter().map(VisibilityStats::try_from).collect()
    }

    /// Table size and per-user row counts for operators.
    pub async fn report(&self) -> Result<ExclusionReport> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(include_str!("../queries/exclusion_report.sql"))
            .fetch_all(&self.pool)
            .await
            .or_database()?;
        let mut report = ExclusionReport::default();
        for (user_id, entity_type, count) in rows {
            let count = u64::try_from(count).or_raise(|| ErrorKind::InvalidData("exclusion count"))?;
            let entity_type: EntityType = entity_type.parse()?;
            if report.users.last().is_none_or(|u| u.user_id != user_id) {
                report.users.push(UserExclusions { user_id, ..Default::default() });
            }
            // Just pushed if missing.
            if let Some(user) = report.users.last_mut() {
                user.rows += count;
                user.by_type.insert(entity_type, count);
            }
            report.total_rows += count;
        }
        let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM deferred_recomputes")
            .fetch_one(&self.pool)
            .await
            .or_database()?;
        report.pending_recomputes = u64::try_from(pending).or_raise(|| ErrorKind::InvalidData("pending count"))?;
        Ok(report)
    }
}
