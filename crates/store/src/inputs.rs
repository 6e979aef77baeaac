//! Direct exclusion inputs: content restrictions and user hides.
//!
//! Restrictions are authored elsewhere and only read here. Hidden entities
//! are written by the hide/unhide paths, which keep the raw input and the
//! exclusion set in step.

use crate::error::{DatabaseResultExt, Result};
use crate::models::{ContentRestriction, EntityId, EntityType, RestrictionRow, UserId};
use sqlx::SqliteExecutor;
use time::UtcDateTime;

/// All active restrictions that apply to `user_id`, oldest first.
pub async fn active_restrictions<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
) -> Result<Vec<ContentRestriction>> {
    let rows: Vec<RestrictionRow> = sqlx::query_as(include_str!("../queries/active_restrictions.sql"))
        .bind(user_id)
        .fetch_all(executor)
        .await
        .or_database()?;
    rows.into_iter().map(ContentRestriction::try_from).collect()
}

/// Record a hide. Returns `false` if the entity was already hidden.
pub async fn insert_hidden<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
    entity_type: EntityType,
    entity_id: EntityId,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO user_hidden_entities (user_id, entity_type, entity_id, hidden_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(UtcDateTime::now().unix_timestamp())
    .execute(executor)
    .await
    .or_database()?;
    Ok(result.rows_affected() > 0)
}

/// Remove a hide. Returns `false` if the entity was not hidden.
pub async fn delete_hidden<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
    entity_type: EntityType,
    entity_id: EntityId,
) -> Result<bool> {
    let result =
        sqlx::query("DELETE FROM user_hidden_entities WHERE user_id = ? AND entity_type = ? AND entity_id = ?")
            .bind(user_id)
            .bind(entity_type.as_str())
            .bind(entity_id)
            .execute(executor)
            .await
            .or_database()?;
    Ok(result.rows_affected() > 0)
}
