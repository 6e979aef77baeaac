//! Visible counts, derived from the exclusion set they summarize.

use sqlx::SqliteConnection;
use veil_store::error::{DatabaseResultExt, Result as StoreResult};
use veil_store::{EntityType, UserId};

/// Rewrite the visible count for each of `types`. Must run in the same
/// transaction as the exclusion writes it summarizes.
pub(crate) async fn refresh(
    conn: &mut SqliteConnection,
    user_id: UserId,
    now: i64,
    types: impl IntoIterator<Item = EntityType>,
) -> StoreResult<()> {
    for entity_type in types {
        let sql = include_str!("../queries/refresh_stats.sql").replace("{table}", entity_type.table());
        sqlx::query(&sql)
            .bind(user_id)
            .bind(entity_type.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await
            .or_database()?;
    }
    Ok(())
}
