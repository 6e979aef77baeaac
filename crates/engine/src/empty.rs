//! Empty exclusions for tags, studios and groups.
//!
//! Runs only as part of a full recompute. An organizational entity is
//! non-empty when it, or anything beneath it, has at least one visible
//! scene; everything else of that type is excluded.

use crate::hierarchies::Hierarchies;
use crate::json_ids;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use veil_store::error::{DatabaseResultExt, Result as StoreResult};
use veil_store::{EntityId, EntityType, UserId};

/// Organizational types, with the query selecting the ids that directly
/// hold at least one scene the user can still see.
const CONTENT: [(EntityType, &str); 3] = [
    (EntityType::Tag, include_str!("../queries/tags_with_visible_scenes.sql")),
    (EntityType::Studio, include_str!("../queries/studios_with_visible_scenes.sql")),
    (EntityType::Group, include_str!("../queries/groups_with_visible_scenes.sql")),
];

pub(crate) async fn apply(
    conn: &mut SqliteConnection,
    hierarchies: &mut Hierarchies,
    user_id: UserId,
    now: i64,
) -> StoreResult<BTreeMap<EntityType, u64>> {
    let mut rows = BTreeMap::new();
    for (entity_type, with_content) in CONTENT {
        let direct: Vec<EntityId> =
            sqlx::query_scalar(with_content).bind(user_id).fetch_all(&mut *conn).await.or_database()?;
        // Bottom-up: content anywhere below makes every ancestor non-empty.
        let mut non_empty: Vec<_> = hierarchies.get(conn, entity_type).await?.ancestors(direct).into_iter().collect();
        non_empty.sort_unstable();
        let sql = include_str!("../queries/exclude_empty.sql").replace("{table}", entity_type.table());
        let written = sqlx::query(&sql)
            .bind(user_id)
            .bind(entity_type.as_str())
            .bind(now)
            .bind(json_ids(non_empty)?)
            .execute(&mut *conn)
            .await
            .or_database()?
            .rows_affected();
        rows.insert(entity_type, written);
    }
    Ok(rows)
}
