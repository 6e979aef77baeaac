//! Direct exclusions: content restrictions, then user hides.

use crate::hierarchies::Hierarchies;
use crate::json_ids;
use sqlx::SqliteConnection;
use tracing::debug;
use veil_store::error::{DatabaseResultExt, Result as StoreResult};
use veil_store::inputs;
use veil_store::models::{ContentRestriction, RestrictionMode};
use veil_store::{EntityId, EntityType, UserId};

/// Rows written by the direct phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DirectRows {
    pub(crate) restricted: u64,
    pub(crate) hidden: u64,
}

pub(crate) async fn apply(
    conn: &mut SqliteConnection,
    hierarchies: &mut Hierarchies,
    user_id: UserId,
    now: i64,
) -> StoreResult<DirectRows> {
    let mut rows = DirectRows::default();
    let restrictions = inputs::active_restrictions(&mut *conn, user_id).await?;
    for restriction in &restrictions {
        let ids = expand(conn, hierarchies, restriction).await?;
        let written = apply_restriction(conn, user_id, now, restriction, &ids).await?;
        debug!(
            restriction = restriction.id,
            entity_type = %restriction.entity_type,
            mode = %restriction.mode,
            rows = written,
            "applied restriction"
        );
        rows.restricted += written;
    }
    // Restrictions first: an entity that is both restricted and hidden keeps
    // the stronger reason.
    for entity_type in EntityType::ALL {
        rows.hidden += apply_hidden(conn, user_id, now, entity_type).await?;
    }
    Ok(rows)
}

/// The restriction's ids, plus descendants down to its hierarchy depth.
async fn expand(
    conn: &mut SqliteConnection,
    hierarchies: &mut Hierarchies,
    restriction: &ContentRestriction,
) -> StoreResult<Vec<EntityId>> {
    if !restriction.entity_type.is_hierarchical() || restriction.hierarchy_depth == Some(0) {
        return Ok(restriction.entity_ids.clone());
    }
    let hierarchy = hierarchies.get(conn, restriction.entity_type).await?;
    let mut ids: Vec<_> =
        hierarchy.descendants(restriction.entity_ids.iter().copied(), restriction.hierarchy_depth).into_iter().collect();
    ids.sort_unstable();
    Ok(ids)
}

async fn apply_restriction(
    conn: &mut SqliteConnection,
    user_id: UserId,
    now: i64,
    restriction: &ContentRestriction,
    ids: &[EntityId],
) -> StoreResult<u64> {
    let template = match restriction.mode {
        RestrictionMode::Exclude => include_str!("../queries/restrict_listed.sql"),
        RestrictionMode::Include => include_str!("../queries/restrict_unlisted.sql"),
    };
    let sql = template.replace("{table}", restriction.entity_type.table());
    let result = sqlx::query(&sql)
        .bind(user_id)
        .bind(restriction.entity_type.as_str())
        .bind(now)
        .bind(json_ids(ids.iter().copied())?)
        .execute(&mut *conn)
        .await
        .or_database()?;
    Ok(result.rows_affected())
}

async fn apply_hidden(
    conn: &mut SqliteConnection,
    user_id: UserId,
    now: i64,
    entity_type: EntityType,
) -> StoreResult<u64> {
    let sql = include_str!("../queries/exclude_hidden.sql").replace("{table}", entity_type.table());
    let result = sqlx::query(&sql)
        .bind(user_id)
        .bind(entity_type.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await
        .or_database()?;
    Ok(result.rows_affected())
}
