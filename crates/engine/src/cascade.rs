//! The fixed cascade table and its two evaluation modes.
//!
//! Excluding an entity excludes related entities according to [`RULES`].
//! Relationship depth is bounded, so the table is evaluated once, in order,
//! rather than iterated to a fixpoint: tag rules run first so performers,
//! studios and groups excluded through a tag cascade on to their scenes in
//! the same pass.

use crate::hierarchies::Hierarchies;
use crate::json_ids;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;
use veil_store::error::{DatabaseResultExt, Result as StoreResult};
use veil_store::{EntityId, EntityType, UserId};

/// Excluding a `source` entity excludes every `target` entity that
/// `targets` selects. `targets` selects a single `id` column and contains a
/// `{sources}` placeholder for the excluded source ids.
#[derive(Debug)]
pub(crate) struct Rule {
    pub(crate) source: EntityType,
    pub(crate) target: EntityType,
    targets: &'static str,
}

pub(crate) const RULES: [Rule; 9] = [
    Rule {
        source: EntityType::Tag,
        target: EntityType::Performer,
        targets: "SELECT performer_id AS id FROM performers_tags WHERE tag_id IN ({sources})",
    },
    Rule {
        source: EntityType::Tag,
        target: EntityType::Studio,
        targets: "SELECT studio_id AS id FROM studios_tags WHERE tag_id IN ({sources})",
    },
    Rule {
        source: EntityType::Tag,
        target: EntityType::Group,
        targets: "SELECT group_id AS id FROM groups_tags WHERE tag_id IN ({sources})",
    },
    Rule {
        source: EntityType::Tag,
        target: EntityType::Scene,
        targets: "SELECT scene_id AS id FROM scenes_tags WHERE tag_id IN ({sources})",
    },
    Rule {
        source: EntityType::Performer,
        target: EntityType::Scene,
        targets: "SELECT scene_id AS id FROM scenes_performers WHERE performer_id IN ({sources})",
    },
    Rule {
        source: EntityType::Studio,
        target: EntityType::Scene,
        targets: "SELECT id FROM scenes WHERE studio_id IN ({sources})",
    },
    Rule {
        source: EntityType::Group,
        target: EntityType::Scene,
        targets: "SELECT scene_id AS id FROM groups_scenes WHERE group_id IN ({sources})",
    },
    Rule {
        source: EntityType::Gallery,
        target: EntityType::Scene,
        targets: "SELECT scene_id AS id FROM scenes_galleries WHERE gallery_id IN ({sources})",
    },
    Rule {
        source: EntityType::Gallery,
        target: EntityType::Image,
        targets: "SELECT image_id AS id FROM galleries_images WHERE gallery_id IN ({sources})",
    },
];

/// Rows newly excluded by cascade, per target type.
pub(crate) type CascadeRows = BTreeMap<EntityType, u64>;

const LISTED_SOURCES: &str = "SELECT value FROM json_each(?4)";

/// Cascade from every entity the user currently has excluded.
///
/// Tag sources are the excluded tags plus all of their descendants, since a
/// scene carrying a child tag inherits the parent tag.
pub(crate) async fn apply_all(
    conn: &mut SqliteConnection,
    hierarchies: &mut Hierarchies,
    user_id: UserId,
    now: i64,
) -> StoreResult<CascadeRows> {
    let excluded_tags: Vec<EntityId> =
        sqlx::query_scalar("SELECT entity_id FROM exclusions WHERE user_id = ? AND entity_type = 'tag'")
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await
            .or_database()?;
    let tags = hierarchies.get(conn, EntityType::Tag).await?.descendants(excluded_tags, None);
    let tags = json_ids(tags.into_iter().collect::<BTreeSet<_>>())?;

    let mut rows = CascadeRows::new();
    for rule in &RULES {
        let (sources, listed) = if rule.source == EntityType::Tag {
            (LISTED_SOURCES.to_string(), Some(tags.as_str()))
        } else {
            let excluded = format!(
                "SELECT entity_id FROM exclusions WHERE user_id = ?1 AND entity_type = '{}'",
                rule.source.as_str()
            );
            (excluded, None)
        };
        let targets = rule.targets.replace("{sources}", &sources);
        let sql = include_str!("../queries/cascade_insert.sql").replace("{targets}", &targets);
        let mut query = sqlx::query(&sql).bind(user_id).bind(rule.target.as_str()).bind(now);
        if let Some(listed) = listed {
            query = query.bind(listed);
        }
        let written = query.execute(&mut *conn).await.or_database()?.rows_affected();
        trace!(source = %rule.source, target = %rule.target, rows = written, "cascade rule applied");
        *rows.entry(rule.target).or_default() += written;
    }
    Ok(rows)
}

/// Cascade outward from a single newly excluded entity only.
///
/// Only rules reachable from the seed run. Targets that can cascade further
/// (performers, studios and groups reached through a tag) become seeds for
/// the rules after them.
pub(crate) async fn apply_from(
    conn: &mut SqliteConnection,
    hierarchies: &mut Hierarchies,
    user_id: UserId,
    now: i64,
    entity_type: EntityType,
    entity_id: EntityId,
) -> StoreResult<CascadeRows> {
    let mut seeds: BTreeMap<EntityType, BTreeSet<EntityId>> = BTreeMap::new();
    let seed = match entity_type {
        EntityType::Tag => {
            let hierarchy = hierarchies.get(conn, EntityType::Tag).await?;
            hierarchy.descendants([entity_id], None).into_iter().collect()
        },
        _ => BTreeSet::from([entity_id]),
    };
    seeds.insert(entity_type, seed);

    let mut rows = CascadeRows::new();
    for rule in &RULES {
        let Some(sources) = seeds.get(&rule.source).filter(|s| !s.is_empty()) else {
            continue;
        };
        let sql = format!(
            "SELECT DISTINCT id FROM ({}) ORDER BY id",
            rule.targets.replace("{sources}", "SELECT value FROM json_each(?1)")
        );
        let targets: Vec<EntityId> = sqlx::query_scalar(&sql)
            .bind(json_ids(sources.iter().copied())?)
            .fetch_all(&mut *conn)
            .await
            .or_database()?;
        if targets.is_empty() {
            continue;
        }
        let written = sqlx::query(include_str!("../queries/cascade_insert_listed.sql"))
            .bind(user_id)
            .bind(rule.target.as_str())
            .bind(now)
            .bind(json_ids(targets.iter().copied())?)
            .execute(&mut *conn)
            .await
            .or_database()?
            .rows_affected();
        trace!(source = %rule.source, target = %rule.target, rows = written, "cascade rule applied");
        *rows.entry(rule.target).or_default() += written;
        if !rule.target.is_leaf() {
            seeds.entry(rule.target).or_default().extend(targets);
        }
    }
    Ok(rows)
}
