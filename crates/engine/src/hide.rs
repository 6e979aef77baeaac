use crate::cascade;
use crate::error::{ErrorKind, Result};
use crate::hierarchies::Hierarchies;
use crate::{Engine, stats};
use exn::ResultExt;
use std::collections::{BTreeMap, BTreeSet};
use time::UtcDateTime;
use tracing::{debug, info, instrument};
use veil_store::error::DatabaseResultExt;
use veil_store::{EntityId, EntityType, UserId, deferred, inputs};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HideOutcome {
    /// `false` when the user had already hidden the entity.
    pub newly_hidden: bool,
    /// Whether the entity's own exclusion row was written or upgraded.
    pub excluded: bool,
    /// Rows newly excluded through the entity, per target type.
    pub cascaded: BTreeMap<EntityType, u64>,
}

impl Engine {
    /// Hide an entity for a user and exclude everything it cascades to.
    ///
    /// Synchronous: when this returns `Ok`, the entity and its cascade
    /// targets are already gone from the user's listings. Empty organizational
    /// entities are only picked up by the next full recompute.
    #[instrument(skip(self))]
    pub async fn add_hidden_entity(
        &self,
        user_id: UserId,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<HideOutcome> {
        self.ensure_user(user_id).await?;
        self.ensure_entity(entity_type, entity_id).await?;
        let fail = || ErrorKind::Hide { user_id, entity_type, entity_id };
        let now = UtcDateTime::now().unix_timestamp();

        let mut tx = self.pool.begin().await.or_database().or_raise(fail)?;
        let newly_hidden = inputs::insert_hidden(&mut *tx, user_id, entity_type, entity_id).await.or_raise(fail)?;
        let excluded = sqlx::query(include_str!("../queries/upsert_hidden.sql"))
            .bind(user_id)
            .bind(entity_type.as_str())
            .bind(entity_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .or_database()
            .or_raise(fail)?
            .rows_affected()
            > 0;
        let mut hierarchies = Hierarchies::default();
        let cascaded = cascade::apply_from(&mut tx, &mut hierarchies, user_id, now, entity_type, entity_id)
            .await
            .or_raise(fail)?;
        debug!(rows = ?cascaded, "cascaded from hidden entity");

        let affected: BTreeSet<EntityType> = cascaded.keys().copied().chain([entity_type]).collect();
        stats::refresh(&mut tx, user_id, now, affected).await.or_raise(fail)?;
        tx.commit().await.or_database().or_raise(fail)?;

        info!(newly_hidden, excluded, cascaded = cascaded.values().sum::<u64>(), "hid entity");
        Ok(HideOutcome { newly_hidden, excluded, cascaded })
    }

    /// Unhide an entity for a user.
    ///
    /// Other restrictions or hides may still exclude the entity or its
    /// cascade targets, so nothing is removed from the exclusion set here.
    /// Instead a full recompute is queued in the same transaction; until it
    /// commits the user may see too little, never too much.
    ///
    /// Returns `false` if the entity was not hidden; nothing is queued then.
    #[instrument(skip(self))]
    pub async fn remove_hidden_entity(
        &self,
        user_id: UserId,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<bool> {
        self.ensure_user(user_id).await?;
        let fail = || ErrorKind::Unhide { user_id, entity_type, entity_id };

        let mut tx = self.pool.begin().await.or_database().or_raise(fail)?;
        let removed = inputs::delete_hidden(&mut *tx, user_id, entity_type, entity_id).await.or_raise(fail)?;
        if removed {
            deferred::enqueue(&mut *tx, user_id).await.or_raise(fail)?;
        }
        tx.commit().await.or_database().or_raise(fail)?;

        if removed {
            info!("unhid entity, recompute queued");
        } else {
            debug!("entity was not hidden");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recompute::tests::{assert_stats_consistent, library, reason, snapshot, visible};
    use rstest::rstest;
    use veil_store::fixtures::Library;
    use veil_store::models::RestrictionMode;
    use veil_store::{Database, DeferredRepository, ExclusionRepository, Reason};

    #[tokio::test]
    async fn test_hiding_performer_in_two_of_hundred_scenes() {
        let db = Database::connect_in_memory().await.unwrap();
        let lib = Library::new(&db);
        lib.user(1, "alice").await.performer(1, "Ada").await.performer(2, "Grace").await;
        lib.scenes(1..=100).await;
        lib.scene_performer(10, 1).await.scene_performer(20, 1).await.scene_performer(30, 2).await;
        let engine = Engine::from(&db);
        engine.recompute_for_user(1).await.unwrap();
        assert_eq!(visible(&db, 1, EntityType::Scene).await, 100);
        let rows_before = snapshot(&db, 1).await.len();

        let outcome = engine.add_hidden_entity(1, EntityType::Performer, 1).await.unwrap();
        assert!(outcome.newly_hidden);
        assert!(outcome.excluded);
        assert_eq!(outcome.cascaded.get(&EntityType::Scene), Some(&2));

        assert_eq!(visible(&db, 1, EntityType::Scene).await, 98);
        assert_eq!(visible(&db, 1, EntityType::Performer).await, 1);
        assert_eq!(snapshot(&db, 1).await.len(), rows_before + 3);
        assert_eq!(reason(&db, 1, EntityType::Performer, 1).await, Some(Reason::Hidden));
        assert_eq!(reason(&db, 1, EntityType::Scene, 10).await, Some(Reason::Cascade));
        assert_eq!(reason(&db, 1, EntityType::Scene, 30).await, None);
        assert_stats_consistent(&db, 1).await;
    }

    #[tokio::test]
    async fn test_hide_is_consistent_with_full_recompute() {
        let db = library().await;
        let engine = Engine::from(&db);
        engine.recompute_for_user(1).await.unwrap();
        engine.add_hidden_entity(1, EntityType::Tag, 3).await.unwrap();
        engine.add_hidden_entity(1, EntityType::Gallery, 1).await.unwrap();
        let incremental = snapshot(&db, 1).await;

        engine.recompute_for_user(1).await.unwrap();
        let full = snapshot(&db, 1).await;
        // The full recompute may add empties, but never drops a hide's rows.
        for (entity_type, id, _) in &incremental {
            assert!(full.iter().any(|(t, i, _)| t == entity_type && i == id), "{entity_type} {id} lost");
        }
        assert_eq!(reason(&db, 1, EntityType::Scene, 1).await, Some(Reason::Cascade));
        assert_eq!(reason(&db, 1, EntityType::Image, 2).await, Some(Reason::Cascade));
    }

    #[tokio::test]
    async fn test_hide_upgrades_cascaded_entity() {
        let db = library().await;
        let engine = Engine::from(&db);
        engine.add_hidden_entity(1, EntityType::Performer, 1).await.unwrap();
        assert_eq!(reason(&db, 1, EntityType::Scene, 1).await, Some(Reason::Cascade));

        let outcome = engine.add_hidden_entity(1, EntityType::Scene, 1).await.unwrap();
        assert!(outcome.excluded);
        assert_eq!(reason(&db, 1, EntityType::Scene, 1).await, Some(Reason::Hidden));
    }

    #[tokio::test]
    async fn test_hide_never_downgrades_restricted() {
        let db = library().await;
        Library::new(&db).restrict(1, EntityType::Scene, RestrictionMode::Exclude, vec![2], None).await;
        let engine = Engine::from(&db);
        engine.recompute_for_user(1).await.unwrap();

        let outcome = engine.add_hidden_entity(1, EntityType::Scene, 2).await.unwrap();
        assert!(outcome.newly_hidden);
        assert!(!outcome.excluded);
        assert_eq!(reason(&db, 1, EntityType::Scene, 2).await, Some(Reason::Restricted));
    }

    #[tokio::test]
    async fn test_hiding_twice_is_harmless() {
        let db = library().await;
        let engine = Engine::from(&db);
        engine.add_hidden_entity(1, EntityType::Studio, 2).await.unwrap();
        let before = snapshot(&db, 1).await;
        let outcome = engine.add_hidden_entity(1, EntityType::Studio, 2).await.unwrap();
        assert!(!outcome.newly_hidden);
        assert!(!outcome.excluded);
        assert!(outcome.cascaded.values().all(|&rows| rows == 0));
        assert_eq!(before, snapshot(&db, 1).await);
    }

    #[tokio::test]
    async fn test_hidden_tag_cascades_through_descendants_and_performers() {
        let db = library().await;
        let engine = Engine::from(&db);
        let outcome = engine.add_hidden_entity(1, EntityType::Tag, 1).await.unwrap();
        // Scene 3 carries the tag, scene 1 its child tag.
        assert_eq!(outcome.cascaded.get(&EntityType::Scene), Some(&2));
        assert_eq!(reason(&db, 1, EntityType::Scene, 1).await, Some(Reason::Cascade));
        assert_eq!(reason(&db, 1, EntityType::Scene, 3).await, Some(Reason::Cascade));

        engine.add_hidden_entity(1, EntityType::Tag, 3).await.unwrap();
        assert_eq!(reason(&db, 1, EntityType::Performer, 3).await, Some(Reason::Cascade));
        assert_eq!(reason(&db, 1, EntityType::Scene, 4).await, Some(Reason::Cascade));
        assert_stats_consistent(&db, 1).await;
    }

    #[rstest]
    #[case::user(42, EntityType::Scene, 1)]
    #[case::entity(1, EntityType::Scene, 999)]
    #[case::wrong_type(1, EntityType::Gallery, 2)]
    #[tokio::test]
    async fn test_hide_rejects_unknown_targets(
        #[case] user_id: UserId,
        #[case] entity_type: EntityType,
        #[case] entity_id: EntityId,
    ) {
        let db = library().await;
        let err = Engine::from(&db).add_hidden_entity(user_id, entity_type, entity_id).await.unwrap_err();
        assert!(err.is_invalid_input());
        assert!(snapshot(&db, 1).await.is_empty());
        let hidden: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_hidden_entities").fetch_one(db.pool()).await.unwrap();
        assert_eq!(hidden, 0);
    }

    #[tokio::test]
    async fn test_failed_hide_rolls_back() {
        let db = library().await;
        sqlx::query("DROP TABLE scenes_performers").execute(db.pool()).await.unwrap();
        let err = Engine::from(&db).add_hidden_entity(1, EntityType::Performer, 1).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Hide { user_id: 1, entity_type: EntityType::Performer, entity_id: 1 }));
        assert!(snapshot(&db, 1).await.is_empty());
        let hidden: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_hidden_entities").fetch_one(db.pool()).await.unwrap();
        assert_eq!(hidden, 0);
    }

    #[tokio::test]
    async fn test_unhide_queues_recompute_and_keeps_exclusions() {
        let db = library().await;
        let engine = Engine::from(&db);
        engine.add_hidden_entity(1, EntityType::Performer, 1).await.unwrap();
        let before = snapshot(&db, 1).await;

        assert!(engine.remove_hidden_entity(1, EntityType::Performer, 1).await.unwrap());
        // Over-excluded until the queued recompute runs.
        assert_eq!(before, snapshot(&db, 1).await);
        let pending = DeferredRepository::from(&db).pending(10).await.unwrap();
        assert_eq!(pending.iter().map(|t| t.user_id).collect::<Vec<_>>(), vec![1]);

        engine.recompute_for_user(1).await.unwrap();
        assert!(snapshot(&db, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_unhiding_what_was_not_hidden_queues_nothing() {
        let db = library().await;
        assert!(!Engine::from(&db).remove_hidden_entity(1, EntityType::Scene, 1).await.unwrap());
        assert!(DeferredRepository::from(&db).pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unhide_keeps_entities_excluded_by_other_sources() {
        let db = library().await;
        let engine = Engine::from(&db);
        // Scene 1 features performer 1 and carries tag 2.
        engine.add_hidden_entity(1, EntityType::Performer, 1).await.unwrap();
        engine.add_hidden_entity(1, EntityType::Tag, 2).await.unwrap();

        engine.remove_hidden_entity(1, EntityType::Performer, 1).await.unwrap();
        engine.recompute_for_user(1).await.unwrap();

        assert_eq!(reason(&db, 1, EntityType::Scene, 1).await, Some(Reason::Cascade));
        // Scene 2 only featured the unhidden performer.
        assert_eq!(reason(&db, 1, EntityType::Scene, 2).await, None);
        assert_eq!(reason(&db, 1, EntityType::Performer, 1).await, None);
        let excluded = ExclusionRepository::from(&db).excluded_ids(1, EntityType::Scene).await.unwrap();
        assert_eq!(excluded, vec![1]);
        assert_stats_consistent(&db, 1).await;
    }
}
