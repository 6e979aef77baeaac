//! Seeding helpers standing in for the sync process in tests.
//!
//! Only compiled for this crate's tests and for other crates that enable the
//! `fixtures` feature in their dev-dependencies. Failures panic: a fixture
//! that cannot be seeded is a broken test, not a runtime condition.

use crate::Database;
use crate::models::{ContentRestriction, EntityId, EntityType, RestrictionMode, RestrictionRow, UserId};
use sqlx::SqlitePool;

/// Writes library entities, relationships and direct exclusion inputs.
pub struct Library {
    pool: SqlitePool,
}

impl Library {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }

    async fn run(&self, sql: &str, a: i64, b: Option<i64>, text: Option<&str>) -> &Self {
        let mut query = sqlx::query(sql).bind(a);
        if let Some(text) = text {
            query = query.bind(text.to_string());
        }
        if let Some(b) = b {
            query = query.bind(b);
        }
        query.execute(&self.pool).await.unwrap_or_else(|e| panic!("fixture failed: {sql}: {e}"));
        self
    }

    pub async fn user(&self, id: UserId, name: &str) -> &Self {
        self.run("INSERT INTO users (id, name) VALUES (?, ?)", id, None, Some(name)).await
    }

    pub async fn studio(&self, id: EntityId, name: &str, parent: Option<EntityId>) -> &Self {
        sqlx::query("INSERT INTO studios (id, name, parent_id) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name.to_string())
            .bind(parent)
            .execute(&self.pool)
            .await
            .expect("fixture failed: studio");
        self
    }

    pub async fn scene(&self, id: EntityId, title: &str, studio: Option<EntityId>) -> &Self {
        sqlx::query("INSERT INTO scenes (id, title, studio_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(title.to_string())
            .bind(studio)
            .bind(id)
            .execute(&self.pool)
            .await
            .expect("fixture failed: scene");
        self
    }

    /// Insert scenes titled `Scene {id}` without a studio.
    pub async fn scenes(&self, ids: impl IntoIterator<Item = EntityId>) -> &Self {
        for id in ids {
            self.scene(id, &format!("Scene {id:03}"), None).await;
        }
        self
    }

    pub async fn performer(&self, id: EntityId, name: &str) -> &Self {
        self.run("INSERT INTO performers (id, name) VALUES (?, ?)", id, None, Some(name)).await
    }

    pub async fn tag(&self, id: EntityId, name: &str) -> &Self {
        self.run("INSERT INTO tags (id, name) VALUES (?, ?)", id, None, Some(name)).await
    }

    pub async fn tag_parent(&self, parent: EntityId, child: EntityId) -> &Self {
        self.run("INSERT INTO tags_relations (parent_id, child_id) VALUES (?, ?)", parent, Some(child), None).await
    }

    pub async fn group(&self, id: EntityId, name: &str) -> &Self {
        self.run("INSERT INTO library_groups (id, name) VALUES (?, ?)", id, None, Some(name)).await
    }

    pub async fn group_parent(&self, containing: EntityId, sub: EntityId) -> &Self {
        self.run("INSERT INTO groups_relations (containing_id, sub_id) VALUES (?, ?)", containing, Some(sub), None)
            .await
    }

    pub async fn gallery(&self, id: EntityId, title: &str) -> &Self {
        self.run("INSERT INTO galleries (id, title) VALUES (?, ?)", id, None, Some(title)).await
    }

    pub async fn image(&self, id: EntityId, title: &str) -> &Self {
        self.run("INSERT INTO images (id, title) VALUES (?, ?)", id, None, Some(title)).await
    }

    pub async fn scene_performer(&self, scene: EntityId, performer: EntityId) -> &Self {
        self.run("INSERT INTO scenes_performers (scene_id, performer_id) VALUES (?, ?)", scene, Some(performer), None)
            .await
    }

    pub async fn scene_tag(&self, scene: EntityId, tag: EntityId) -> &Self {
        self.run("INSERT INTO scenes_tags (scene_id, tag_id) VALUES (?, ?)", scene, Some(tag), None).await
    }

    pub async fn performer_tag(&self, performer: EntityId, tag: EntityId) -> &Self {
        self.run("INSERT INTO performers_tags (performer_id, tag_id) VALUES (?, ?)", performer, Some(tag), None).await
    }

    pub async fn studio_tag(&self, studio: EntityId, tag: EntityId) -> &Self {
        self.run("INSERT INTO studios_tags (studio_id, tag_id) VALUES (?, ?)", studio, Some(tag), None).await
    }

    pub async fn group_tag(&self, group: EntityId, tag: EntityId) -> &Self {
        self.run("INSERT INTO groups_tags (group_id, tag_id) VALUES (?, ?)", group, Some(tag), None).await
    }

    pub async fn group_scene(&self, group: EntityId, scene: EntityId) -> &Self {
        self.run("INSERT INTO groups_scenes (group_id, scene_id) VALUES (?, ?)", group, Some(scene), None).await
    }

    pub async fn scene_gallery(&self, scene: EntityId, gallery: EntityId) -> &Self {
        self.run("INSERT INTO scenes_galleries (scene_id, gallery_id) VALUES (?, ?)", scene, Some(gallery), None)
            .await
    }

    pub async fn gallery_image(&self, gallery: EntityId, image: EntityId) -> &Self {
        self.run("INSERT INTO galleries_images (gallery_id, image_id) VALUES (?, ?)", gallery, Some(image), None)
            .await
    }

    /// Add an active restriction and return its id.
    pub async fn restrict(
        &self,
        user_id: UserId,
        entity_type: EntityType,
        mode: RestrictionMode,
        entity_ids: Vec<EntityId>,
        hierarchy_depth: Option<u32>,
    ) -> i64 {
        let restriction =
            ContentRestriction { id: 0, user_id, entity_type, mode, entity_ids, hierarchy_depth, active: true };
        let row = RestrictionRow::try_from(&restriction).expect("fixture failed: restriction row");
        sqlx::query_scalar(
            "INSERT INTO content_restrictions (user_id, entity_type, mode, entity_ids, hierarchy_depth, active) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(row.user_id)
        .bind(row.entity_type)
        .bind(row.mode)
        .bind(row.entity_ids)
        .bind(row.hierarchy_depth)
        .bind(row.active)
        .fetch_one(&self.pool)
        .await
        .expect("fixture failed: restriction")
    }

    pub async fn set_restriction_active(&self, id: i64, active: bool) -> &Self {
        sqlx::query("UPDATE content_restrictions SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .expect("fixture failed: restriction toggle");
        self
    }

    /// Write a raw hidden-entity input, as the hide service would.
    pub async fn hidden(&self, user_id: UserId, entity_type: EntityType, entity_id: EntityId) -> &Self {
        sqlx::query("INSERT INTO user_hidden_entities (user_id, entity_type, entity_id, hidden_at) VALUES (?, ?, ?, 0)")
            .bind(user_id)
            .bind(entity_type.as_str())
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .expect("fixture failed: hidden entity");
        self
    }
}
