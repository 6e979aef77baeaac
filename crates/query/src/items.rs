//! Listable entities and their type-specific filters.

use crate::listing::{CommonFilter, Listing, push_exists};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use veil_store::{EntityId, EntityType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Scene {
    pub id: EntityId,
    pub title: String,
    pub studio_id: Option<EntityId>,
    /// Unix timestamp, seconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneFilter {
    pub common: CommonFilter,
    pub performer: Option<EntityId>,
    pub studio: Option<EntityId>,
    /// Scenes carrying this exact tag.
    pub tag: Option<EntityId>,
    pub group: Option<EntityId>,
    pub gallery: Option<EntityId>,
}

impl Listing for Scene {
    const ENTITY_TYPE: EntityType = EntityType::Scene;
    const COLUMNS: &'static str = "e.id, e.title, e.studio_id, e.created_at";
    type Filter = SceneFilter;

    fn common(filter: &Self::Filter) -> &CommonFilter {
        &filter.common
    }

    fn push_filter(filter: &Self::Filter, query: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(studio) = filter.studio {
            query.push(" AND e.studio_id = ").push_bind(studio);
        }
        push_exists(
            query,
            "SELECT 1 FROM scenes_performers WHERE scene_id = e.id AND performer_id = ",
            filter.performer,
        );
        push_exists(query, "SELECT 1 FROM scenes_tags WHERE scene_id = e.id AND tag_id = ", filter.tag);
        push_exists(query, "SELECT 1 FROM groups_scenes WHERE scene_id = e.id AND group_id = ", filter.group);
        push_exists(query, "SELECT 1 FROM scenes_galleries WHERE scene_id = e.id AND gallery_id = ", filter.gallery);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Performer {
    pub id: EntityId,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformerFilter {
    pub common: CommonFilter,
    pub tag: Option<EntityId>,
    /// Performers appearing in this scene.
    pub scene: Option<EntityId>,
}

impl Listing for Performer {
    const ENTITY_TYPE: EntityType = EntityType::Performer;
    const COLUMNS: &'static str = "e.id, e.name, e.created_at";
    type Filter = PerformerFilter;

    fn common(filter: &Self::Filter) -> &CommonFilter {
        &filter.common
    }

    fn push_filter(filter: &Self::Filter, query: &mut QueryBuilder<'_, Sqlite>) {
        push_exists(query, "SELECT 1 FROM performers_tags WHERE performer_id = e.id AND tag_id = ", filter.tag);
        push_exists(
            query,
            "SELECT 1 FROM scenes_performers WHERE performer_id = e.id AND scene_id = ",
            filter.scene,
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Studio {
    pub id: EntityId,
    pub name: String,
    pub parent_id: Option<EntityId>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudioFilter {
    pub common: CommonFilter,
    /// Direct children of this studio.
    pub parent: Option<EntityId>,
    pub tag: Option<EntityId>,
}

impl Listing for Studio {
    const ENTITY_TYPE: EntityType = EntityType::Studio;
    const COLUMNS: &'static str = "e.id, e.name, e.parent_id, e.created_at";
    type Filter = StudioFilter;

    fn common(filter: &Self::Filter) -> &CommonFilter {
        &filter.common
    }

    fn push_filter(filter: &Self::Filter, query: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(parent) = filter.parent {
            query.push(" AND e.parent_id = ").push_bind(parent);
        }
        push_exists(query, "SELECT 1 FROM studios_tags WHERE studio_id = e.id AND tag_id = ", filter.tag);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: EntityId,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub common: CommonFilter,
    /// Direct children of this tag.
    pub parent: Option<EntityId>,
}

impl Listing for Tag {
    const ENTITY_TYPE: EntityType = EntityType::Tag;
    const COLUMNS: &'static str = "e.id, e.name, e.created_at";
    type Filter = TagFilter;

    fn common(filter: &Self::Filter) -> &CommonFilter {
        &filter.common
    }

    fn push_filter(filter: &Self::Filter, query: &mut QueryBuilder<'_, Sqlite>) {
        push_exists(query, "SELECT 1 FROM tags_relations WHERE child_id = e.id AND parent_id = ", filter.parent);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Group {
    pub id: EntityId,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFilter {
    pub common: CommonFilter,
    pub tag: Option<EntityId>,
    /// Direct sub-groups of this group.
    pub parent: Option<EntityId>,
}

impl Listing for Group {
    const ENTITY_TYPE: EntityType = EntityType::Group;
    const COLUMNS: &'static str = "e.id, e.name, e.created_at";
    type Filter = GroupFilter;

    fn common(filter: &Self::Filter) -> &CommonFilter {
        &filter.common
    }

    fn push_filter(filter: &Self::Filter, query: &mut QueryBuilder<'_, Sqlite>) {
        push_exists(query, "SELECT 1 FROM groups_tags WHERE group_id = e.id AND tag_id = ", filter.tag);
        push_exists(
            query,
            "SELECT 1 FROM groups_relations WHERE sub_id = e.id AND containing_id = ",
            filter.parent,
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Gallery {
    pub id: EntityId,
    pub title: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalleryFilter {
    pub common: CommonFilter,
    pub scene: Option<EntityId>,
}

impl Listing for Gallery {
    const ENTITY_TYPE: EntityType = EntityType::Gallery;
    const COLUMNS: &'static str = "e.id, e.title, e.created_at";
    type Filter = GalleryFilter;

    fn common(filter: &Self::Filter) -> &CommonFilter {
        &filter.common
    }

    fn push_filter(filter: &Self::Filter, query: &mut QueryBuilder<'_, Sqlite>) {
        push_exists(query, "SELECT 1 FROM scenes_galleries WHERE gallery_id = e.id AND scene_id = ", filter.scene);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Image {
    pub id: EntityId,
    pub title: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFilter {
    pub common: CommonFilter,
    pub gallery: Option<EntityId>,
}

impl Listing for Image {
    const ENTITY_TYPE: EntityType = EntityType::Image;
    const COLUMNS: &'static str = "e.id, e.title, e.created_at";
    type Filter = ImageFilter;

    fn common(filter: &Self::Filter) -> &CommonFilter {
        &filter.common
    }

    fn push_filter(filter: &Self::Filter, query: &mut QueryBuilder<'_, Sqlite>) {
        push_exists(query, "SELECT 1 FROM galleries_images WHERE image_id = e.id AND gallery_id = ", filter.gallery);
    }
}
