//! Per-user listings of library entities.
//!
//! Every statement issued here carries the indexed anti-join against the
//! exclusion set, so nothing a user cannot see is ever returned, counted or
//! offered as an id. Each entity type is listed through its own [`Listing`]
//! implementation with its own filter.

pub mod error;
mod items;
mod listing;

pub use crate::items::{
    Gallery, GalleryFilter, Group, GroupFilter, Image, ImageFilter, Performer, PerformerFilter, Scene, SceneFilter,
    Studio, StudioFilter, Tag, TagFilter,
};
pub use crate::listing::{
    CommonFilter, DEFAULT_PAGE_SIZE, Direction, FindOptions, Listing, MAX_PAGE_SIZE, Page, Sort, SortField,
};
use crate::error::{ErrorKind, Result, StoreResultExt};
use crate::listing::{push_order, push_visible};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use tracing::{debug, instrument};
use veil_store::error::DatabaseResultExt;
use veil_store::{Database, EntityId, EntityType, ExclusionRepository, UserId, graph};

/// A user's view of the library.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}
impl From<&Database> for Catalog {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// One page of the entities of type `T` that `user_id` can see.
    ///
    /// The page and the total are read in the same transaction.
    #[instrument(skip(self, options), fields(entity_type = %T::ENTITY_TYPE, page = options.page))]
    pub async fn find<T: Listing>(&self, user_id: UserId, options: &FindOptions<T::Filter>) -> Result<Page<T>> {
        if let Err(reason) = options.validate() {
            exn::bail!(ErrorKind::InvalidPagination(reason));
        }
        let mut tx = self.pool.begin().await.or_database().or_query()?;
        ensure_user(&mut *tx, user_id).await?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        push_visible::<T>(&mut count, user_id, &options.filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&mut *tx).await.or_database().or_query()?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT ");
        select.push(T::COLUMNS);
        push_visible::<T>(&mut select, user_id, &options.filter);
        push_order::<T>(&mut select, options.sort);
        select.push(" LIMIT ").push_bind(i64::from(options.page_size));
        select.push(" OFFSET ").push_bind(options.offset());
        let items = select.build_query_as::<T>().fetch_all(&mut *tx).await.or_database().or_query()?;
        tx.commit().await.or_database().or_query()?;

        debug!(total, items = items.len(), "listed");
        Ok(Page { items, total: u64::try_from(total).unwrap_or_default(), page: options.page, page_size: options.page_size })
    }

    /// Ids only, ascending, unpaginated. For pickers and dropdowns.
    #[instrument(skip(self, filter), fields(entity_type = %T::ENTITY_TYPE))]
    pub async fn find_ids<T: Listing>(&self, user_id: UserId, filter: &T::Filter) -> Result<Vec<EntityId>> {
        ensure_user(&self.pool, user_id).await?;
        let mut select = QueryBuilder::<Sqlite>::new("SELECT e.id");
        push_visible::<T>(&mut select, user_id, filter);
        select.push(" ORDER BY e.id");
        select.build_query_scalar::<EntityId>().fetch_all(&self.pool).await.or_database().or_query()
    }

    /// How many entities of type `T` match `filter` for this user. Without a
    /// filter this is [`visible_count`](Self::visible_count).
    #[instrument(skip(self, filter), fields(entity_type = %T::ENTITY_TYPE))]
    pub async fn count<T: Listing>(&self, user_id: UserId, filter: &T::Filter) -> Result<u64> {
        if T::is_unfiltered(filter) {
            return self.visible_count(user_id, T::ENTITY_TYPE).await;
        }
        ensure_user(&self.pool, user_id).await?;
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        push_visible::<T>(&mut count, user_id, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await.or_database().or_query()?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    /// The number of entities of a type the user can see.
    ///
    /// Read from the visibility stats; counted live if the user has never
    /// been recomputed.
    #[instrument(skip(self))]
    pub async fn visible_count(&self, user_id: UserId, entity_type: EntityType) -> Result<u64> {
        ensure_user(&self.pool, user_id).await?;
        let stats = ExclusionRepository::new(self.pool.clone()).stats(user_id, entity_type).await.or_query()?;
        if let Some(stats) = stats {
            return Ok(stats.visible_count);
        }
        debug!("no visibility stats, counting live");
        let sql = include_str!("../queries/live_count.sql").replace("{table}", entity_type.table());
        let total: i64 = sqlx::query_scalar(&sql)
            .bind(user_id)
            .bind(entity_type.as_str())
            .fetch_one(&self.pool)
            .await
            .or_database()
            .or_query()?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    pub async fn find_scenes(&self, user_id: UserId, options: &FindOptions<SceneFilter>) -> Result<Page<Scene>> {
        self.find(user_id, options).await
    }

    pub async fn find_performers(
        &self,
        user_id: UserId,
        options: &FindOptions<PerformerFilter>,
    ) -> Result<Page<Performer>> {
        self.find(user_id, options).await
    }

    pub async fn find_studios(&self, user_id: UserId, options: &FindOptions<StudioFilter>) -> Result<Page<Studio>> {
        self.find(user_id, options).await
    }

    pub async fn find_tags(&self, user_id: UserId, options: &FindOptions<TagFilter>) -> Result<Page<Tag>> {
        self.find(user_id, options).await
    }

    pub async fn find_groups(&self, user_id: UserId, options: &FindOptions<GroupFilter>) -> Result<Page<Group>> {
        self.find(user_id, options).await
    }

    pub async fn find_galleries(&self, user_id: UserId, options: &FindOptions<GalleryFilter>) -> Result<Page<Gallery>> {
        self.find(user_id, options).await
    }

    pub async fn find_images(&self, user_id: UserId, options: &FindOptions<ImageFilter>) -> Result<Page<Image>> {
        self.find(user_id, options).await
    }
}

async fn ensure_user<'e>(executor: impl SqliteExecutor<'e>, user_id: UserId) -> Result<()> {
    if !graph::user_exists(executor, user_id).await.or_query()? {
        exn::bail!(ErrorKind::UnknownUser(user_id));
    }
    Ok(())
}
