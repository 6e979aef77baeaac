//! Per-user exclusion set computation.
//!
//! The [`Engine`] is the only writer of the exclusion set. It offers:
//! - a full recompute for one user ([`Engine::recompute_for_user`]) or for
//!   everyone ([`Engine::recompute_all_users`]), each user's run being one
//!   transaction of five ordered [phases](Phase);
//! - a fast incremental hide ([`Engine::add_hidden_entity`]) that excludes
//!   the entity and cascades outward from it only;
//! - a non-blocking unhide ([`Engine::remove_hidden_entity`]) that removes
//!   the raw hide and queues a durable full recompute, since other sources
//!   may still exclude the entity. Until that recompute commits, the set may
//!   over-exclude but never under-exclude.

mod cascade;
mod direct;
mod empty;
pub mod error;
mod hide;
mod hierarchies;
mod phase;
mod recompute;
mod stats;

pub use crate::hide::HideOutcome;
pub use crate::phase::Phase;
pub use crate::recompute::{RecomputeReport, Recomputed};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqlitePool;
use veil_store::error::{ErrorKind as StoreErrorKind, Result as StoreResult};
use veil_store::{Database, EntityId, EntityType, UserId, graph};

/// Users recomputed at once by [`Engine::recompute_all_users`].
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct Engine {
    pool: SqlitePool,
    concurrency: usize,
}
impl From<&Database> for Engine {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Engine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, concurrency: DEFAULT_CONCURRENCY }
    }

    /// Limit how many users [`recompute_all_users`](Self::recompute_all_users)
    /// works on at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn ensure_user(&self, user_id: UserId) -> Result<()> {
        if !graph::user_exists(&self.pool, user_id).await.or_raise(|| ErrorKind::Store)? {
            exn::bail!(ErrorKind::UnknownUser(user_id));
        }
        Ok(())
    }

    async fn ensure_entity(&self, entity_type: EntityType, entity_id: EntityId) -> Result<()> {
        if !graph::entity_exists(&self.pool, entity_type, entity_id).await.or_raise(|| ErrorKind::Store)? {
            exn::bail!(ErrorKind::UnknownEntity { entity_type, entity_id });
        }
        Ok(())
    }
}

/// Encode ids for binding to `json_each(?)`.
pub(crate) fn json_ids(ids: impl IntoIterator<Item = EntityId>) -> StoreResult<String> {
    let ids: Vec<EntityId> = ids.into_iter().collect();
    serde_json::to_string(&ids).or_raise(|| StoreErrorKind::InvalidData("entity ids"))
}
