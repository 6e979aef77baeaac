use sqlx::SqliteConnection;
use std::collections::HashMap;
use veil_store::error::Result as StoreResult;
use veil_store::{EntityType, Hierarchy};

/// Hierarchies loaded lazily, at most once per unit of work, so every phase
/// of a recompute sees the same parent/child edges.
#[derive(Debug, Default)]
pub(crate) struct Hierarchies(HashMap<EntityType, Hierarchy>);

impl Hierarchies {
    /// An empty hierarchy is returned for flat types.
    pub(crate) async fn get(&mut self, conn: &mut SqliteConnection, entity_type: EntityType) -> StoreResult<&Hierarchy> {
        if !self.0.contains_key(&entity_type) {
            let hierarchy = Hierarchy::load(&mut *conn, entity_type).await?.unwrap_or_default();
            self.0.insert(entity_type, hierarchy);
        }
        Ok(&self.0[&entity_type])
    }
}
