//! Read access to the library entity graph.
//!
//! The graph is owned by the sync process. Everything here is read-only and
//! generic over the executor so the engine can read inside its recompute
//! transaction while the query layer reads straight from the pool.

use crate::error::{DatabaseResultExt, Result};
use crate::models::{EntityId, EntityType, UserId};
use exn::ResultExt;
use sqlx::SqliteExecutor;
use std::collections::{HashMap, HashSet, VecDeque};

/// Parent/child adjacency for one hierarchical entity type.
///
/// Tags form a DAG and nothing stops the sync process from writing a cycle
/// into any of the three hierarchies, so every traversal keeps a visited set
/// and runs iteratively.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    children: HashMap<EntityId, Vec<EntityId>>,
    parents: HashMap<EntityId, Vec<EntityId>>,
}

impl Hierarchy {
    /// Build from `(parent, child)` edges.
    pub fn from_edges(edges: impl IntoIterator<Item = (EntityId, EntityId)>) -> Self {
        let mut hierarchy = Self::default();
        for (parent, child) in edges {
            hierarchy.children.entry(parent).or_default().push(child);
            hierarchy.parents.entry(child).or_default().push(parent);
        }
        hierarchy
    }

    /// Load the hierarchy for `entity_type`, or `None` for flat types.
    pub async fn load<'e>(executor: impl SqliteExecutor<'e>, entity_type: EntityType) -> Result<Option<Self>> {
        let sql = match entity_type {
            EntityType::Tag => include_str!("../queries/hierarchy_tags.sql"),
            EntityType::Studio => include_str!("../queries/hierarchy_studios.sql"),
            EntityType::Group => include_str!("../queries/hierarchy_groups.sql"),
            _ => return Ok(None),
        };
        let edges: Vec<(i64, i64)> = sqlx::query_as(sql).fetch_all(executor).await.or_database()?;
        Ok(Some(Self::from_edges(edges)))
    }

    /// The roots plus everything below them, descending at most `depth`
    /// levels (`None` for unlimited).
    pub fn descendants(&self, roots: impl IntoIterator<Item = EntityId>, depth: Option<u32>) -> HashSet<EntityId> {
        Self::walk(&self.children, roots, depth)
    }

    /// The seeds plus every ancestor above them.
    pub fn ancestors(&self, seeds: impl IntoIterator<Item = EntityId>) -> HashSet<EntityId> {
        Self::walk(&self.parents, seeds, None)
    }

    fn walk(
        edges: &HashMap<EntityId, Vec<EntityId>>,
        start: impl IntoIterator<Item = EntityId>,
        depth: Option<u32>,
    ) -> HashSet<EntityId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for id in start {
            if visited.insert(id) {
                queue.push_back((id, 0u32));
            }
        }
        while let Some((id, level)) = queue.pop_front() {
            if depth.is_some_and(|max| level >= max) {
                continue;
            }
            for &next in edges.get(&id).into_iter().flatten() {
                if visited.insert(next) {
                    queue.push_back((next, level + 1));
                }
            }
        }
        visited
    }
}

pub async fn user_exists<'e>(executor: impl SqliteExecutor<'e>, user_id: UserId) -> Result<bool> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = ?)")
        .bind(user_id)
        .fetch_one(executor)
        .await
        .or_database()
}

pub async fn list_user_ids<'e>(executor: impl SqliteExecutor<'e>) -> Result<Vec<UserId>> {
    sqlx::query_scalar("SELECT id FROM users ORDER BY id").fetch_all(executor).await.or_database()
}

pub async fn entity_exists<'e>(
    executor: impl SqliteExecutor<'e>,
    entity_type: EntityType,
    entity_id: EntityId,
) -> Result<bool> {
    // Table names come from a closed enum, never from user input.
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = ?)", entity_type.table());
    sqlx::query_scalar(&sql).bind(entity_id).fetch_one(executor).await.or_database()
}

pub async fn count_entities<'e>(executor: impl SqliteExecutor<'e>, entity_type: EntityType) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", entity_type.table());
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(executor).await.or_database()?;
    u64::try_from(count).or_raise(|| crate::error::ErrorKind::InvalidData("entity count"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tree() -> Hierarchy {
        //      1
        //     / \
        //    2   3
        //    |   |
        //    4   5
        //    |
        //    6
        Hierarchy::from_edges([(1, 2), (1, 3), (2, 4), (3, 5), (4, 6)])
    }

    #[rstest]
    #[case(Some(0), vec![1])]
    #[case(Some(1), vec![1, 2, 3])]
    #[case(Some(2), vec![1, 2, 3, 4, 5])]
    #[case(None, vec![1, 2, 3, 4, 5, 6])]
    fn test_descendants_respect_depth(#[case] depth: Option<u32>, #[case] expected: Vec<EntityId>) {
        let mut found: Vec<_> = tree().descendants([1], depth).into_iter().collect();
        found.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_ancestors_of_leaf() {
        let mut found: Vec<_> = tree().ancestors([6]).into_iter().collect();
        found.sort();
        assert_eq!(found, vec![1, 2, 4, 6]);
    }

    #[test]
    fn test_cycles_terminate() {
        let cyclic = Hierarchy::from_edges([(1, 2), (2, 3), (3, 1), (3, 4)]);
        let mut found: Vec<_> = cyclic.descendants([2], None).into_iter().collect();
        found.sort();
        assert_eq!(found, vec![1, 2, 3, 4]);
        assert_eq!(cyclic.ancestors([4]).len(), 4);
    }

    #[test]
    fn test_dag_with_shared_child_visits_once() {
        let dag = Hierarchy::from_edges([(1, 3), (2, 3), (3, 4)]);
        assert_eq!(dag.ancestors([4]).len(), 4);
        assert_eq!(dag.descendants([1, 2], None).len(), 4);
    }

    #[test]
    fn test_unknown_root_is_kept() {
        assert_eq!(tree().descendants([99], None), HashSet::from([99]));
    }

    #[tokio::test]
    async fn test_load_from_database() {
        use crate::Database;
        use crate::fixtures::Library;

        let db = Database::connect_in_memory().await.unwrap();
        Library::new(&db)
            .user(1, "alice")
            .await
            .studio(1, "Network", None)
            .await
            .studio(2, "Label", Some(1))
            .await
            .tag(1, "Outdoor")
            .await
            .tag(2, "Beach")
            .await
            .tag_parent(1, 2)
            .await
            .scene(1, "Sunset", Some(2))
            .await;

        let studios = Hierarchy::load(db.pool(), EntityType::Studio).await.unwrap().unwrap();
        assert_eq!(studios.descendants([1], None), HashSet::from([1, 2]));
        let tags = Hierarchy::load(db.pool(), EntityType::Tag).await.unwrap().unwrap();
        assert_eq!(tags.ancestors([2]), HashSet::from([1, 2]));
        assert!(Hierarchy::load(db.pool(), EntityType::Scene).await.unwrap().is_none());

        assert!(user_exists(db.pool(), 1).await.unwrap());
        assert!(!user_exists(db.pool(), 2).await.unwrap());
        assert_eq!(list_user_ids(db.pool()).await.unwrap(), vec![1]);
        assert!(entity_exists(db.pool(), EntityType::Scene, 1).await.unwrap());
        assert!(!entity_exists(db.pool(), EntityType::Group, 1).await.unwrap());
        assert_eq!(count_entities(db.pool(), EntityType::Studio).await.unwrap(), 2);
    }
}
