//! SQLite storage for per-user visibility.
//!
//! One database holds three groups of tables:
//! - **Library graph**: scenes, performers, studios, tags, groups, galleries,
//!   images and their relationships. Written by the sync process, read-only
//!   to everything in this workspace.
//! - **Direct exclusion inputs**: content restrictions and user hides.
//! - **Exclusion set**: one row per (user, type, entity) that the user cannot
//!   see, the visible count per (user, type), and a durable queue of pending
//!   recomputes. These are derived and can be rebuilt from the two groups
//!   above at any time.

mod db;
pub mod deferred;
pub mod error;
mod exclusions;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod graph;
pub mod inputs;
pub mod models;

pub use crate::db::{Database, PoolSettings};
pub use crate::deferred::{DeferredRecompute, DeferredRepository};
pub use crate::exclusions::{ExclusionReport, ExclusionRepository, UserExclusions};
pub use crate::graph::Hierarchy;
pub use crate::models::{EntityId, EntityType, Reason, UserId};
