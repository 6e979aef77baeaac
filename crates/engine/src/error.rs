//! Engine Error Types
//!
//! Mutation-path failures carry the user, and for recomputes the failing
//! phase, so the trigger layer can log and retry without unpacking the
//! error tree.

use crate::Phase;
use derive_more::{Display, Error};
use veil_store::{EntityId, EntityType, UserId};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Rejected before anything was written.
    #[display("unknown user: {_0}")]
    UnknownUser(#[error(not(source))] UserId),
    /// Rejected before anything was written.
    #[display("unknown {entity_type}: {entity_id}")]
    UnknownEntity { entity_type: EntityType, entity_id: EntityId },
    /// The recompute transaction was rolled back; the previous exclusion set
    /// is still in place.
    #[display("recompute for user {user_id} failed in {phase} phase")]
    Computation { user_id: UserId, phase: Phase },
    /// The hide transaction was rolled back; the entity is still visible.
    #[display("hiding {entity_type} {entity_id} for user {user_id} failed")]
    Hide { user_id: UserId, entity_type: EntityType, entity_id: EntityId },
    /// The unhide transaction was rolled back; the entity is still hidden.
    #[display("unhiding {entity_type} {entity_id} for user {user_id} failed")]
    Unhide { user_id: UserId, entity_type: EntityType, entity_id: EntityId },
    /// Reading the graph to validate a request failed.
    #[display("storage error")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Every mutation rolls back as a unit, so anything that is not a
    /// validation failure left the stored state intact and can be retried.
    pub fn is_retryable(&self) -> bool {
        !self.is_invalid_input()
    }

    /// Returns `true` if the request itself was at fault.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::UnknownUser(_) | Self::UnknownEntity { .. })
    }
}
