use derive_more::Display;
use veil_engine::{HideOutcome, RecomputeReport, Recomputed};
use veil_store::{EntityId, EntityType, UserId};

/// Something that happened outside the engine and changes what users see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Trigger {
    /// The library sync finished; any relationship may have changed.
    #[display("sync completed")]
    SyncCompleted,
    /// An administrator created, edited or (de)activated a restriction.
    #[display("restriction changed for user {user_id}")]
    RestrictionChanged { user_id: UserId },
    #[display("user {user_id} hid {entity_type} {entity_id}")]
    Hidden { user_id: UserId, entity_type: EntityType, entity_id: EntityId },
    #[display("user {user_id} unhid {entity_type} {entity_id}")]
    Unhidden { user_id: UserId, entity_type: EntityType, entity_id: EntityId },
}

/// What dispatching a [`Trigger`] did.
#[derive(Debug)]
pub enum Outcome {
    RecomputedAll(RecomputeReport),
    Recomputed(Recomputed),
    Hidden(HideOutcome),
    /// `queued` is `false` when the entity was not hidden to begin with.
    Unhidden { queued: bool },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Trigger::SyncCompleted, "sync completed")]
    #[case(Trigger::RestrictionChanged { user_id: 3 }, "restriction changed for user 3")]
    #[case(Trigger::Hidden { user_id: 1, entity_type: EntityType::Group, entity_id: 9 }, "user 1 hid group 9")]
    #[case(Trigger::Unhidden { user_id: 1, entity_type: EntityType::Tag, entity_id: 2 }, "user 1 unhid tag 2")]
    fn test_display(#[case] trigger: Trigger, #[case] expected: &str) {
        assert_eq!(trigger.to_string(), expected);
    }
}
