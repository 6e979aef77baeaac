use crate::error::{Error, ErrorKind};
use crate::models::{EntityId, EntityType, Reason, UserId};
use exn::ResultExt;
use time::UtcDateTime;

/// One entity that a user cannot see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionRecord {
    pub user_id: UserId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub reason: Reason,
    pub computed_at: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ExclusionRow {
    user_id: i64,
    entity_type: String,
    entity_id: i64,
    reason: String,
    computed_at: i64,
}
impl TryFrom<ExclusionRow> for ExclusionRecord {
    type Error = Error;
    fn try_from(row: ExclusionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id,
            entity_type: row.entity_type.parse()?,
            entity_id: row.entity_id,
            reason: row.reason.parse()?,
            computed_at: UtcDateTime::from_unix_timestamp(row.computed_at)
                .or_raise(|| ErrorKind::InvalidData("computed at"))?,
        })
    }
}

/// Per-user, per-type count of entities that remain visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityStats {
    pub user_id: UserId,
    pub entity_type: EntityType,
    pub visible_count: u64,
    pub updated_at: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct StatsRow {
    user_id: i64,
    entity_type: String,
    visible_count: i64,
    updated_at: i64,
}
impl TryFrom<StatsRow> for VisibilityStats {
    type Error = Error;
    fn try_from(row: StatsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id,
            entity_type: row.entity_type.parse()?,
            visible_count: u64::try_from(row.visible_count).or_raise(|| ErrorKind::InvalidData("visible count"))?,
            updated_at: UtcDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::InvalidData("updated at"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model() {
        let now = UtcDateTime::now();
        let row = ExclusionRow {
            user_id: 1,
            entity_type: "performer".to_string(),
            entity_id: 42,
            reason: "hidden".to_string(),
            computed_at: now.unix_timestamp(),
        };
        let model = ExclusionRecord::try_from(row).unwrap();
        assert_eq!(model.entity_type, EntityType::Performer);
        assert_eq!(model.reason, Reason::Hidden);
        // Converting to a Unix timestamp (measured in seconds) strips the nanoseconds component.
        assert_eq!(model.computed_at, now.replace_nanosecond(0).unwrap());
    }

    #[test]
    fn test_row_with_unknown_reason_is_rejected() {
        let row = ExclusionRow {
            user_id: 1,
            entity_type: "scene".to_string(),
            entity_id: 1,
            reason: "forgotten".to_string(),
            computed_at: 0,
        };
        let err = ExclusionRecord::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownReason(_)));
    }

    #[test]
    fn test_negative_visible_count_is_rejected() {
        let row = StatsRow {
            user_id: 1,
            entity_type: "scene".to_string(),
            visible_count: -3,
            updated_at: 0,
        };
        assert!(VisibilityStats::try_from(row).is_err());
    }
}
