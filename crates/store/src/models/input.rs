use crate::error::{Error, ErrorKind};
use crate::models::{EntityId, EntityType, UserId};
use exn::ResultExt;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// How a [`ContentRestriction`] treats its entity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestrictionMode {
    /// Only the listed entities (and their descendants) stay visible.
    Include,
    /// The listed entities (and their descendants) are excluded.
    Exclude,
}
impl RestrictionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
        }
    }
}
impl FromStr for RestrictionMode {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "include" => Self::Include,
            "exclude" => Self::Exclude,
            _ => exn::bail!(ErrorKind::UnknownMode(s.to_string())),
        })
    }
}
impl Display for RestrictionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// An administrator-authored rule limiting what a user can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRestriction {
    pub id: i64,
    pub user_id: UserId,
    pub entity_type: EntityType,
    pub mode: RestrictionMode,
    pub entity_ids: Vec<EntityId>,
    /// How far to descend the type's hierarchy from each listed entity.
    /// `None` is unlimited, `Some(0)` is the listed entities only.
    pub hierarchy_depth: Option<u32>,
    pub active: bool,
}

#[derive(sqlx::FromRow)]
pub(crate) struct RestrictionRow {
    pub(crate) id: i64,
    pub(crate) user_id: i64,
    pub(crate) entity_type: String,
    pub(crate) mode: String,
    pub(crate) entity_ids: String,
    #[sqlx(default)]
    pub(crate) hierarchy_depth: Option<i64>,
    pub(crate) active: bool,
}
impl TryFrom<RestrictionRow> for ContentRestriction {
    type Error = Error;
    fn try_from(row: RestrictionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            entity_type: row.entity_type.parse()?,
            mode: row.mode.parse()?,
            entity_ids: serde_json::from_str(&row.entity_ids).or_raise(|| ErrorKind::InvalidData("entity ids"))?,
            hierarchy_depth: row
                .hierarchy_depth
                .map(|d| u32::try_from(d).or_raise(|| ErrorKind::InvalidData("hierarchy depth")))
                .transpose()?,
            active: row.active,
        })
    }
}
impl TryFrom<&ContentRestriction> for RestrictionRow {
    type Error = Error;
    fn try_from(restriction: &ContentRestriction) -> Result<Self, Self::Error> {
        Ok(Self {
            id: restriction.id,
            user_id: restriction.user_id,
            entity_type: restriction.entity_type.as_str().to_string(),
            mode: restriction.mode.as_str().to_string(),
            entity_ids: serde_json::to_string(&restriction.entity_ids)
                .or_raise(|| ErrorKind::InvalidData("entity ids"))?,
            hierarchy_depth: restriction.hierarchy_depth.map(i64::from),
            active: restriction.active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model() {
        let row = RestrictionRow {
            id: 7,
            user_id: 1,
            entity_type: "tag".to_string(),
            mode: "exclude".to_string(),
            entity_ids: "[3,5,8]".to_string(),
            hierarchy_depth: Some(2),
            active: true,
        };
        let model = ContentRestriction::try_from(row).unwrap();
        assert_eq!(model.entity_type, EntityType::Tag);
        assert_eq!(model.mode, RestrictionMode::Exclude);
        assert_eq!(model.entity_ids, vec![3, 5, 8]);
        assert_eq!(model.hierarchy_depth, Some(2));
    }

    #[test]
    fn test_model_to_row() {
        let model = ContentRestriction {
            id: 1,
            user_id: 2,
            entity_type: EntityType::Studio,
            mode: RestrictionMode::Include,
            entity_ids: vec![10, 11],
            hierarchy_depth: None,
            active: true,
        };
        let row = RestrictionRow::try_from(&model).unwrap();
        assert_eq!(row.entity_ids, "[10,11]");
        assert_eq!(row.mode, "include");
        assert_eq!(row.hierarchy_depth, None);
    }

    #[test]
    fn test_malformed_entity_ids_are_rejected() {
        let row = RestrictionRow {
            id: 1,
            user_id: 1,
            entity_type: "scene".to_string(),
            mode: "exclude".to_string(),
            entity_ids: "not json".to_string(),
            hierarchy_depth: None,
            active: true,
        };
        let err = ContentRestriction::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("entity ids")));
    }
}
