use crate::error::{Error, ErrorKind};
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Identifier of a user.
pub type UserId = i64;
/// Identifier of a library entity, unique within its [`EntityType`].
pub type EntityId = i64;

/// The seven kinds of library entity that visibility is tracked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Scene,
    Performer,
    Studio,
    Tag,
    Group,
    Gallery,
    Image,
}
impl EntityType {
    pub const ALL: [EntityType; 7] = [
        Self::Scene,
        Self::Performer,
        Self::Studio,
        Self::Tag,
        Self::Group,
        Self::Gallery,
        Self::Image,
    ];

    /// Value stored in the `entity_type` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Performer => "performer",
            Self::Studio => "studio",
            Self::Tag => "tag",
            Self::Group => "group",
            Self::Gallery => "gallery",
            Self::Image => "image",
        }
    }

    /// Table holding entities of this type.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Scene => "scenes",
            Self::Performer => "performers",
            Self::Studio => "studios",
            Self::Tag => "tags",
            Self::Group => "library_groups",
            Self::Gallery => "galleries",
            Self::Image => "images",
        }
    }

    /// Human-readable label column: `title` for content, `name` for everything else.
    pub fn label_column(&self) -> &'static str {
        match self {
            Self::Scene | Self::Gallery | Self::Image => "title",
            _ => "name",
        }
    }

    /// Tags, studios and groups have parent/child relationships.
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, Self::Tag | Self::Studio | Self::Group)
    }

    /// Leaf types never cascade an exclusion onto anything else.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scene | Self::Image)
    }
}
impl FromStr for EntityType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "scene" | "scenes" => Self::Scene,
            "performer" | "performers" => Self::Performer,
            "studio" | "studios" => Self::Studio,
            "tag" | "tags" => Self::Tag,
            "group" | "groups" | "movie" | "movies" => Self::Group,
            "gallery" | "galleries" => Self::Gallery,
            "image" | "images" => Self::Image,
            _ => exn::bail!(ErrorKind::UnknownEntityType(s.to_string())),
        })
    }
}
impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Why an entity is excluded for a user.
///
/// Variants are declared in precedence order: when an entity qualifies for
/// several reasons, the first one recorded wins and phases run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reason {
    /// Matched an administrator's content restriction.
    Restricted,
    /// Explicitly hidden by the user.
    Hidden,
    /// A related entity is excluded.
    Cascade,
    /// Organizational entity with no visible content left beneath it.
    Empty,
}
impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restricted => "restricted",
            Self::Hidden => "hidden",
            Self::Cascade => "cascade",
            Self::Empty => "empty",
        }
    }
}
impl FromStr for Reason {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "restricted" => Self::Restricted,
            "hidden" => Self::Hidden,
            "cascade" => Self::Cascade,
            "empty" => Self::Empty,
            _ => exn::bail!(ErrorKind::UnknownReason(s.to_string())),
        })
    }
}
impl Display for Reason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
