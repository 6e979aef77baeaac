mod entity;
mod exclusion;
mod input;

pub use self::entity::{EntityId, EntityType, Reason, UserId};
pub use self::exclusion::{ExclusionRecord, VisibilityStats};
pub(crate) use self::exclusion::{ExclusionRow, StatsRow};
pub(crate) use self::input::RestrictionRow;
pub use self::input::{ContentRestriction, RestrictionMode};
