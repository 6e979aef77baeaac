use std::fmt::{Display, Formatter, Result as FmtResult};

/// The ordered steps of a full recompute. Each one reads what the previous
/// one wrote, inside the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Delete the user's existing exclusion rows.
    Clear,
    /// Restrictions and hides.
    Direct,
    /// Fixed type-directed relationship rules.
    Cascade,
    /// Organizational entities with nothing visible beneath them.
    Empty,
    /// Visible counts per type.
    Stats,
}
impl Phase {
    pub const ORDER: [Phase; 5] = [Self::Clear, Self::Direct, Self::Cascade, Self::Empty, Self::Stats];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Direct => "direct",
            Self::Cascade => "cascade",
            Self::Empty => "empty",
            Self::Stats => "stats",
        }
    }
}
impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
