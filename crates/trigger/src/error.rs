//! Trigger Error Types

use derive_more::{Display, Error};

/// A trigger error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for trigger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The trigger named a user or entity that does not exist. Do not retry.
    #[display("rejected {_0}")]
    Rejected(#[error(not(source))] String),
    /// The triggered work failed and was rolled back; the previous exclusion
    /// set is still in place.
    #[display("{_0} failed")]
    Failed(#[error(not(source))] String),
    /// The deferred recompute queue could not be read or updated.
    #[display("deferred queue error")]
    Queue,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}
