//! Query Error Types

use derive_more::{Display, Error};
use veil_store::UserId;
use veil_store::error::Result as StoreResult;

/// A query error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("unknown user: {_0}")]
    UnknownUser(#[error(not(source))] UserId),
    #[display("invalid pagination: {_0}")]
    InvalidPagination(#[error(not(source))] &'static str),
    /// The database stayed locked past the busy timeout. Queries never
    /// write, so they can always be retried.
    #[display("query timed out")]
    Timeout,
    #[display("database error")]
    Database,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::UnknownUser(_) | Self::InvalidPagination(_))
    }
}

/// Re-raise a store error, keeping lock contention retryable.
pub(crate) trait StoreResultExt<T> {
    fn or_query(self) -> Result<T>;
}

impl<T> StoreResultExt<T> for StoreResult<T> {
    #[track_caller]
    fn or_query(self) -> Result<T> {
        self.map_err(|err| {
            let kind = if err.is_retryable() { ErrorKind::Timeout } else { ErrorKind::Database };
            err.raise(kind)
        })
    }
}
