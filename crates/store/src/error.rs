//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use exn::ResultExt;

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    /// The database was locked or the pool could not hand out a connection
    /// in time. Nothing was written; the operation can be retried.
    #[display("database busy")]
    Busy,
    #[display("database migration error")]
    Migration,
    #[display("unknown entity type: {_0}")]
    UnknownEntityType(#[error(not(source))] String),
    #[display("unknown exclusion reason: {_0}")]
    UnknownReason(#[error(not(source))] String),
    #[display("unknown restriction mode: {_0}")]
    UnknownMode(#[error(not(source))] String),
    /// Serialization/deserialization error.
    #[display("invalid stored data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    fn classify(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::Busy,
            // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
            sqlx::Error::Database(db) => match db.code().and_then(|c| c.parse::<i32>().ok()) {
                Some(code) if matches!(code & 0xff, 5 | 6) => Self::Busy,
                _ => Self::Database,
            },
            _ => Self::Database,
        }
    }
}

/// Raise a [`sqlx::Error`] into the store error tree, classifying lock
/// contention as [`ErrorKind::Busy`] and everything else as
/// [`ErrorKind::Database`].
pub trait DatabaseResultExt<T> {
    fn or_database(self) -> Result<T>;
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, sqlx::Error> {
    #[track_caller]
    fn or_database(self) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = ErrorKind::classify(&err);
                Err(err).or_raise(|| kind)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err: std::result::Result<(), sqlx::Error> = Err(sqlx::Error::PoolTimedOut);
        let err = err.or_database().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_row_not_found_is_not_retryable() {
        let err: std::result::Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let err = err.or_database().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Database));
        assert!(!err.is_retryable());
    }
}
