use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

use entitle_types::EnumParseError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database stayed locked past the configured busy timeout.
    #[error("database busy")]
    Busy,
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
    /// A stored row could not be decoded into a domain value.
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
    #[error("failed to prepare database at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn corrupt(table: &'static str, detail: impl Into<String>) -> Self {
        StoreError::Corrupt {
            table,
            detail: detail.into(),
        }
    }

    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Busy)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::Busy,
            _ => StoreError::Sqlite(err),
        }
    }
}

pub(crate) fn enum_column(table: &'static str) -> impl Fn(EnumParseError) -> StoreError {
    move |err| StoreError::corrupt(table, err.to_string())
}

/// A UNIQUE or PRIMARY KEY constraint rejected the write.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
