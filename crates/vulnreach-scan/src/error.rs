//! Error types for source analysis

use thiserror::Error;
use vulnreach_core::DbError;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("all packages must share a single file set")]
    InconsistentFileSets,

    #[error("no database client configured")]
    NoClient,

    #[error("database error: {0}")]
    Db(DbError),

    #[error("call graph construction failed: {0}")]
    Build(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<DbError> for ScanError {
    fn from(e: DbError) -> Self {
        // Cancellation is passed through rather than wrapped.
        match e {
            DbError::Cancelled => ScanError::Cancelled,
            e => ScanError::Db(e),
        }
    }
}
