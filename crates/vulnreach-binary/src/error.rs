//! Error types for binary analysis

use thiserror::Error;
use vulnreach_core::DbError;

pub type Result<T> = std::result::Result<T, BinaryError>;

#[derive(Error, Debug)]
pub enum BinaryError {
    #[error("binary built with {0:?}; go1.18 or newer is required for symbol analysis")]
    UnsupportedGoVersion(String),

    #[error("binary has no embedded build information")]
    NoBuildInfo,

    #[error("symbol table unavailable: {0}")]
    NoSymbols(String),

    #[error("no database client configured")]
    NoClient,

    #[error("database error: {0}")]
    Db(DbError),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<DbError> for BinaryError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Cancelled => BinaryError::Cancelled,
            e => BinaryError::Db(e),
        }
    }
}
