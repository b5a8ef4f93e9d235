//! Database source abstraction
//!
//! A vulnerability database is served either over HTTP(S) or from a local
//! directory tree; both kinds expose the same capability set, and a
//! multi-source client merges several of them. The implementations live in
//! `vulnreach-client`; the analyzers only see this trait.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;
use vulnreach_osv::Entry;

use crate::cancel::CancelToken;

/// Mapping from module import path to the timestamp of its most recent
/// change, as served by the database's `index.json`.
pub type DbIndex = HashMap<String, DateTime<Utc>>;

pub type DbResult<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("unsupported database source scheme in {0:?} (use http://, https://, or file://)")]
    UnsupportedScheme(String),

    #[error("database source is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("malformed document at {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid module path {path}: {message}")]
    InvalidModulePath { path: String, message: String },

    #[error("cache failure for database {db}: {message}")]
    Cache { db: String, message: String },

    #[error("operation cancelled")]
    Cancelled,
}

/// The capability set of one vulnerability database.
pub trait Source: Send + Sync {
    /// Returns the database index: module path → last modification time.
    fn index(&self, cancel: &CancelToken) -> DbResult<DbIndex>;

    /// Returns all entries affecting the given module path, or an empty list
    /// when the database has none. Module paths absent from the index must
    /// not trigger a per-module request.
    fn get_by_module(&self, module: &str, cancel: &CancelToken) -> DbResult<Vec<Entry>>;

    /// Returns the entry with the given identifier, if any.
    fn get_by_id(&self, id: &str, cancel: &CancelToken) -> DbResult<Option<Entry>>;

    /// Returns all entries carrying the given external identifier as an
    /// alias.
    fn get_by_alias(&self, alias: &str, cancel: &CancelToken) -> DbResult<Vec<Entry>>;

    /// Returns the lexicographically sorted list of all entry identifiers.
    fn list_ids(&self, cancel: &CancelToken) -> DbResult<Vec<String>>;

    /// Returns the time of the most recent change in the database.
    fn last_modified(&self, cancel: &CancelToken) -> DbResult<DateTime<Utc>>;
}
