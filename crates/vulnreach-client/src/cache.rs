//! Database cache
//!
//! The HTTP source consults a pluggable cache so repeated scans do not
//! re-download the index and per-module entry lists. Implementations must
//! tolerate concurrent use from several analyses keyed by database name.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vulnreach_core::{DbError, DbIndex, DbResult};
use vulnreach_osv::Entry;

use crate::escape::escape_module_path;

/// Cache capability used by [`crate::HttpSource`], keyed by database name
/// (the host part of the base URL).
pub trait Cache: Send + Sync {
    /// Returns the cached index and the time it was retrieved, if present.
    fn read_index(&self, db: &str) -> DbResult<Option<(DbIndex, DateTime<Utc>)>>;
    fn write_index(&self, db: &str, index: &DbIndex, retrieved: DateTime<Utc>) -> DbResult<()>;
    /// Returns the cached entry list for one module, if present.
    fn read_entries(&self, db: &str, module: &str) -> DbResult<Option<Vec<Entry>>>;
    fn write_entries(&self, db: &str, module: &str, entries: &[Entry]) -> DbResult<()>;
}

#[derive(Serialize, Deserialize)]
struct CachedIndex {
    retrieved: DateTime<Utc>,
    index: DbIndex,
}

/// Filesystem cache: `<root>/<db>/index.json` plus one
/// `<root>/<db>/<escaped-module>.json` per module.
pub struct FsCache {
    root: PathBuf,
    // Serializes writers within this process; cross-process safety comes
    // from write-to-temp-then-rename.
    lock: Mutex<()>,
}

impl FsCache {
    pub fn new(root: PathBuf) -> Self {
        FsCache {
            root,
            lock: Mutex::new(()),
        }
    }

    fn index_path(&self, db: &str) -> PathBuf {
        self.root.join(db).join("index.json")
    }

    fn entries_path(&self, db: &str, module: &str) -> DbResult<PathBuf> {
        let escaped = escape_module_path(module)?;
        let file = escaped.replace('/', "_") + ".json";
        Ok(self.root.join(db).join(file))
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &PathBuf) -> DbResult<Option<T>> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DbError::Io {
                    path: path.clone(),
                    source: e,
                })
            }
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| DbError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(value))
    }

    fn write_json<T: Serialize>(&self, path: &PathBuf, value: &T) -> DbResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let io_err = |e: io::Error| DbError::Io {
            path: path.clone(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec(value).map_err(|e| DbError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

impl Cache for FsCache {
    fn read_index(&self, db: &str) -> DbResult<Option<(DbIndex, DateTime<Utc>)>> {
        Ok(self
            .read_json::<CachedIndex>(&self.index_path(db))?
            .map(|c| (c.index, c.retrieved)))
    }

    fn write_index(&self, db: &str, index: &DbIndex, retrieved: DateTime<Utc>) -> DbResult<()> {
        self.write_json(
            &self.index_path(db),
            &CachedIndex {
                retrieved,
                index: index.clone(),
            },
        )
    }

    fn read_entries(&self, db: &str, module: &str) -> DbResult<Option<Vec<Entry>>> {
        self.read_json(&self.entries_path(db, module)?)
    }

    fn write_entries(&self, db: &str, module: &str, entries: &[Entry]) -> DbResult<()> {
        self.write_json(&self.entries_path(db, module)?, &entries)
    }
}
