//! On-disk database source

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use vulnreach_core::{CancelToken, DbError, DbIndex, DbResult, Source};
use vulnreach_osv::Entry;

use crate::escape::escape_module_path;

/// A database stored as a local directory tree with the same layout an HTTP
/// source serves.
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: PathBuf) -> DbResult<Self> {
        if !dir.is_dir() {
            return Err(DbError::NotADirectory(dir));
        }
        Ok(DirSource { dir })
    }

    /// Reads and parses one JSON document. `Ok(None)` when the file does
    /// not exist; any other I/O error propagates.
    fn read_json<T: DeserializeOwned>(&self, rel: &str, cancel: &CancelToken) -> DbResult<Option<T>> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let path = self.dir.join(rel);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DbError::Io { path, source: e }),
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| DbError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(value))
    }

    fn require_json<T: DeserializeOwned>(&self, rel: &str, cancel: &CancelToken) -> DbResult<T> {
        self.read_json(rel, cancel)?.ok_or_else(|| DbError::Io {
            path: self.dir.join(rel),
            source: io::Error::new(io::ErrorKind::NotFound, "file not found"),
        })
    }
}

impl Source for DirSource {
    fn index(&self, cancel: &CancelToken) -> DbResult<DbIndex> {
        self.require_json("index.json", cancel)
    }

    fn get_by_module(&self, module: &str, cancel: &CancelToken) -> DbResult<Vec<Entry>> {
        let index = self.index(cancel)?;
        if !index.contains_key(module) {
            return Ok(Vec::new());
        }
        let escaped = escape_module_path(module)?;
        // A module listed in the index without its own file simply has no
        // entries.
        Ok(self
            .read_json(&format!("{escaped}.json"), cancel)?
            .unwrap_or_default())
    }

    fn get_by_id(&self, id: &str, cancel: &CancelToken) -> DbResult<Option<Entry>> {
        self.read_json(&format!("ID/{id}.json"), cancel)
    }

    fn get_by_alias(&self, alias: &str, cancel: &CancelToken) -> DbResult<Vec<Entry>> {
        let aliases: HashMap<String, Vec<String>> = self.require_json("aliases.json", cancel)?;
        let Some(ids) = aliases.get(alias) else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for id in ids {
            if let Some(entry) = self.get_by_id(id, cancel)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn list_ids(&self, cancel: &CancelToken) -> DbResult<Vec<String>> {
        let mut ids: Vec<String> = self.require_json("ID/index.json", cancel)?;
        ids.sort();
        Ok(ids)
    }

    fn last_modified(&self, cancel: &CancelToken) -> DbResult<DateTime<Utc>> {
        let index = self.index(cancel)?;
        index
            .values()
            .max()
            .copied()
            .ok_or_else(|| DbError::Malformed {
                path: self.dir.join("index.json").display().to_string(),
                message: "empty index".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn write(dir: &std::path::Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn database() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "index.json",
            r#"{"example.com/m": "2023-01-01T00:00:00Z", "github.com/Big/mod": "2023-02-01T00:00:00Z"}"#,
        );
        write(
            dir.path(),
            "example.com/m.json",
            r#"[{"id": "GO-2023-0001", "modified": "2023-01-01T00:00:00Z"}]"#,
        );
        write(
            dir.path(),
            "github.com/!big/mod.json",
            r#"[{"id": "GO-2023-0002"}]"#,
        );
        write(
            dir.path(),
            "ID/GO-2023-0001.json",
            r#"{"id": "GO-2023-0001", "aliases": ["CVE-2023-12345"]}"#,
        );
        write(dir.path(), "ID/index.json", r#"["GO-2023-0002", "GO-2023-0001"]"#);
        write(
            dir.path(),
            "aliases.json",
            r#"{"CVE-2023-12345": ["GO-2023-0001"]}"#,
        );
        dir
    }

    #[test]
    fn test_rejects_missing_directory() {
        assert!(matches!(
            DirSource::new(PathBuf::from("/no/such/database")),
            Err(DbError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_get_by_module() {
        let dir = database();
        let source = DirSource::new(dir.path().to_path_buf()).unwrap();
        let cancel = CancelToken::new();

        let entries = source.get_by_module("example.com/m", &cancel).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "GO-2023-0001");

        // Escaped on disk, queried by real path.
        let entries = source.get_by_module("github.com/Big/mod", &cancel).unwrap();
        assert_eq!(entries.len(), 1);

        // Not in the index: empty, no error.
        assert!(source
            .get_by_module("example.com/absent", &cancel)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_get_by_id_and_alias() {
        let dir = database();
        let source = DirSource::new(dir.path().to_path_buf()).unwrap();
        let cancel = CancelToken::new();

        let entry = source.get_by_id("GO-2023-0001", &cancel).unwrap().unwrap();
        assert_eq!(entry.id, "GO-2023-0001");
        assert!(source.get_by_id("GO-9999-9999", &cancel).unwrap().is_none());

        let entries = source.get_by_alias("CVE-2023-12345", &cancel).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(source.get_by_alias("CVE-0000-0000", &cancel).unwrap().is_empty());
    }

    #[test]
    fn test_list_ids_sorted() {
        let dir = database();
        let source = DirSource::new(dir.path().to_path_buf()).unwrap();
        let ids = source.list_ids(&CancelToken::new()).unwrap();
        assert_eq!(ids, vec!["GO-2023-0001", "GO-2023-0002"]);
    }

    #[test]
    fn test_last_modified_is_index_maximum() {
        let dir = database();
        let source = DirSource::new(dir.path().to_path_buf()).unwrap();
        let got = source.last_modified(&CancelToken::new()).unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_cancellation() {
        let dir = database();
        let source = DirSource::new(dir.path().to_path_buf()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            source.get_by_module("example.com/m", &cancel),
            Err(DbError::Cancelled)
        ));
    }
}
