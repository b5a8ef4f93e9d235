//! Vulnerability database client
//!
//! Implements the `vulnreach_core::Source` capability set against the
//! standard database layout:
//!
//! - `index.json`: module path to last modification time
//! - `<escaped-module-path>.json`: entries for one module
//! - `ID/<identifier>.json`, `ID/index.json`: entries by identifier
//! - `aliases.json`: external identifier to internal identifiers
//!
//! Sources are HTTP(S) endpoints or local directory trees; several sources
//! compose into one client that merges their answers. The HTTP source
//! consults a pluggable cache with a two-hour index freshness window and
//! conditional refetches.

pub mod cache;
pub mod escape;
pub mod http;
pub mod local;
pub mod multi;

pub use cache::{Cache, FsCache};
pub use escape::{escape_module_path, unescape_module_path};
pub use http::HttpSource;
pub use local::DirSource;
pub use multi::MultiSource;

use std::path::{Path, PathBuf};

use vulnreach_core::{DbError, DbResult};

/// Builds a client over a list of database source URIs.
///
/// Accepted schemes are `http://`, `https://`, and `file://`; a trailing
/// slash is stripped. When `cache_dir` is set, HTTP sources cache their
/// indexes and per-module entry lists beneath it, keyed by database host.
pub fn from_uris(uris: &[String], cache_dir: Option<&Path>) -> DbResult<MultiSource> {
    let mut sources: Vec<Box<dyn vulnreach_core::Source>> = Vec::new();
    for uri in uris {
        let uri = uri.trim_end_matches('/');
        if uri.starts_with("http://") || uri.starts_with("https://") {
            let cache: Option<Box<dyn Cache>> = match cache_dir {
                Some(dir) => Some(Box::new(FsCache::new(dir.to_path_buf()))),
                None => None,
            };
            sources.push(Box::new(HttpSource::new(uri, cache)));
        } else if let Some(path) = uri.strip_prefix("file://") {
            sources.push(Box::new(DirSource::new(PathBuf::from(path))?));
        } else {
            return Err(DbError::UnsupportedScheme(uri.to_string()));
        }
    }
    Ok(MultiSource::new(sources))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uris_rejects_unknown_scheme() {
        let err = from_uris(&["ftp://vuln.example.com".to_string()], None).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedScheme(_)));
    }

    #[test]
    fn test_from_uris_rejects_missing_directory() {
        let err = from_uris(&["file:///no/such/dir".to_string()], None).unwrap_err();
        assert!(matches!(err, DbError::NotADirectory(_)));
    }
}
