//! HTTP database source

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;
use vulnreach_core::{CancelToken, DbError, DbIndex, DbResult, Source};
use vulnreach_osv::Entry;

use crate::cache::Cache;
use crate::escape::escape_module_path;

/// How long a cached index is served without consulting the network.
const INDEX_FRESHNESS: i64 = 2 * 60 * 60;

/// A database served over HTTP(S).
pub struct HttpSource {
    base: String,
    host: String,
    agent: ureq::Agent,
    cache: Option<Box<dyn Cache>>,
    requests: AtomicUsize,
}

impl HttpSource {
    /// Creates a source for `base` (scheme + host + optional prefix, no
    /// trailing slash). `cache` stores indexes and entry lists keyed by the
    /// host part of `base`.
    pub fn new(base: impl Into<String>, cache: Option<Box<dyn Cache>>) -> Self {
        let base = base.into();
        let host = base
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or("")
            .to_string();
        HttpSource {
            base,
            host,
            agent: ureq::agent(),
            cache,
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of network requests issued so far. Test observability only.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn get_json<T: DeserializeOwned>(&self, rel: &str, cancel: &CancelToken) -> DbResult<Option<T>> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let url = format!("{}/{}", self.base, rel);
        self.requests.fetch_add(1, Ordering::SeqCst);
        debug!(url = %url, "database request");
        match self.agent.get(&url).call() {
            Ok(resp) => {
                let parsed = resp.into_json::<T>().map_err(|e| DbError::Malformed {
                    path: url.clone(),
                    message: e.to_string(),
                })?;
                Ok(Some(parsed))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(code, _)) => Err(DbError::Status { url, status: code }),
            Err(e) => Err(DbError::Transport {
                url,
                message: e.to_string(),
            }),
        }
    }

    /// Fetches `index.json`, conditionally when `since` is set. Returns
    /// `None` on a not-modified response.
    fn fetch_index(
        &self,
        since: Option<DateTime<Utc>>,
        cancel: &CancelToken,
    ) -> DbResult<Option<DbIndex>> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let url = format!("{}/index.json", self.base);
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut request = self.agent.get(&url);
        if let Some(since) = since {
            request = request.set("If-Modified-Since", &http_date(since));
        }
        match request.call() {
            Ok(resp) => {
                let index = resp.into_json::<DbIndex>().map_err(|e| DbError::Malformed {
                    path: url.clone(),
                    message: e.to_string(),
                })?;
                Ok(Some(index))
            }
            Err(ureq::Error::Status(304, _)) => Ok(None),
            Err(ureq::Error::Status(code, _)) => Err(DbError::Status { url, status: code }),
            Err(e) => Err(DbError::Transport {
                url,
                message: e.to_string(),
            }),
        }
    }
}

impl Source for HttpSource {
    fn index(&self, cancel: &CancelToken) -> DbResult<DbIndex> {
        let Some(cache) = &self.cache else {
            return self
                .fetch_index(None, cancel)?
                .ok_or_else(|| unexpected_not_modified(&self.base));
        };
        if let Some((cached, retrieved)) = cache.read_index(&self.host)? {
            if Utc::now() - retrieved < Duration::seconds(INDEX_FRESHNESS) {
                debug!(db = %self.host, "index cache fresh");
                return Ok(cached);
            }
            return match self.fetch_index(Some(retrieved), cancel)? {
                // Not modified: the cached index is still current, only its
                // retrieval timestamp moves forward.
                None => {
                    cache.write_index(&self.host, &cached, Utc::now())?;
                    Ok(cached)
                }
                Some(fresh) => {
                    cache.write_index(&self.host, &fresh, Utc::now())?;
                    Ok(fresh)
                }
            };
        }
        let fresh = self
            .fetch_index(None, cancel)?
            .ok_or_else(|| unexpected_not_modified(&self.base))?;
        cache.write_index(&self.host, &fresh, Utc::now())?;
        Ok(fresh)
    }

    fn get_by_module(&self, module: &str, cancel: &CancelToken) -> DbResult<Vec<Entry>> {
        let index = self.index(cancel)?;
        // Only module paths listed in the index are ever sent to the
        // server, so private module names never leak into request logs.
        let Some(index_modified) = index.get(module) else {
            return Ok(Vec::new());
        };
        if let Some(cache) = &self.cache {
            if let Some(entries) = cache.read_entries(&self.host, module)? {
                let newest = entries.iter().filter_map(|e| e.modified).max();
                if newest.is_some_and(|n| n >= *index_modified) {
                    debug!(db = %self.host, module, "entry cache fresh");
                    return Ok(entries);
                }
            }
        }
        let escaped = escape_module_path(module)?;
        let entries: Vec<Entry> = self
            .get_json(&format!("{escaped}.json"), cancel)?
            .unwrap_or_default();
        if let Some(cache) = &self.cache {
            cache.write_entries(&self.host, module, &entries)?;
        }
        Ok(entries)
    }

    fn get_by_id(&self, id: &str, cancel: &CancelToken) -> DbResult<Option<Entry>> {
        self.get_json(&format!("ID/{id}.json"), cancel)
    }

    fn get_by_alias(&self, alias: &str, cancel: &CancelToken) -> DbResult<Vec<Entry>> {
        let aliases: HashMap<String, Vec<String>> = self
            .get_json("aliases.json", cancel)?
            .unwrap_or_default();
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
        let mut ids: Vec<String> = self
            .get_json("ID/index.json", cancel)?
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    fn last_modified(&self, cancel: &CancelToken) -> DbResult<DateTime<Utc>> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let url = format!("{}/index.json", self.base);
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.agent.head(&url).call() {
            Ok(resp) => {
                let header = resp.header("Last-Modified").ok_or_else(|| DbError::Malformed {
                    path: url.clone(),
                    message: "missing Last-Modified header".to_string(),
                })?;
                parse_http_date(header).ok_or_else(|| DbError::Malformed {
                    path: url,
                    message: format!("unparseable Last-Modified header {header:?}"),
                })
            }
            Err(ureq::Error::Status(code, _)) => Err(DbError::Status { url, status: code }),
            Err(e) => Err(DbError::Transport {
                url,
                message: e.to_string(),
            }),
        }
    }
}

fn unexpected_not_modified(base: &str) -> DbError {
    DbError::Transport {
        url: format!("{base}/index.json"),
        message: "not-modified response to an unconditional request".to_string(),
    }
}

fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an HTTP `Last-Modified` value. Single-digit days, as in
/// `Mon, 2 Jan 2006 15:04:05 GMT`, are accepted.
fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_http_date_round_trip() {
        let t = Utc.with_ymd_and_hms(2023, 1, 2, 15, 4, 5).unwrap();
        let formatted = http_date(t);
        assert_eq!(formatted, "Mon, 02 Jan 2023 15:04:05 GMT");
        assert_eq!(parse_http_date(&formatted).unwrap(), t);
    }

    #[test]
    fn test_parse_single_digit_day() {
        let t = parse_http_date("Mon, 2 Jan 2006 15:04:05 GMT").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap());
    }

    #[test]
    fn test_host_extraction() {
        let source = HttpSource::new("https://vuln.example.com/db", None);
        assert_eq!(source.host, "vuln.example.com");
        assert_eq!(source.request_count(), 0);
    }
}
