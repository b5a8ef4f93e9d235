//! End-to-end client scenarios against a local fixture server.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use vulnreach_client::{Cache, HttpSource};
use vulnreach_core::{CancelToken, DbIndex, DbResult, Source};
use vulnreach_osv::Entry;

/// Minimal HTTP server serving canned JSON documents and counting requests
/// per path. Closes every connection after one response.
struct FixtureServer {
    base: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    not_modified: Arc<AtomicBool>,
}

impl FixtureServer {
    fn start(responses: HashMap<String, String>) -> FixtureServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let not_modified = Arc::new(AtomicBool::new(false));

        let thread_hits = hits.clone();
        let thread_not_modified = not_modified.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut buf = [0u8; 4096];
                let mut request = Vec::new();
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            request.extend_from_slice(&buf[..n]);
                            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                let request = String::from_utf8_lossy(&request).into_owned();
                let mut lines = request.lines();
                let Some(request_line) = lines.next() else { continue };
                let mut parts = request_line.split_whitespace();
                let _method = parts.next().unwrap_or("");
                let path = parts.next().unwrap_or("").to_string();
                let conditional = lines.any(|l| {
                    l.to_ascii_lowercase().starts_with("if-modified-since:")
                });

                *thread_hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                let response = if path == "/index.json"
                    && conditional
                    && thread_not_modified.load(Ordering::SeqCst)
                {
                    "HTTP/1.1 304 Not Modified\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
                        .to_string()
                } else if let Some(body) = responses.get(&path) {
                    format!(
                        "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    )
                } else {
                    "HTTP/1.1 404 Not Found\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
                        .to_string()
                };
                let _ = stream.write_all(response.as_bytes());
            }
        });

        FixtureServer {
            base,
            hits,
            not_modified,
        }
    }

    fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

/// Cache variant that marks entries read from it so tests can tell cache
/// hits from network fetches.
#[derive(Clone, Default)]
struct MarkingCache {
    state: Arc<Mutex<CacheState>>,
}

#[derive(Default)]
struct CacheState {
    index: Option<(DbIndex, DateTime<Utc>)>,
    entries: HashMap<String, Vec<Entry>>,
}

impl Cache for MarkingCache {
    fn read_index(&self, _db: &str) -> DbResult<Option<(DbIndex, DateTime<Utc>)>> {
        Ok(self.state.lock().unwrap().index.clone())
    }

    fn write_index(&self, _db: &str, index: &DbIndex, retrieved: DateTime<Utc>) -> DbResult<()> {
        self.state.lock().unwrap().index = Some((index.clone(), retrieved));
        Ok(())
    }

    fn read_entries(&self, _db: &str, module: &str) -> DbResult<Option<Vec<Entry>>> {
        Ok(self.state.lock().unwrap().entries.get(module).map(|entries| {
            entries
                .iter()
                .map(|e| {
                    let mut marked = e.clone();
                    marked.details = format!("cached: {}", marked.details);
                    marked
                })
                .collect()
        }))
    }

    fn write_entries(&self, _db: &str, module: &str, entries: &[Entry]) -> DbResult<()> {
        self.state
            .lock()
            .unwrap()
            .entries
            .insert(module.to_string(), entries.to_vec());
        Ok(())
    }
}

fn entry_json(id: &str, modified: &str) -> String {
    format!(r#"[{{"id": "{id}", "modified": "{modified}", "details": "remote"}}]"#)
}

#[test]
fn test_index_guards_per_module_requests() {
    let mut responses = HashMap::new();
    responses.insert(
        "/index.json".to_string(),
        r#"{"a": "2023-01-01T00:00:00Z", "b": "2023-01-01T00:00:00Z"}"#.to_string(),
    );
    responses.insert("/a.json".to_string(), entry_json("GO-2023-0001", "2023-01-01T00:00:00Z"));
    responses.insert("/b.json".to_string(), entry_json("GO-2023-0002", "2023-01-01T00:00:00Z"));
    let server = FixtureServer::start(responses);

    let source = HttpSource::new(server.base.clone(), None);
    let cancel = CancelToken::new();

    let a = source.get_by_module("a", &cancel).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].id, "GO-2023-0001");

    let b = source.get_by_module("b", &cancel).unwrap();
    assert_eq!(b.len(), 1);

    // "c" is not in the index: no per-module request may leave the process.
    assert!(source.get_by_module("c", &cancel).unwrap().is_empty());

    assert_eq!(server.hits("/index.json"), 3);
    assert_eq!(server.hits("/a.json"), 1);
    assert_eq!(server.hits("/b.json"), 1);
    assert_eq!(server.hits("/c.json"), 0);
    assert_eq!(source.request_count(), 5);
}

#[test]
fn test_stale_cache_not_modified_refresh() {
    let t = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let mut responses = HashMap::new();
    responses.insert(
        "/index.json".to_string(),
        r#"{"a": "2023-01-01T00:00:00Z"}"#.to_string(),
    );
    let server = FixtureServer::start(responses);
    server.not_modified.store(true, Ordering::SeqCst);

    let cache = MarkingCache::default();
    let stale_retrieved = Utc::now() - Duration::hours(3);
    {
        let mut state = cache.state.lock().unwrap();
        let mut index = DbIndex::new();
        index.insert("a".to_string(), t);
        state.index = Some((index, stale_retrieved));
        state.entries.insert(
            "a".to_string(),
            vec![Entry {
                id: "GO-2023-0001".to_string(),
                modified: Some(t),
                details: "stored".to_string(),
                ..Default::default()
            }],
        );
    }

    let source = HttpSource::new(server.base.clone(), Some(Box::new(cache.clone())));
    let entries = source.get_by_module("a", &CancelToken::new()).unwrap();

    // The stale index triggered one conditional request, got a 304, and the
    // cached entries were served without a per-module fetch.
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].details, "cached: stored");
    assert_eq!(server.hits("/index.json"), 1);
    assert_eq!(server.hits("/a.json"), 0);
    assert_eq!(source.request_count(), 1);

    // The cache timestamp was rewritten to "now".
    let (_, retrieved) = cache.state.lock().unwrap().index.clone().unwrap();
    assert!(retrieved > stale_retrieved);
    assert!(Utc::now() - retrieved < Duration::minutes(5));
}

#[test]
fn test_fresh_cache_skips_network() {
    let server = FixtureServer::start(HashMap::new());

    let cache = MarkingCache::default();
    let t = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    {
        let mut state = cache.state.lock().unwrap();
        let mut index = DbIndex::new();
        index.insert("a".to_string(), t);
        state.index = Some((index, Utc::now() - Duration::minutes(10)));
        state.entries.insert(
            "a".to_string(),
            vec![Entry {
                id: "GO-2023-0001".to_string(),
                modified: Some(t),
                ..Default::default()
            }],
        );
    }

    let source = HttpSource::new(server.base.clone(), Some(Box::new(cache)));
    let entries = source.get_by_module("a", &CancelToken::new()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(source.request_count(), 0);
    assert_eq!(server.hits("/index.json"), 0);
}
