//! Multi-source composition

use std::collections::BTreeSet;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use vulnreach_core::{CancelToken, DbError, DbIndex, DbResult, Source};
use vulnreach_osv::Entry;

/// Merges several database sources into one.
///
/// Union-style operations de-duplicate by entry identifier, keeping source
/// order and then each source's internal order. Any source error aborts the
/// whole call.
// TODO: per-source fault tolerance with partial-failure reporting, behind a
// configuration option.
pub struct MultiSource {
    sources: Vec<Box<dyn Source>>,
}

impl std::fmt::Debug for MultiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSource")
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl MultiSource {
    pub fn new(sources: Vec<Box<dyn Source>>) -> Self {
        MultiSource { sources }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn union_by_id<F>(&self, fetch: F) -> DbResult<Vec<Entry>>
    where
        F: Fn(&dyn Source) -> DbResult<Vec<Entry>>,
    {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for source in &self.sources {
            for entry in fetch(source.as_ref())? {
                if seen.insert(entry.id.clone()) {
                    merged.push(entry);
                }
            }
        }
        Ok(merged)
    }
}

impl Source for MultiSource {
    fn index(&self, cancel: &CancelToken) -> DbResult<DbIndex> {
        let mut merged = DbIndex::new();
        for source in &self.sources {
            for (module, modified) in source.index(cancel)? {
                let slot = merged.entry(module).or_insert(modified);
                if *slot < modified {
                    *slot = modified;
                }
            }
        }
        Ok(merged)
    }

    fn get_by_module(&self, module: &str, cancel: &CancelToken) -> DbResult<Vec<Entry>> {
        self.union_by_id(|s| s.get_by_module(module, cancel))
    }

    fn get_by_id(&self, id: &str, cancel: &CancelToken) -> DbResult<Option<Entry>> {
        for source in &self.sources {
            if let Some(entry) = source.get_by_id(id, cancel)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn get_by_alias(&self, alias: &str, cancel: &CancelToken) -> DbResult<Vec<Entry>> {
        self.union_by_id(|s| s.get_by_alias(alias, cancel))
    }

    fn list_ids(&self, cancel: &CancelToken) -> DbResult<Vec<String>> {
        let mut ids = BTreeSet::new();
        for source in &self.sources {
            ids.extend(source.list_ids(cancel)?);
        }
        Ok(ids.into_iter().collect())
    }

    fn last_modified(&self, cancel: &CancelToken) -> DbResult<DateTime<Utc>> {
        let mut newest: Option<DateTime<Utc>> = None;
        for source in &self.sources {
            let t = source.last_modified(cancel)?;
            if newest.map_or(true, |n| n < t) {
                newest = Some(t);
            }
        }
        newest.ok_or_else(|| DbError::Transport {
            url: String::new(),
            message: "no database sources configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    /// In-memory source for merge tests.
    struct MemSource {
        by_module: HashMap<String, Vec<Entry>>,
        ids: Vec<String>,
        modified: DateTime<Utc>,
    }

    impl MemSource {
        fn new(entries: Vec<(&str, &str)>, modified: DateTime<Utc>) -> Self {
            let mut by_module: HashMap<String, Vec<Entry>> = HashMap::new();
            let mut ids = Vec::new();
            for (module, id) in entries {
                by_module.entry(module.to_string()).or_default().push(Entry {
                    id: id.to_string(),
                    ..Default::default()
                });
                ids.push(id.to_string());
            }
            MemSource {
                by_module,
                ids,
                modified,
            }
        }
    }

    impl Source for MemSource {
        fn index(&self, _cancel: &CancelToken) -> DbResult<DbIndex> {
            Ok(self
                .by_module
                .keys()
                .map(|m| (m.clone(), self.modified))
                .collect())
        }

        fn get_by_module(&self, module: &str, _cancel: &CancelToken) -> DbResult<Vec<Entry>> {
            Ok(self.by_module.get(module).cloned().unwrap_or_default())
        }

        fn get_by_id(&self, id: &str, _cancel: &CancelToken) -> DbResult<Option<Entry>> {
            Ok(self.ids.iter().find(|i| *i == id).map(|i| Entry {
                id: i.clone(),
                ..Default::default()
            }))
        }

        fn get_by_alias(&self, _alias: &str, _cancel: &CancelToken) -> DbResult<Vec<Entry>> {
            Ok(Vec::new())
        }

        fn list_ids(&self, _cancel: &CancelToken) -> DbResult<Vec<String>> {
            let mut ids = self.ids.clone();
            ids.sort();
            Ok(ids)
        }

        fn last_modified(&self, _cancel: &CancelToken) -> DbResult<DateTime<Utc>> {
            Ok(self.modified)
        }
    }

    fn multi() -> MultiSource {
        let t1 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        MultiSource::new(vec![
            Box::new(MemSource::new(
                vec![("example.com/m", "GO-2023-0002"), ("example.com/m", "GO-2023-0001")],
                t1,
            )),
            Box::new(MemSource::new(
                vec![("example.com/m", "GO-2023-0001"), ("example.com/n", "GO-2023-0003")],
                t2,
            )),
        ])
    }

    #[test]
    fn test_get_by_module_union_preserves_source_order() {
        let ids: Vec<String> = multi()
            .get_by_module("example.com/m", &CancelToken::new())
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        // First source's internal order, then the second source's additions;
        // the duplicate GO-2023-0001 appears once.
        assert_eq!(ids, vec!["GO-2023-0002", "GO-2023-0001"]);
    }

    #[test]
    fn test_get_by_id_first_match() {
        let entry = multi()
            .get_by_id("GO-2023-0003", &CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(entry.id, "GO-2023-0003");
        assert!(multi()
            .get_by_id("GO-0000-0000", &CancelToken::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_ids_sorted_union() {
        let ids = multi().list_ids(&CancelToken::new()).unwrap();
        assert_eq!(ids, vec!["GO-2023-0001", "GO-2023-0002", "GO-2023-0003"]);
    }

    #[test]
    fn test_last_modified_maximum() {
        let got = multi().last_modified(&CancelToken::new()).unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap());
    }
}
