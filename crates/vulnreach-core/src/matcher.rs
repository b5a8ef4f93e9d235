//! Vulnerability matcher
//!
//! Takes the modules observed in the scanned program together with the
//! database entries fetched for them and narrows the set down to what can
//! actually apply: the entry must name the module, the observed version must
//! fall in an affected range, and the target platform must match. The
//! narrowed set then answers package- and symbol-level lookups during the
//! reachability phases.

use std::sync::Arc;

use chrono::Utc;
use vulnreach_osv::{Affected, Entry};

use crate::module::{is_stdlib_package, Module, STDLIB_MODULE_PATH};

/// One module together with the database entries fetched for it.
#[derive(Debug, Clone)]
pub struct ModuleVulns {
    pub module: Module,
    pub entries: Vec<Arc<Entry>>,
}

/// The vulnerabilities that can affect one program, grouped by module.
#[derive(Debug, Clone, Default)]
pub struct VulnSet {
    pub mods: Vec<ModuleVulns>,
}

impl VulnSet {
    /// Fetches the entries for every module from the database client.
    ///
    /// Replaced modules are queried under their replacement path, since
    /// that is the code actually built. The result is unfiltered; apply
    /// [`VulnSet::filter`] before matching.
    pub fn fetch(
        client: &dyn crate::Source,
        modules: &[Module],
        cancel: &crate::CancelToken,
    ) -> crate::DbResult<VulnSet> {
        let mut mods = Vec::with_capacity(modules.len());
        for module in modules {
            let entries = client.get_by_module(module.effective_path(), cancel)?;
            mods.push(ModuleVulns {
                module: module.clone(),
                entries: entries.into_iter().map(Arc::new).collect(),
            });
        }
        Ok(VulnSet { mods })
    }

    /// Restricts every entry to the affected records that name the module,
    /// include its observed version, and apply on the target platform.
    ///
    /// A module with an unknown (empty) version is treated as unaffected by
    /// any semver range; withdrawn entries are dropped. Affected records
    /// whose import list is non-empty but entirely filtered out by the
    /// platform are dropped with them.
    pub fn filter(self, goos: Option<&str>, goarch: Option<&str>) -> VulnSet {
        let now = Utc::now();
        let mods = self
            .mods
            .into_iter()
            .map(|mv| {
                let module = mv.module;
                let entries = mv
                    .entries
                    .iter()
                    .filter_map(|entry| filter_entry(entry, &module, goos, goarch, now))
                    .collect();
                ModuleVulns { module, entries }
            })
            .collect();
        VulnSet { mods }
    }

    /// Returns the entries affecting the package at `import_path`.
    ///
    /// The owning module is the one whose path is the longest prefix of the
    /// import path (on path-segment boundaries); standard-library packages
    /// match the `stdlib` pseudo-module instead. A replace directive on the
    /// matched module rewrites the import path prefix before the per-import
    /// lists are consulted.
    pub fn for_package(&self, import_path: &str) -> Vec<Arc<Entry>> {
        let Some((owner, effective_path)) = self.owning_module(import_path) else {
            return Vec::new();
        };
        owner
            .entries
            .iter()
            .filter(|entry| {
                entry.affected.iter().any(|a| {
                    a.ecosystem_specific
                        .imports
                        .iter()
                        .any(|imp| imp.path == effective_path)
                })
            })
            .cloned()
            .collect()
    }

    /// Returns the entries affecting `symbol` in the package at
    /// `import_path`. An import record without a symbol list affects every
    /// symbol in the package.
    pub fn for_symbol(&self, import_path: &str, symbol: &str) -> Vec<Arc<Entry>> {
        let Some((owner, effective_path)) = self.owning_module(import_path) else {
            return Vec::new();
        };
        owner
            .entries
            .iter()
            .filter(|entry| {
                entry.affected.iter().any(|a| {
                    a.ecosystem_specific
                        .imports
                        .iter()
                        .any(|imp| imp.path == effective_path && imp.affects_symbol(symbol))
                })
            })
            .cloned()
            .collect()
    }

    /// The import path after applying the owning module's replace
    /// directive, when the package belongs to a known module.
    pub fn effective_import_path(&self, import_path: &str) -> Option<String> {
        self.owning_module(import_path).map(|(_, path)| path)
    }

    /// The module owning the package at `import_path`: the longest
    /// module-path prefix, or the stdlib pseudo-module for
    /// standard-library packages.
    pub fn module_for_package(&self, import_path: &str) -> Option<&Module> {
        self.owning_module(import_path).map(|(mv, _)| &mv.module)
    }

    /// Finds the module owning `import_path` (longest path prefix, or the
    /// stdlib pseudo-module for standard-library packages) and the import
    /// path after applying the module's replace directive.
    fn owning_module(&self, import_path: &str) -> Option<(&ModuleVulns, String)> {
        let is_std = is_stdlib_package(import_path);
        let mut owner: Option<&ModuleVulns> = None;
        for mv in &self.mods {
            if is_std && mv.module.path == STDLIB_MODULE_PATH {
                owner = Some(mv);
            } else if path_has_prefix(import_path, &mv.module.path)
                && owner.map_or(true, |o| o.module.path.len() < mv.module.path.len())
            {
                owner = Some(mv);
            }
        }
        let owner = owner?;
        let effective_path = match &owner.module.replace {
            Some(replacement) => format!(
                "{}{}",
                replacement.path,
                &import_path[owner.module.path.len()..]
            ),
            None => import_path.to_string(),
        };
        Some((owner, effective_path))
    }
}

fn filter_entry(
    entry: &Arc<Entry>,
    module: &Module,
    goos: Option<&str>,
    goarch: Option<&str>,
    now: chrono::DateTime<Utc>,
) -> Option<Arc<Entry>> {
    if entry.withdrawn.is_some_and(|w| w < now) {
        return None;
    }
    let effective_path = module.effective_path();
    let effective_version = module.effective_version();
    let affected: Vec<Affected> = entry
        .affected
        .iter()
        .filter_map(|a| {
            // Databases sometimes attach records for related but different
            // modules reported in the same advisory; matching versions
            // against the wrong module would be meaningless.
            if a.package.name != effective_path && a.package.name != module.path {
                return None;
            }
            if !a.affects_semver(effective_version) {
                return None;
            }
            let imports: Vec<_> = a
                .ecosystem_specific
                .imports
                .iter()
                .filter(|imp| imp.matches_platform(goos, goarch))
                .cloned()
                .collect();
            if !a.ecosystem_specific.imports.is_empty() && imports.is_empty() {
                return None;
            }
            let mut kept = a.clone();
            kept.ecosystem_specific.imports = imports;
            Some(kept)
        })
        .collect();
    if affected.is_empty() {
        return None;
    }
    let mut kept = (**entry).clone();
    kept.affected = affected;
    Some(Arc::new(kept))
}

/// Reports whether `prefix` is a path prefix of `path` on segment
/// boundaries.
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    path == prefix || (path.len() > prefix.len() && path.starts_with(prefix) && path.as_bytes()[prefix.len()] == b'/')
}
