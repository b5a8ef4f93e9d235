//! vulnreach reports which known vulnerabilities actually affect a Go
//! program.
//!
//! Given source packages it computes call-graph, import, and
//! module-requires slices from the program's entry points to vulnerable
//! symbols and distills witness chains out of them; given a compiled
//! executable it reports at symbol granularity from the binary's symbol
//! table. Vulnerability records come from OSV databases served over HTTP
//! or from a local directory.
//!
//! This crate is the public surface: it re-exports the workspace and wires
//! a database client and scan configuration up from the environment.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

pub use vulnreach_binary::{scan_binary, BinaryError, BinaryResult, BuildInfo, SymbolProvider};
pub use vulnreach_client::{from_uris, DirSource, FsCache, HttpSource, MultiSource};
pub use vulnreach_core::{
    is_stdlib_package, CancelToken, DbError, DbIndex, Module, ModuleVulns, ScanConfig, Source,
    VulnSet, STDLIB_MODULE_PATH, TOOLCHAIN_MODULE_PATH,
};
pub use vulnreach_graph::{
    CallGraph, CallSite, Finding, FuncNode, ModNode, ModuleGraph, NodeId, PackageGraph, PkgNode,
    Position,
};
pub use vulnreach_osv as osv;
pub use vulnreach_scan::{
    call_stacks, import_chains, scan_source, CallGraphBuilder, CallStack, FileSet, ImportChain,
    LoadedPackage, ProgramGraph, ScanError, ScanResult, StackFrame,
};

/// Default vulnerability database when [`DB_ENV`] is unset.
pub const DEFAULT_DB: &str = "https://vuln.go.dev";

/// Environment variable naming the database sources, a comma-separated
/// list of `http://`, `https://`, or `file://` URIs.
pub const DB_ENV: &str = "VULNREACH_DB";

/// Environment variable overriding the toolchain version reported for the
/// standard library, for stable results in tests.
pub const GO_VERSION_ENV: &str = "VULNREACH_GOVERSION";

/// Builds a database client from [`DB_ENV`], caching HTTP sources beneath
/// `cache_dir` when given.
pub fn client_from_env(cache_dir: Option<&Path>) -> anyhow::Result<MultiSource> {
    let uris = std::env::var(DB_ENV).unwrap_or_else(|_| DEFAULT_DB.to_string());
    let uris: Vec<String> = uris
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    from_uris(&uris, cache_dir).context("configuring vulnerability database sources")
}

/// Builds a scan configuration from the environment: database sources from
/// [`DB_ENV`], the toolchain version from [`GO_VERSION_ENV`], and the
/// target platform from `GOOS`/`GOARCH` when set.
pub fn config_from_env(cache_dir: Option<&Path>) -> anyhow::Result<ScanConfig> {
    let client = client_from_env(cache_dir)?;
    let mut cfg = ScanConfig::new(Arc::new(client));
    if let Ok(tag) = std::env::var(GO_VERSION_ENV) {
        if !tag.is_empty() {
            cfg.go_version = Some(tag);
        }
    }
    for (var, slot) in [("GOOS", &mut cfg.goos), ("GOARCH", &mut cfg.goarch)] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                *slot = Some(value);
            }
        }
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process state, so the env-derived paths are
    // exercised in one test.
    #[test]
    fn test_config_from_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.json"), "{}").unwrap();
        std::env::set_var(DB_ENV, format!("file://{}/", dir.path().display()));
        std::env::set_var(GO_VERSION_ENV, "go1.19.2");

        let cfg = config_from_env(None).unwrap();
        assert_eq!(cfg.go_version.as_deref(), Some("go1.19.2"));
        let client = cfg.db.as_ref().unwrap();
        assert!(client.index(&CancelToken::new()).unwrap().is_empty());

        std::env::set_var(DB_ENV, "gopher://bad");
        assert!(config_from_env(None).is_err());

        std::env::remove_var(DB_ENV);
        std::env::remove_var(GO_VERSION_ENV);
    }
}
