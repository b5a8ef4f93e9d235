//! Binary scan

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use vulnreach_core::{
    symbols::parse_symbol, CancelToken, Module, ScanConfig, VulnSet, STDLIB_MODULE_PATH,
};
use vulnreach_graph::Finding;
use vulnreach_osv::semver::{canonical, go_tag_to_semver};

use crate::error::{BinaryError, Result};
use crate::provider::SymbolProvider;

/// First toolchain whose binaries carry usable symbol information.
const MIN_GO_VERSION: &str = "go1.18";

/// The outcome of a binary scan: findings at symbol granularity, without
/// reachability slices.
#[derive(Debug, Default)]
pub struct BinaryResult {
    pub findings: Vec<Finding>,
    /// Modules observed in the binary, including the stdlib pseudo-module.
    pub modules: Vec<Module>,
    /// Target platform as recorded in the build settings.
    pub goos: Option<String>,
    pub goarch: Option<String>,
}

/// Scans a compiled executable for vulnerable symbols.
pub fn scan_binary(
    provider: &dyn SymbolProvider,
    cfg: &ScanConfig,
    cancel: &CancelToken,
) -> Result<BinaryResult> {
    if cancel.is_cancelled() {
        return Err(BinaryError::Cancelled);
    }
    let client = cfg.db.clone().ok_or(BinaryError::NoClient)?;

    let info = provider.build_info()?;
    let stdlib_version = go_tag_to_semver(&info.go_version);
    if !supported_go_version(&stdlib_version) {
        return Err(BinaryError::UnsupportedGoVersion(info.go_version));
    }

    // Function symbols present in the binary, grouped by package.
    let mut present: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for full in provider.symbols(cancel)? {
        if let Some((pkg, symbol)) = parse_symbol(&full) {
            present.entry(pkg).or_default().insert(symbol);
        }
    }
    debug!(packages = present.len(), "symbols extracted");

    let mut modules = info.deps.clone();
    if let Some(main) = &info.main {
        modules.push(main.clone());
    }
    modules.push(Module::new(STDLIB_MODULE_PATH, stdlib_version));
    modules.sort_by(|a, b| a.path.cmp(&b.path));
    modules.dedup_by(|a, b| a.path == b.path);

    let goos = cfg
        .goos
        .clone()
        .or_else(|| info.setting("GOOS").map(str::to_string));
    let goarch = cfg
        .goarch
        .clone()
        .or_else(|| info.setting("GOARCH").map(str::to_string));
    if goos.is_none() || goarch.is_none() {
        warn!("binary build info does not record GOOS/GOARCH; platform filtering disabled");
    }

    let vulns = VulnSet::fetch(client.as_ref(), &modules, cancel)?
        .filter(goos.as_deref(), goarch.as_deref());
    if cancel.is_cancelled() {
        return Err(BinaryError::Cancelled);
    }

    let findings = if cfg.imports_only {
        imports_only_findings(&vulns, &present)
    } else {
        symbol_findings(&vulns, &present)
    };
    info!(findings = findings.len(), modules = modules.len(), "binary scan complete");

    Ok(BinaryResult {
        findings,
        modules,
        goos,
        goarch,
    })
}

fn supported_go_version(stdlib_version: &str) -> bool {
    let (Some(version), Some(min)) = (
        canonical(stdlib_version),
        canonical(&go_tag_to_semver(MIN_GO_VERSION)),
    ) else {
        return false;
    };
    version >= min
}

/// Imports-only mode: every affected symbol of a vulnerable package found
/// in the binary. When the database entry names no symbols, the symbols
/// actually present in the binary stand in; the source is not available to
/// enumerate the package's exports.
fn imports_only_findings(
    vulns: &VulnSet,
    present: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut seen = HashSet::new();
    for (pkg_path, binary_symbols) in present {
        let entries = vulns.for_package(pkg_path);
        if entries.is_empty() {
            continue;
        }
        let effective_path = vulns
            .effective_import_path(pkg_path)
            .unwrap_or_else(|| pkg_path.clone());
        for entry in entries {
            for affected in &entry.affected {
                for imp in &affected.ecosystem_specific.imports {
                    if imp.path != effective_path {
                        continue;
                    }
                    let symbols: Vec<String> = if imp.symbols.is_empty() {
                        binary_symbols.iter().cloned().collect()
                    } else {
                        imp.symbols.clone()
                    };
                    for symbol in symbols {
                        push_finding(vulns, &mut findings, &mut seen, &entry, pkg_path, symbol);
                    }
                }
            }
        }
    }
    findings
}

/// Symbol mode: only symbols that both appear in the binary and are listed
/// as affected.
fn symbol_findings(
    vulns: &VulnSet,
    present: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut seen = HashSet::new();
    for (pkg_path, binary_symbols) in present {
        for symbol in binary_symbols {
            for entry in vulns.for_symbol(pkg_path, symbol) {
                push_finding(
                    vulns,
                    &mut findings,
                    &mut seen,
                    &entry,
                    pkg_path,
                    symbol.clone(),
                );
            }
        }
    }
    findings
}

fn push_finding(
    vulns: &VulnSet,
    findings: &mut Vec<Finding>,
    seen: &mut HashSet<(String, String, String)>,
    entry: &Arc<vulnreach_osv::Entry>,
    pkg_path: &str,
    symbol: String,
) {
    if !seen.insert((entry.id.clone(), pkg_path.to_string(), symbol.clone())) {
        return;
    }
    // Findings are associated with the observed module whose path is the
    // longest prefix of the import path.
    let mod_path = vulns
        .module_for_package(pkg_path)
        .map(|m| m.path.clone())
        .unwrap_or_default();
    findings.push(Finding {
        osv: entry.clone(),
        symbol,
        pkg_path: pkg_path.to_string(),
        mod_path,
        call_sink: None,
        import_sink: None,
        require_sink: None,
    });
}
