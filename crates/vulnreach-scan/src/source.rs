//! The source analyzer
//!
//! Runs in five phases: module collection and vulnerability fetches
//! (overlapped with call-graph construction on a background thread), the
//! imports slice, the requires overlay, and the call-graph slice.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::{debug, info};
use vulnreach_core::{
    CancelToken, Module, ScanConfig, VulnSet, STDLIB_MODULE_PATH,
};
use vulnreach_graph::{CallGraph, CallSite, Finding, ModuleGraph, NodeId, PackageGraph};
use vulnreach_osv::semver::go_tag_to_semver;

use crate::error::{Result, ScanError};
use crate::package::{shares_one_fileset, transitive_packages, LoadedPackage};
use crate::program::{CallGraphBuilder, ProgramGraph};

/// Everything one analysis produces: the three slices, the findings, and
/// the entry nodes of each slice.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub packages: PackageGraph,
    pub modules: ModuleGraph,
    /// Absent in imports-only mode.
    pub calls: Option<CallGraph>,
    pub findings: Vec<Finding>,
    pub entry_packages: Vec<NodeId>,
    pub entry_modules: Vec<NodeId>,
    pub entry_functions: Vec<NodeId>,
}

/// Analyzes the given entry packages for reachable vulnerabilities.
pub fn scan_source(
    pkgs: &[Arc<LoadedPackage>],
    builder: &dyn CallGraphBuilder,
    cfg: &ScanConfig,
    cancel: &CancelToken,
) -> Result<ScanResult> {
    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }
    let all = transitive_packages(pkgs);
    if !shares_one_fileset(&all) {
        return Err(ScanError::InconsistentFileSets);
    }
    let client = cfg.db.clone().ok_or(ScanError::NoClient)?;

    let stdlib_version = cfg
        .go_version
        .as_deref()
        .map(go_tag_to_semver)
        .unwrap_or_default();
    let modules = collect_modules(&all, &stdlib_version);
    info!(
        packages = all.len(),
        modules = modules.len(),
        "starting source analysis"
    );

    // Phase 1 and 2 overlap: the toolchain builds SSA and the call graph on
    // a background thread while this thread fetches database entries.
    let (vulns_res, program_res) = std::thread::scope(|s| {
        let build_handle = if cfg.imports_only {
            None
        } else {
            Some(s.spawn(|| builder.build(pkgs, cancel)))
        };
        let fetched = VulnSet::fetch(client.as_ref(), &modules, cancel)
            .map(|vs| vs.filter(cfg.goos.as_deref(), cfg.goarch.as_deref()));
        let program = match build_handle {
            Some(handle) => match handle.join() {
                Ok(built) => built.map(Some),
                Err(_) => Err(ScanError::Build("call graph builder panicked".to_string())),
            },
            None => Ok(None),
        };
        (fetched, program)
    });
    let vulns = vulns_res.map_err(ScanError::from)?;
    let program = program_res?;
    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }

    // Phase 3: imports slice.
    let mut on_slice = HashSet::new();
    let mut dead = HashSet::new();
    for pkg in pkgs {
        import_slice(pkg, &vulns, &mut on_slice, &mut dead);
    }
    debug!(on_slice = on_slice.len(), dead = dead.len(), "imports slice computed");

    let mut result = ScanResult::default();
    // Identifier order is the import-path order of the slice.
    for (path, pkg) in &all {
        if on_slice.contains(path) {
            result.packages.add(&pkg.name, path);
        }
    }
    for (path, pkg) in &all {
        let Some(pid) = result.packages.lookup(path) else {
            continue;
        };
        for imp in &pkg.imports {
            if let Some(iid) = result.packages.lookup(&imp.path) {
                result.packages.add_import_edge(pid, iid);
            }
        }
    }
    let mut entry_paths: Vec<&str> = pkgs.iter().map(|p| p.path.as_str()).collect();
    entry_paths.sort_unstable();
    entry_paths.dedup();
    result.entry_packages = entry_paths
        .iter()
        .filter_map(|&p| result.packages.lookup(p))
        .collect();

    // Phase 4: requires overlay.
    let pkg_module = build_requires_overlay(&all, &on_slice, &stdlib_version, &mut result);

    // Findings: one per affected symbol of each vulnerable package on the
    // slice; an absent symbol list covers every exported symbol.
    collect_findings(&all, &vulns, &pkg_module, &stdlib_version, &mut result);

    // Phase 5: call-graph slice.
    if let Some(program) = program {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let (calls, entry_functions) = call_graph_slice(&program, &vulns, &mut result.findings);
        info!(
            functions = calls.len(),
            sinks = result.findings.iter().filter(|f| f.call_sink.is_some()).count(),
            "call slice computed"
        );
        result.calls = Some(calls);
        result.entry_functions = entry_functions;
    }

    Ok(result)
}

/// The modules of the program: every package's module plus the stdlib
/// pseudo-module, ordered by module path.
fn collect_modules(
    all: &BTreeMap<String, Arc<LoadedPackage>>,
    stdlib_version: &str,
) -> Vec<Module> {
    let mut by_path: BTreeMap<String, Module> = BTreeMap::new();
    by_path.insert(
        STDLIB_MODULE_PATH.to_string(),
        Module::new(STDLIB_MODULE_PATH, stdlib_version),
    );
    for pkg in all.values() {
        if let Some(module) = &pkg.module {
            by_path
                .entry(module.path.clone())
                .or_insert_with(|| module.clone());
        }
    }
    by_path.into_values().collect()
}

/// Depth-first walk marking packages that are vulnerable or import a
/// vulnerable package. Packages proven uninteresting land in `dead` and are
/// never re-explored.
fn import_slice(
    pkg: &Arc<LoadedPackage>,
    vulns: &VulnSet,
    on_slice: &mut HashSet<String>,
    dead: &mut HashSet<String>,
) -> bool {
    if on_slice.contains(&pkg.path) {
        return true;
    }
    if dead.contains(&pkg.path) {
        return false;
    }
    // Pre-mark so a dependency cycle cannot recurse back into this package.
    dead.insert(pkg.path.clone());

    let mut reaches = false;
    for imp in &pkg.imports {
        if import_slice(imp, vulns, on_slice, dead) {
            reaches = true;
        }
    }
    if !reaches && !vulns.for_package(&pkg.path).is_empty() {
        reaches = true;
    }
    if reaches {
        dead.remove(&pkg.path);
        on_slice.insert(pkg.path.clone());
    }
    reaches
}

fn module_of(pkg: &LoadedPackage, stdlib_version: &str) -> Module {
    match &pkg.module {
        Some(module) => module.clone(),
        None => Module::new(STDLIB_MODULE_PATH, stdlib_version),
    }
}

/// Builds the requires overlay for the packages on the imports slice and
/// returns the package-path → module-node mapping.
fn build_requires_overlay(
    all: &BTreeMap<String, Arc<LoadedPackage>>,
    on_slice: &HashSet<String>,
    stdlib_version: &str,
    result: &mut ScanResult,
) -> HashMap<String, NodeId> {
    // Module ids follow module-path order.
    let mut slice_modules: BTreeMap<String, Module> = BTreeMap::new();
    for (path, pkg) in all {
        if on_slice.contains(path) {
            let module = module_of(pkg, stdlib_version);
            slice_modules.entry(module.path.clone()).or_insert(module);
        }
    }
    for (path, module) in &slice_modules {
        let mid = result.modules.add(path, &module.version);
        if let Some(replacement) = &module.replace {
            let rid = result.modules.add(&replacement.path, &replacement.version);
            result.modules.set_replace(mid, rid);
        }
    }

    let mut pkg_module = HashMap::new();
    for (path, pkg) in all {
        let Some(pid) = result.packages.lookup(path) else {
            continue;
        };
        let module = module_of(pkg, stdlib_version);
        let mid = result
            .modules
            .lookup(&module.path)
            .expect("slice module registered above");
        result.packages.set_module(pid, mid);
        pkg_module.insert(path.clone(), mid);
    }

    // A package edge X → Y induces module(X) → module(Y), self-loops
    // suppressed.
    let mut edges = Vec::new();
    for node in result.packages.iter() {
        let required = pkg_module[&node.path];
        for &importer in &node.imported_by {
            let requirer = pkg_module[&result.packages.node(importer).path];
            edges.push((requirer, required));
        }
    }
    for (requirer, required) in edges {
        result.modules.add_require_edge(requirer, required);
    }

    let mut entry_modules = Vec::new();
    for &pid in &result.entry_packages {
        let mid = pkg_module[&result.packages.node(pid).path];
        if !entry_modules.contains(&mid) {
            entry_modules.push(mid);
        }
    }
    result.entry_modules = entry_modules;

    pkg_module
}

fn collect_findings(
    all: &BTreeMap<String, Arc<LoadedPackage>>,
    vulns: &VulnSet,
    pkg_module: &HashMap<String, NodeId>,
    stdlib_version: &str,
    result: &mut ScanResult,
) {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    for (path, pkg) in all {
        let Some(pid) = result.packages.lookup(path) else {
            continue;
        };
        let entries = vulns.for_package(path);
        if entries.is_empty() {
            continue;
        }
        let effective_path = vulns
            .effective_import_path(path)
            .unwrap_or_else(|| path.clone());
        let module = module_of(pkg, stdlib_version);
        let require_sink = pkg_module.get(path).copied();
        for entry in entries {
            for affected in &entry.affected {
                for imp in &affected.ecosystem_specific.imports {
                    if imp.path != effective_path {
                        continue;
                    }
                    let symbols: &[String] = if imp.symbols.is_empty() {
                        &pkg.exported_symbols
                    } else {
                        &imp.symbols
                    };
                    for symbol in symbols {
                        if !seen.insert((entry.id.clone(), path.clone(), symbol.clone())) {
                            continue;
                        }
                        result.findings.push(Finding {
                            osv: entry.clone(),
                            symbol: symbol.clone(),
                            pkg_path: path.clone(),
                            mod_path: module.path.clone(),
                            call_sink: None,
                            import_sink: Some(pid),
                            require_sink,
                        });
                    }
                }
            }
        }
    }
}

/// Phase 5: the functions on call paths between entry functions and
/// vulnerable symbols, with synthetic wrappers elided.
fn call_graph_slice(
    program: &ProgramGraph,
    vulns: &VulnSet,
    findings: &mut [Finding],
) -> (CallGraph, Vec<NodeId>) {
    let mut sinks = Vec::new();
    for idx in program.graph.node_indices() {
        let func = program.func(idx);
        if func.wrapper {
            continue;
        }
        if !vulns.for_symbol(&func.pkg_path, &func.symbol()).is_empty() {
            sinks.push(idx);
        }
    }

    let forward = reachable(program, &program.entries, Direction::Outgoing);
    let backward = reachable(program, &sinks, Direction::Incoming);
    let in_slice = |idx: NodeIndex| forward.contains(&idx) && backward.contains(&idx);

    let mut calls = CallGraph::new();
    let mut ids: HashMap<NodeIndex, NodeId> = HashMap::new();
    for idx in program.graph.node_indices() {
        let func = program.func(idx);
        if func.wrapper || !in_slice(idx) {
            continue;
        }
        let id = calls.add(
            &func.name,
            func.recv_type.as_deref(),
            &func.pkg_path,
            func.pos.clone(),
        );
        ids.insert(idx, id);
    }

    for edge in program.graph.edge_references() {
        let (source, target) = (edge.source(), edge.target());
        if !in_slice(source) || !in_slice(target) || program.func(source).wrapper {
            continue;
        }
        // A call into a wrapper is reported as a call of the wrapped
        // function, keeping the caller's site.
        let Some(callee) = resolve_wrapper(program, target) else {
            continue;
        };
        if !in_slice(callee) {
            continue;
        }
        let (Some(&parent), Some(&callee_id)) = (ids.get(&source), ids.get(&callee)) else {
            continue;
        };
        let func = program.func(callee);
        calls.add_call_site(
            callee_id,
            CallSite {
                parent,
                name: func.name.clone(),
                recv_type: func.recv_type.clone(),
                pos: edge.weight().pos.clone(),
                resolved: edge.weight().resolved,
            },
        );
    }

    let mut by_symbol: HashMap<(&str, String), NodeId> = HashMap::new();
    for node in calls.iter() {
        by_symbol
            .entry((node.pkg_path.as_str(), node.symbol()))
            .or_insert(node.id);
    }
    for finding in findings.iter_mut() {
        if let Some(&id) = by_symbol.get(&(finding.pkg_path.as_str(), finding.symbol.clone())) {
            finding.call_sink = Some(id);
        }
    }

    let mut entry_functions = Vec::new();
    for &entry in &program.entries {
        if let Some(&id) = ids.get(&entry) {
            if !entry_functions.contains(&id) {
                entry_functions.push(id);
            }
        }
    }

    (calls, entry_functions)
}

fn reachable(
    program: &ProgramGraph,
    from: &[NodeIndex],
    direction: Direction,
) -> HashSet<NodeIndex> {
    let mut seen: HashSet<NodeIndex> = from.iter().copied().collect();
    let mut queue: VecDeque<NodeIndex> = from.iter().copied().collect();
    while let Some(idx) = queue.pop_front() {
        for next in program.graph.neighbors_directed(idx, direction) {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}

/// Follows forwarding wrappers to the function they wrap.
fn resolve_wrapper(program: &ProgramGraph, mut idx: NodeIndex) -> Option<NodeIndex> {
    let mut hops = 0;
    while program.func(idx).wrapper {
        idx = program
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .next()?;
        hops += 1;
        if hops > 32 {
            return None;
        }
    }
    Some(idx)
}
