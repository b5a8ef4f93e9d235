//! Witness selection
//!
//! Slices can contain exponentially many paths; witnesses are short,
//! high-confidence representatives. Import chains come from a breadth-first
//! walk over imported-by edges with one expansion per package; call stacks
//! from an upward walk over call sites with one visit per function. Stacks
//! are ranked so the most convincing witness sorts first.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;
use vulnreach_core::{is_stdlib_package, CancelToken};
use vulnreach_graph::{CallGraph, CallSite, NodeId};

use crate::error::{Result, ScanError};
use crate::source::ScanResult;

/// Package nodes from an entry package to a vulnerable package.
pub type ImportChain = Vec<NodeId>;

/// One frame of a witness call stack. The first frame of a stack is an
/// entry function and carries no call site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackFrame {
    pub function: NodeId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recv_type: Option<String>,
    pub pkg_path: String,
    /// The site at which the previous frame calls this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_site: Option<CallSite>,
}

impl StackFrame {
    pub fn symbol(&self) -> String {
        match &self.recv_type {
            Some(recv) => format!("{}.{}", recv.trim_start_matches('*'), self.name),
            None => self.name.clone(),
        }
    }
}

/// A call path from an entry function to a vulnerable symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallStack(pub Vec<StackFrame>);

impl CallStack {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.0
    }
}

/// Computes witness import chains for every import sink among the findings.
///
/// Findings sharing a vulnerable package share one chain set, so the map is
/// keyed by the sink package node. Each sink is processed by its own worker
/// thread.
pub fn import_chains(
    result: &ScanResult,
    cancel: &CancelToken,
) -> Result<HashMap<NodeId, Vec<ImportChain>>> {
    let mut sinks: Vec<NodeId> = result
        .findings
        .iter()
        .filter_map(|f| f.import_sink)
        .collect();
    sinks.sort_unstable();
    sinks.dedup();

    let entries: HashSet<NodeId> = result.entry_packages.iter().copied().collect();
    let chains: Mutex<HashMap<NodeId, Vec<ImportChain>>> = Mutex::new(HashMap::new());
    std::thread::scope(|s| {
        for &sink in &sinks {
            let chains = &chains;
            let entries = &entries;
            s.spawn(move || {
                if cancel.is_cancelled() {
                    return;
                }
                let found = chains_to_entries(result, sink, entries);
                chains.lock().unwrap_or_else(|p| p.into_inner()).insert(sink, found);
            });
        }
    });
    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }
    let chains = chains.into_inner().unwrap_or_else(|p| p.into_inner());
    debug!(sinks = chains.len(), "import chains computed");
    Ok(chains)
}

/// BFS from the sink package over imported-by edges. Each package is
/// expanded at most once, so not every chain is enumerated; every chain
/// that reaches an entry package is emitted.
fn chains_to_entries(
    result: &ScanResult,
    sink: NodeId,
    entries: &HashSet<NodeId>,
) -> Vec<ImportChain> {
    let mut visited: HashSet<NodeId> = HashSet::from([sink]);
    // BFS tree pointer towards the sink.
    let mut down: HashMap<NodeId, NodeId> = HashMap::new();
    let mut queue: VecDeque<NodeId> = VecDeque::from([sink]);
    let mut chains = Vec::new();

    while let Some(node) = queue.pop_front() {
        if entries.contains(&node) {
            let mut chain = vec![node];
            let mut cur = node;
            while let Some(&next) = down.get(&cur) {
                chain.push(next);
                cur = next;
            }
            chains.push(chain);
            // Entry packages terminate chains; their importers would only
            // produce longer chains through the same entry.
            continue;
        }
        let mut importers = result.packages.node(node).imported_by.clone();
        importers.sort_unstable();
        for importer in importers {
            if visited.insert(importer) {
                down.insert(importer, node);
                queue.push_back(importer);
            }
        }
    }
    chains.sort_by_key(|c| (c.len(), c.clone()));
    chains
}

/// Computes ranked witness call stacks for every finding with a call sink,
/// keyed by finding index. Each finding is processed by its own worker
/// thread.
pub fn call_stacks(
    result: &ScanResult,
    cancel: &CancelToken,
) -> Result<HashMap<usize, Vec<CallStack>>> {
    let Some(calls) = &result.calls else {
        return Ok(HashMap::new());
    };
    let entries: HashSet<NodeId> = result.entry_functions.iter().copied().collect();
    let stacks: Mutex<HashMap<usize, Vec<CallStack>>> = Mutex::new(HashMap::new());
    std::thread::scope(|s| {
        for (i, finding) in result.findings.iter().enumerate() {
            let Some(sink) = finding.call_sink else {
                continue;
            };
            let stacks = &stacks;
            let entries = &entries;
            s.spawn(move || {
                if cancel.is_cancelled() {
                    return;
                }
                let mut found = stacks_to_entries(calls, sink, entries);
                found.sort_by_key(rank_key);
                stacks.lock().unwrap_or_else(|p| p.into_inner()).insert(i, found);
            });
        }
    });
    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }
    let stacks = stacks.into_inner().unwrap_or_else(|p| p.into_inner());
    debug!(findings = stacks.len(), "call stacks computed");
    Ok(stacks)
}

/// Upward BFS from the sink function. Each function is visited once; among
/// the sites connecting it to a given caller, the lexicographically
/// smallest (file position, then textual form) represents the edge.
fn stacks_to_entries(
    calls: &CallGraph,
    sink: NodeId,
    entries: &HashSet<NodeId>,
) -> Vec<CallStack> {
    let mut visited: HashSet<NodeId> = HashSet::from([sink]);
    // BFS tree pointer towards the sink, with the chosen call site.
    let mut down: HashMap<NodeId, (NodeId, CallSite)> = HashMap::new();
    let mut queue: VecDeque<NodeId> = VecDeque::from([sink]);
    let mut stacks = Vec::new();

    while let Some(node) = queue.pop_front() {
        if entries.contains(&node) {
            stacks.push(build_stack(calls, node, &down));
            continue;
        }
        let mut best: HashMap<NodeId, &CallSite> = HashMap::new();
        for site in &calls.node(node).call_sites {
            best.entry(site.parent)
                .and_modify(|held| {
                    if site_key(site) < site_key(held) {
                        *held = site;
                    }
                })
                .or_insert(site);
        }
        let mut parents: Vec<(NodeId, &CallSite)> = best.into_iter().collect();
        parents.sort_by_key(|(parent, site)| (site_key(site), *parent));
        for (parent, site) in parents {
            if visited.insert(parent) {
                down.insert(parent, (node, site.clone()));
                queue.push_back(parent);
            }
        }
    }
    stacks
}

fn build_stack(calls: &CallGraph, entry: NodeId, down: &HashMap<NodeId, (NodeId, CallSite)>) -> CallStack {
    let mut frames = vec![frame(calls, entry, None)];
    let mut cur = entry;
    while let Some((child, site)) = down.get(&cur) {
        frames.push(frame(calls, *child, Some(site.clone())));
        cur = *child;
    }
    CallStack(frames)
}

fn frame(calls: &CallGraph, id: NodeId, call_site: Option<CallSite>) -> StackFrame {
    let node = calls.node(id);
    StackFrame {
        function: id,
        name: node.name.clone(),
        recv_type: node.recv_type.clone(),
        pkg_path: node.pkg_path.clone(),
        call_site,
    }
}

fn site_key(site: &CallSite) -> (String, u32, u32, String) {
    let (file, line, col) = match &site.pos {
        Some(pos) => (pos.file.clone(), pos.line, pos.col),
        None => (String::new(), 0, 0),
    };
    (file, line, col, format!("{site:?}"))
}

/// Stack ordering: fewer standard-library frames first (they tend to mark
/// false positives), then shorter stacks, then fewer unresolved sites,
/// with a stable textual tiebreaker.
fn rank_key(stack: &CallStack) -> (usize, usize, usize, String) {
    let confidence = stack
        .0
        .iter()
        .filter(|f| is_stdlib_package(&f.pkg_path))
        .count();
    let weight = stack
        .0
        .iter()
        .filter(|f| f.call_site.as_ref().is_some_and(|s| !s.resolved))
        .count();
    let encoding = stack
        .0
        .iter()
        .map(|f| format!("{}.{}", f.pkg_path, f.symbol()))
        .collect::<Vec<_>>()
        .join(" ");
    (confidence, stack.0.len(), weight, encoding)
}
