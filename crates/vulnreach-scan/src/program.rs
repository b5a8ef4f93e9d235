//! Whole-program call graph
//!
//! SSA and call-graph construction belong to the toolchain; the analyzer
//! receives the finished graph through [`CallGraphBuilder`] and only slices
//! it. The graph is a petgraph arena: functions are nodes, call edges carry
//! the site position and whether the callee was statically resolved.

use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use vulnreach_core::{symbols::symbol_name, CancelToken};
use vulnreach_graph::Position;

use crate::error::Result;
use crate::package::LoadedPackage;

/// A function in the whole program.
#[derive(Debug, Clone)]
pub struct ProgFunc {
    pub name: String,
    pub recv_type: Option<String>,
    pub pkg_path: String,
    pub pos: Option<Position>,
    /// Compiler-generated forwarding wrapper (for example the pointer
    /// wrapper created for an interface dispatch). Wrappers never appear in
    /// witness stacks.
    pub wrapper: bool,
}

impl ProgFunc {
    pub fn symbol(&self) -> String {
        symbol_name(self.recv_type.as_deref(), &self.name)
    }
}

/// A call edge in the whole program.
#[derive(Debug, Clone)]
pub struct ProgCall {
    pub pos: Option<Position>,
    /// True for static calls, false for interface or function-value
    /// dispatch.
    pub resolved: bool,
}

/// The whole-program call graph handed over by the builder.
#[derive(Debug, Clone, Default)]
pub struct ProgramGraph {
    pub(crate) graph: DiGraph<ProgFunc, ProgCall>,
    pub(crate) entries: Vec<NodeIndex>,
}

impl ProgramGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func(
        &mut self,
        name: &str,
        recv_type: Option<&str>,
        pkg_path: &str,
        pos: Option<Position>,
        wrapper: bool,
    ) -> NodeIndex {
        self.graph.add_node(ProgFunc {
            name: name.to_string(),
            recv_type: recv_type.map(str::to_string),
            pkg_path: pkg_path.to_string(),
            pos,
            wrapper,
        })
    }

    pub fn add_call(
        &mut self,
        caller: NodeIndex,
        callee: NodeIndex,
        pos: Option<Position>,
        resolved: bool,
    ) {
        self.graph.add_edge(caller, callee, ProgCall { pos, resolved });
    }

    /// Marks a program entry point: a top-level function or initializer of
    /// a user-provided package.
    pub fn add_entry(&mut self, func: NodeIndex) {
        if !self.entries.contains(&func) {
            self.entries.push(func);
        }
    }

    pub fn func(&self, idx: NodeIndex) -> &ProgFunc {
        &self.graph[idx]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

/// Toolchain facility that builds SSA and derives the whole-program call
/// graph. Runs on a background thread, overlapped with database fetches.
pub trait CallGraphBuilder: Send + Sync {
    fn build(&self, pkgs: &[Arc<LoadedPackage>], cancel: &CancelToken) -> Result<ProgramGraph>;
}
