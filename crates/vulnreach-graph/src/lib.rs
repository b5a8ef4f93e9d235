//! Graph slices produced by an analysis
//!
//! Three arenas (packages, modules, functions) hold the parts of the
//! program reachable between entry points and vulnerable code. Nodes are
//! owned by their arena and refer to each other by dense integer
//! identifiers assigned in walk order, starting at 1; edges never own
//! nodes, so the naturally cyclic call graph needs no special treatment
//! beyond visited sets during traversal. Graphs live for one analysis and
//! nodes are never deleted.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use vulnreach_osv::Entry;

/// Identifier of a node within one arena. Valid identifiers are positive;
/// back-references in findings use `None` for "not in the slice".
pub type NodeId = i64;

/// A position in a source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Position {
            file: file.into(),
            line,
            col,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// A package on the imports slice.
#[derive(Debug, Clone, Serialize)]
pub struct PkgNode {
    pub id: NodeId,
    pub name: String,
    pub path: String,
    /// The module containing this package, in the module arena.
    pub module: NodeId,
    /// Packages that import this one.
    pub imported_by: Vec<NodeId>,
}

/// The packages reachable via imports between entries and vulnerable code.
#[derive(Debug, Default)]
pub struct PackageGraph {
    nodes: Vec<PkgNode>,
    by_path: HashMap<String, NodeId>,
}

impl PackageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a package, or returns the existing node for its path.
    pub fn add(&mut self, name: &str, path: &str) -> NodeId {
        if let Some(&id) = self.by_path.get(path) {
            return id;
        }
        let id = (self.nodes.len() + 1) as NodeId;
        self.nodes.push(PkgNode {
            id,
            name: name.to_string(),
            path: path.to_string(),
            module: 0,
            imported_by: Vec::new(),
        });
        self.by_path.insert(path.to_string(), id);
        id
    }

    /// Records that `importer` imports `imported`.
    pub fn add_import_edge(&mut self, importer: NodeId, imported: NodeId) {
        let node = self.node_mut(imported);
        if !node.imported_by.contains(&importer) {
            node.imported_by.push(importer);
        }
    }

    pub fn set_module(&mut self, pkg: NodeId, module: NodeId) {
        self.node_mut(pkg).module = module;
    }

    pub fn node(&self, id: NodeId) -> &PkgNode {
        &self.nodes[(id - 1) as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut PkgNode {
        &mut self.nodes[(id - 1) as usize]
    }

    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PkgNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A module on the requires slice.
#[derive(Debug, Clone, Serialize)]
pub struct ModNode {
    pub id: NodeId,
    pub path: String,
    pub version: String,
    /// Replacement module node, when a replace directive applies.
    pub replace: Option<NodeId>,
    /// Modules whose packages import packages of this module.
    pub required_by: Vec<NodeId>,
}

/// The modules required between the entry modules and vulnerable modules.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    nodes: Vec<ModNode>,
    by_path: HashMap<String, NodeId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module, or returns the existing node for its path.
    pub fn add(&mut self, path: &str, version: &str) -> NodeId {
        if let Some(&id) = self.by_path.get(path) {
            return id;
        }
        let id = (self.nodes.len() + 1) as NodeId;
        self.nodes.push(ModNode {
            id,
            path: path.to_string(),
            version: version.to_string(),
            replace: None,
            required_by: Vec::new(),
        });
        self.by_path.insert(path.to_string(), id);
        id
    }

    pub fn set_replace(&mut self, module: NodeId, replacement: NodeId) {
        self.node_mut(module).replace = Some(replacement);
    }

    /// Records that `requirer`'s packages import packages of `required`.
    /// Self-edges are suppressed.
    pub fn add_require_edge(&mut self, requirer: NodeId, required: NodeId) {
        if requirer == required {
            return;
        }
        let node = self.node_mut(required);
        if !node.required_by.contains(&requirer) {
            node.required_by.push(requirer);
        }
    }

    pub fn node(&self, id: NodeId) -> &ModNode {
        &self.nodes[(id - 1) as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut ModNode {
        &mut self.nodes[(id - 1) as usize]
    }

    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A call of a function, recorded on the callee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSite {
    /// The calling function.
    pub parent: NodeId,
    /// Name of the called function as written at the site.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recv_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<Position>,
    /// True for static calls; false for interface or function-value
    /// dispatch.
    pub resolved: bool,
}

/// A function on the call slice.
#[derive(Debug, Clone, Serialize)]
pub struct FuncNode {
    pub id: NodeId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recv_type: Option<String>,
    pub pkg_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<Position>,
    /// The sites at which this function is called.
    pub call_sites: Vec<CallSite>,
}

impl FuncNode {
    /// `Recv.Name` for methods, the bare name otherwise.
    pub fn symbol(&self) -> String {
        match &self.recv_type {
            Some(recv) => format!("{}.{}", recv.trim_start_matches('*'), self.name),
            None => self.name.clone(),
        }
    }
}

/// The functions on call paths between entry functions and vulnerable
/// symbols.
#[derive(Debug, Default)]
pub struct CallGraph {
    nodes: Vec<FuncNode>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        name: &str,
        recv_type: Option<&str>,
        pkg_path: &str,
        pos: Option<Position>,
    ) -> NodeId {
        let id = (self.nodes.len() + 1) as NodeId;
        self.nodes.push(FuncNode {
            id,
            name: name.to_string(),
            recv_type: recv_type.map(str::to_string),
            pkg_path: pkg_path.to_string(),
            pos,
            call_sites: Vec::new(),
        });
        id
    }

    /// Records a site calling `callee`.
    pub fn add_call_site(&mut self, callee: NodeId, site: CallSite) {
        let node = &mut self.nodes[(callee - 1) as usize];
        if !node.call_sites.contains(&site) {
            node.call_sites.push(site);
        }
    }

    pub fn node(&self, id: NodeId) -> &FuncNode {
        &self.nodes[(id - 1) as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FuncNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One vulnerable symbol together with the evidence handles into the three
/// slices.
#[derive(Debug, Clone)]
pub struct Finding {
    /// The database entry this finding was derived from.
    pub osv: Arc<Entry>,
    /// `Recv.Method` for methods, bare name for functions.
    pub symbol: String,
    pub pkg_path: String,
    pub mod_path: String,
    /// Node of `symbol` in the call slice; set only when the symbol is
    /// actually called.
    pub call_sink: Option<NodeId>,
    /// Node of the package in the imports slice.
    pub import_sink: Option<NodeId>,
    /// Node of the module in the requires slice.
    pub require_sink: Option<NodeId>,
}

impl Serialize for Finding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // The wire form carries the OSV identifier, not the whole record.
        let mut s = serializer.serialize_struct("Finding", 7)?;
        s.serialize_field("osv", &self.osv.id)?;
        s.serialize_field("symbol", &self.symbol)?;
        s.serialize_field("pkg_path", &self.pkg_path)?;
        s.serialize_field("mod_path", &self.mod_path)?;
        s.serialize_field("call_sink", &self.call_sink)?;
        s.serialize_field("import_sink", &self.import_sink)?;
        s.serialize_field("require_sink", &self.require_sink)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_ids_dense_and_stable() {
        let mut graph = PackageGraph::new();
        let a = graph.add("a", "example.com/a");
        let b = graph.add("b", "example.com/b");
        let again = graph.add("a", "example.com/a");
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(again, a);

        // Identifier assignment is a bijection onto 1..=len.
        let ids: Vec<NodeId> = graph.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_import_edges_deduplicated() {
        let mut graph = PackageGraph::new();
        let a = graph.add("a", "example.com/a");
        let b = graph.add("b", "example.com/b");
        graph.add_import_edge(a, b);
        graph.add_import_edge(a, b);
        assert_eq!(graph.node(b).imported_by, vec![a]);
    }

    #[test]
    fn test_module_self_require_suppressed() {
        let mut graph = ModuleGraph::new();
        let m = graph.add("example.com/m", "v1.0.0");
        graph.add_require_edge(m, m);
        assert!(graph.node(m).required_by.is_empty());
    }

    #[test]
    fn test_func_symbol_names() {
        let mut graph = CallGraph::new();
        let plain = graph.add("Vuln", None, "example.com/bvuln", None);
        let method = graph.add("Vuln1", Some("VulnData"), "example.com/avuln", None);
        let pointer = graph.add("Vuln2", Some("*VulnData"), "example.com/avuln", None);
        assert_eq!(graph.node(plain).symbol(), "Vuln");
        assert_eq!(graph.node(method).symbol(), "VulnData.Vuln1");
        assert_eq!(graph.node(pointer).symbol(), "VulnData.Vuln2");
    }

    #[test]
    fn test_finding_wire_form_uses_entry_id() {
        let finding = Finding {
            osv: Arc::new(Entry {
                id: "GO-2023-0001".to_string(),
                ..Default::default()
            }),
            symbol: "VulnData.Vuln1".to_string(),
            pkg_path: "example.com/avuln".to_string(),
            mod_path: "example.com/a".to_string(),
            call_sink: Some(3),
            import_sink: Some(1),
            require_sink: None,
        };
        let value = serde_json::to_value(&finding).unwrap();
        assert_eq!(value["osv"], "GO-2023-0001");
        assert_eq!(value["call_sink"], 3);
        assert!(value["require_sink"].is_null());
    }
}
