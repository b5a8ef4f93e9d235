//! Loaded-package model
//!
//! The package loader is an external collaborator; the analyzer consumes
//! its output as a DAG of [`LoadedPackage`] values sharing one [`FileSet`].

use std::collections::BTreeMap;
use std::sync::Arc;

use vulnreach_core::Module;

/// Opaque handle for the position table all packages of one load share.
/// Identity is the `Arc` pointer; analyses reject inputs mixing file sets.
#[derive(Debug, Default)]
pub struct FileSet {
    _private: (),
}

impl FileSet {
    pub fn new() -> Arc<FileSet> {
        Arc::new(FileSet::default())
    }
}

/// One package of the scanned program, as produced by the loader.
#[derive(Debug, Clone)]
pub struct LoadedPackage {
    /// Package name, e.g. `http2`.
    pub name: String,
    /// Import path, e.g. `golang.org/x/net/http2`.
    pub path: String,
    /// The module containing this package; `None` for the standard library.
    pub module: Option<Module>,
    pub fset: Arc<FileSet>,
    pub imports: Vec<Arc<LoadedPackage>>,
    /// Names of the package's exported symbols, used when a database entry
    /// affects a package without naming symbols.
    pub exported_symbols: Vec<String>,
}

impl LoadedPackage {
    pub fn new(name: impl Into<String>, path: impl Into<String>, fset: Arc<FileSet>) -> Self {
        LoadedPackage {
            name: name.into(),
            path: path.into(),
            module: None,
            fset,
            imports: Vec::new(),
            exported_symbols: Vec::new(),
        }
    }
}

/// Collects the transitive closure of `pkgs`, keyed and ordered by import
/// path.
pub(crate) fn transitive_packages(
    pkgs: &[Arc<LoadedPackage>],
) -> BTreeMap<String, Arc<LoadedPackage>> {
    let mut all = BTreeMap::new();
    let mut stack: Vec<Arc<LoadedPackage>> = pkgs.to_vec();
    while let Some(pkg) = stack.pop() {
        if all.contains_key(&pkg.path) {
            continue;
        }
        stack.extend(pkg.imports.iter().cloned());
        all.insert(pkg.path.clone(), pkg);
    }
    all
}

/// Checks that every package in the closure shares one file set.
pub(crate) fn shares_one_fileset(all: &BTreeMap<String, Arc<LoadedPackage>>) -> bool {
    let mut iter = all.values();
    let Some(first) = iter.next() else { return true };
    iter.all(|pkg| Arc::ptr_eq(&pkg.fset, &first.fset))
}
