//! Scan configuration

use std::sync::Arc;

use crate::db::Source;

/// Configuration record shared by the source and binary analyzers.
///
/// Every field may be defaulted; a database client must be supplied before
/// an analysis can run (the `vulnreach` facade wires one up from the
/// environment).
#[derive(Clone, Default)]
pub struct ScanConfig {
    /// Skip call-graph construction and report at package granularity.
    pub imports_only: bool,
    /// The vulnerability database client.
    pub db: Option<Arc<dyn Source>>,
    /// Toolchain version the program is built with, as a `go1.N` tag; seeds
    /// the stdlib pseudo-module version.
    pub go_version: Option<String>,
    /// Target operating system; unset matches every entry.
    pub goos: Option<String>,
    /// Target architecture; unset matches every entry.
    pub goarch: Option<String>,
}

impl ScanConfig {
    pub fn new(db: Arc<dyn Source>) -> Self {
        ScanConfig {
            db: Some(db),
            ..Default::default()
        }
    }

    pub fn imports_only(mut self, yes: bool) -> Self {
        self.imports_only = yes;
        self
    }

    pub fn go_version(mut self, tag: impl Into<String>) -> Self {
        self.go_version = Some(tag.into());
        self
    }

    pub fn platform(mut self, goos: impl Into<String>, goarch: impl Into<String>) -> Self {
        self.goos = Some(goos.into());
        self.goarch = Some(goarch.into());
        self
    }
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field("imports_only", &self.imports_only)
            .field("db", &self.db.as_ref().map(|_| "<source>"))
            .field("go_version", &self.go_version)
            .field("goos", &self.goos)
            .field("goarch", &self.goarch)
            .finish()
    }
}
