//! Module model

use serde::{Deserialize, Serialize};

/// Reserved module path under which the database files vulnerabilities in
/// the standard library. Never escaped, and versioned from the toolchain tag.
pub const STDLIB_MODULE_PATH: &str = "stdlib";

/// Reserved module path for the commands shipped with the toolchain.
pub const TOOLCHAIN_MODULE_PATH: &str = "toolchain";

/// A module coordinate as observed in the scanned program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub path: String,
    /// `v`-prefixed module version; empty when unknown.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Replace-directive target, when the module is redirected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<Box<Module>>,
}

impl Module {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Module {
            path: path.into(),
            version: version.into(),
            replace: None,
        }
    }

    /// The module path after following a replace directive.
    pub fn effective_path(&self) -> &str {
        match &self.replace {
            Some(r) => &r.path,
            None => &self.path,
        }
    }

    /// The module version after following a replace directive.
    pub fn effective_version(&self) -> &str {
        match &self.replace {
            Some(r) => &r.version,
            None => &self.version,
        }
    }
}

/// Reports whether an import path belongs to the standard library.
///
/// Standard-library packages have no dot in their first path element
/// (`net/http`, `crypto/tls`), while module-hosted packages start with a
/// domain name.
pub fn is_stdlib_package(import_path: &str) -> bool {
    match import_path.split('/').next() {
        Some(first) if !first.is_empty() => !first.contains('.'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stdlib_package() {
        assert!(is_stdlib_package("net/http"));
        assert!(is_stdlib_package("fmt"));
        assert!(!is_stdlib_package("golang.org/x/net/http2"));
        assert!(!is_stdlib_package("example.com/m"));
        assert!(!is_stdlib_package(""));
    }

    #[test]
    fn test_effective_coordinates_follow_replace() {
        let mut m = Module::new("example.com/m/b", "v1.0.0");
        assert_eq!(m.effective_path(), "example.com/m/b");
        assert_eq!(m.effective_version(), "v1.0.0");

        m.replace = Some(Box::new(Module::new("example.com/r", "v2.1.0")));
        assert_eq!(m.effective_path(), "example.com/r");
        assert_eq!(m.effective_version(), "v2.1.0");
    }
}
