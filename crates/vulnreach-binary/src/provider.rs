//! Symbol provider abstraction
//!
//! The low-level executable-format readers (ELF, Mach-O, PE) live outside
//! this crate; the analyzer consumes their output through this trait.

use std::collections::HashMap;

use vulnreach_core::{CancelToken, Module};

use crate::error::Result;

/// The build information embedded in an executable.
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    /// Toolchain tag the binary was built with, e.g. `go1.21.3`.
    pub go_version: String,
    /// The main module, when recorded.
    pub main: Option<Module>,
    /// Module dependencies, with replace directives resolved into
    /// [`Module::replace`].
    pub deps: Vec<Module>,
    /// Build settings as recorded in the binary, e.g. `GOOS`, `GOARCH`.
    pub settings: HashMap<String, String>,
}

impl BuildInfo {
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

/// Access to an executable's embedded metadata and symbol table.
pub trait SymbolProvider {
    /// Reads the embedded build information. Fails with
    /// [`crate::BinaryError::NoBuildInfo`] when the executable carries
    /// none.
    fn build_info(&self) -> Result<BuildInfo>;

    /// Returns the fully qualified function symbols defined in the binary,
    /// e.g. `example.com/m/pkg.(*Reader).Read`. Implementations must
    /// include functions found only in inline trees, so that inlined
    /// vulnerable calls are not missed.
    fn symbols(&self, cancel: &CancelToken) -> Result<Vec<String>>;
}
