//! Binary analysis
//!
//! A compiled executable carries its module dependency list, toolchain
//! version, and build settings, plus a symbol table from which function
//! symbols (including inlined ones) can be extracted. That is enough to
//! report symbol-level vulnerabilities, but not call paths: no call-graph
//! or import slices are produced for binaries.
//!
//! The executable-format readers are an external collaborator behind
//! [`SymbolProvider`].

pub mod error;
pub mod provider;
pub mod scan;

pub use error::{BinaryError, Result};
pub use provider::{BuildInfo, SymbolProvider};
pub use scan::{scan_binary, BinaryResult};
