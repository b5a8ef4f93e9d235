//! Source reachability analysis
//!
//! Given an already-loaded package dependency graph and a call-graph
//! builder supplied by the toolchain, this crate computes which known
//! vulnerabilities are reachable from the program's entry points and
//! produces three evidence slices:
//!
//! - the imports slice: packages between entry packages and vulnerable
//!   packages
//! - the requires slice: the module overlay of the imports slice
//! - the call slice: functions on call paths from entry functions to
//!   vulnerable symbols
//!
//! Witness selection distills representative import chains and call stacks
//! out of the slices.

pub mod error;
pub mod package;
pub mod program;
pub mod source;
pub mod witness;

pub use error::{Result, ScanError};
pub use package::{FileSet, LoadedPackage};
pub use program::{CallGraphBuilder, ProgramGraph};
pub use source::{scan_source, ScanResult};
pub use witness::{call_stacks, import_chains, CallStack, ImportChain, StackFrame};
