//! Core types shared across the vulnreach workspace
//!
//! - Cooperative cancellation token passed through every blocking operation
//! - The database source capability trait implemented by `vulnreach-client`
//! - The module model, including replace directives and the standard-library
//!   pseudo-module
//! - The vulnerability matcher: version, platform, package, and symbol
//!   filtering of fetched database entries
//! - The scan configuration record

pub mod cancel;
pub mod config;
pub mod db;
pub mod matcher;
pub mod module;
pub mod symbols;

pub use cancel::CancelToken;
pub use config::ScanConfig;
pub use db::{DbError, DbIndex, DbResult, Source};
pub use matcher::{ModuleVulns, VulnSet};
pub use module::{
    is_stdlib_package, Module, STDLIB_MODULE_PATH, TOOLCHAIN_MODULE_PATH,
};
