//! OSV vulnerability records for vulnreach
//!
//! This crate models the subset of the Open Source Vulnerability schema used
//! by the Go vulnerability database, plus the version arithmetic needed to
//! decide whether an observed module version is affected:
//!
//! - Content-exact (de)serialization of database entries
//! - SEMVER range containment via ordered introduced/fixed event scans
//! - Conversion of Go toolchain tags (`go1.21rc2`) to semantic versions

pub mod model;
pub mod semver;

pub use model::{
    Affected, AffectedDatabaseSpecific, DatabaseSpecific, EcosystemSpecific, Entry, ImportRecord,
    Package, Range, RangeEvent, RangeKind, Reference, ReferenceKind,
};
