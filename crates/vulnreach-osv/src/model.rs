//! OSV entry model
//!
//! Field names and optionality mirror the database documents exactly so that
//! parse → serialize round-trips preserve every field that was present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::semver::canonical;

/// The ecosystem tag the Go vulnerability database uses in `affected.package`.
pub const ECOSYSTEM_GO: &str = "Go";

/// A single vulnerability database entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Unique identifier within the database, e.g. `GO-2022-0969`.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Set when the entry has been withdrawn from the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawn: Option<DateTime<Utc>>,
    /// External identifiers for the same vulnerability, e.g. CVE numbers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected: Vec<Affected>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_specific: Option<DatabaseSpecific>,
}

/// The package (module, for Go) a vulnerability report applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Module path, or the `stdlib`/`toolchain` pseudo-paths.
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ecosystem: String,
}

/// One affected module together with the version ranges and symbols involved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Affected {
    pub package: Package,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<Range>,
    #[serde(default, skip_serializing_if = "EcosystemSpecific::is_empty")]
    pub ecosystem_specific: EcosystemSpecific,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_specific: Option<AffectedDatabaseSpecific>,
}

impl Affected {
    /// Reports whether `version` falls inside this record's SEMVER ranges.
    ///
    /// No ranges at all means every version is affected. When SEMVER ranges
    /// are present, an empty or non-semver `version` is contained by none of
    /// them and the record does not apply.
    pub fn affects_semver(&self, version: &str) -> bool {
        if self.ranges.is_empty() {
            return true;
        }
        let mut semver_range_present = false;
        for range in &self.ranges {
            if range.kind != RangeKind::Semver {
                continue;
            }
            semver_range_present = true;
            if range.contains(version) {
                return true;
            }
        }
        !semver_range_present
    }
}

/// The kind of version range supplied in an affected record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RangeKind {
    Semver,
    Ecosystem,
    Git,
}

impl Default for RangeKind {
    fn default() -> Self {
        RangeKind::Semver
    }
}

/// An ordered list of introduced/fixed events describing affected versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    #[serde(rename = "type", default)]
    pub kind: RangeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<RangeEvent>,
}

impl Range {
    /// Reports whether `version` is inside this range.
    ///
    /// Events are scanned in canonical version order; an `introduced` event
    /// at or below the target switches the affected state on, a `fixed`
    /// event at or below the target switches it off. `introduced: "0"`
    /// sorts before every version.
    pub fn contains(&self, version: &str) -> bool {
        if self.kind != RangeKind::Semver {
            return false;
        }
        let Some(target) = canonical(version) else {
            return false;
        };
        let mut events = self.events.clone();
        events.sort_by(compare_events);
        let mut affected = false;
        for event in &events {
            if !affected && !event.introduced.is_empty() {
                if event.introduced == "0"
                    || canonical(&event.introduced).is_some_and(|v| target >= v)
                {
                    affected = true;
                }
            } else if affected && !event.fixed.is_empty() {
                if canonical(&event.fixed).is_some_and(|v| target >= v) {
                    affected = false;
                }
            }
        }
        affected
    }
}

fn compare_events(a: &RangeEvent, b: &RangeEvent) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let (va, vb) = (a.version(), b.version());
    match (va == "0", vb == "0") {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => match (canonical(va), canonical(vb)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

/// A version where the affected state of a range changes.
///
/// Exactly one of the fields is set in well-formed database entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub introduced: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fixed: String,
}

impl RangeEvent {
    fn version(&self) -> &str {
        if !self.introduced.is_empty() {
            &self.introduced
        } else {
            &self.fixed
        }
    }
}

/// Go-specific detail attached to an affected record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcosystemSpecific {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportRecord>,
}

impl EcosystemSpecific {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}

/// An affected import path with its platform and symbol restrictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goos: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goarch: Vec<String>,
    /// Affected symbols; empty means every symbol in the package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
}

impl ImportRecord {
    /// Reports whether this import applies on the given target platform.
    ///
    /// An empty goos/goarch list matches every platform; an unset target
    /// matches every list.
    pub fn matches_platform(&self, goos: Option<&str>, goarch: Option<&str>) -> bool {
        platform_matches(&self.goos, goos) && platform_matches(&self.goarch, goarch)
    }

    /// Reports whether `symbol` is affected under this import record.
    pub fn affects_symbol(&self, symbol: &str) -> bool {
        self.symbols.is_empty() || self.symbols.iter().any(|s| s == symbol)
    }
}

fn platform_matches(list: &[String], target: Option<&str>) -> bool {
    if list.is_empty() {
        return true;
    }
    match target {
        None | Some("") => true,
        Some(t) => list.iter().any(|x| x == t),
    }
}

/// The kind of an external reference link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReferenceKind {
    Advisory,
    Article,
    Report,
    Fix,
    Package,
    Evidence,
    Web,
}

/// A typed URL associated with an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    pub url: String,
}

/// Database-level detail attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSpecific {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// Database-level detail attached to an affected record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffectedDatabaseSpecific {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}
