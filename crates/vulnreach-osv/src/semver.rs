//! Semantic version helpers
//!
//! The database stores canonical semver without a prefix, module versions
//! arrive `v`-prefixed, and the standard library is versioned by toolchain
//! tags like `go1.21rc2`. Everything is normalized through [`canonical`]
//! before comparison.

use semver::Version;

/// Parses a version in bare (`1.2.3`), `v`-prefixed, or `go`-tag form into a
/// comparable semantic version. Returns `None` for anything invalid,
/// including the empty string.
pub fn canonical(v: &str) -> Option<Version> {
    if v.is_empty() {
        return None;
    }
    if v.starts_with("go") {
        let tag = go_tag_to_semver(v);
        return Version::parse(tag.strip_prefix('v')?).ok();
    }
    Version::parse(v.strip_prefix('v').unwrap_or(v)).ok()
}

/// Reports whether `v` parses as a version in any accepted form.
pub fn is_valid(v: &str) -> bool {
    canonical(v).is_some()
}

/// Converts a Go toolchain tag to a `v`-prefixed semantic version.
///
/// `go1` maps to `v1.0.0` and `go1.0` to the empty string; otherwise the
/// `go` prefix is stripped, a missing patch level becomes `.0`, and release
/// candidate markers become pre-release suffixes: `go1.21rc2` → `v1.21.0-rc.2`.
/// Unrecognized tags map to the empty string.
pub fn go_tag_to_semver(tag: &str) -> String {
    let Some(tag) = tag.split_whitespace().next() else {
        return String::new();
    };
    match tag {
        "go1" => return "v1.0.0".to_string(),
        "go1.0" => return String::new(),
        _ => {}
    }
    let Some(rest) = tag.strip_prefix("go") else {
        return String::new();
    };
    let (numbers, pre) = split_prerelease(rest);
    let fields: Vec<&str> = numbers.split('.').collect();
    if fields.len() < 2 || fields.len() > 3 || !fields.iter().all(|f| is_number(f)) {
        return String::new();
    }
    let mut version = format!("v{}.{}", fields[0], fields[1]);
    match fields.get(2) {
        Some(patch) => {
            version.push('.');
            version.push_str(patch);
        }
        None => version.push_str(".0"),
    }
    if let Some((kind, n)) = pre {
        version.push('-');
        version.push_str(kind);
        version.push('.');
        version.push_str(n);
    }
    version
}

/// Splits `1.21rc2` into `("1.21", Some(("rc", "2")))`. The recognized
/// pre-release markers are `beta`, `rc`, and `-pre`.
fn split_prerelease(s: &str) -> (&str, Option<(&str, &str)>) {
    for marker in ["beta", "rc", "-pre"] {
        if let Some(at) = s.find(marker) {
            let numbers = &s[..at];
            let n = &s[at + marker.len()..];
            if !n.is_empty() && is_number(n) {
                return (numbers, Some((marker.trim_start_matches('-'), n)));
            }
        }
    }
    (s, None)
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_tag_to_semver() {
        let cases = [
            ("go1", "v1.0.0"),
            ("go1.0", ""),
            ("go1.18", "v1.18.0"),
            ("go1.19.5", "v1.19.5"),
            ("go1.21rc2", "v1.21.0-rc.2"),
            ("go1.18beta1", "v1.18.0-beta.1"),
            ("go1.9.2-pre1", "v1.9.2-pre.1"),
            ("go1.21.0 X:boringcrypto", "v1.21.0"),
            ("", ""),
            ("devel +abc123", ""),
            ("go1.x", ""),
        ];
        for (tag, want) in cases {
            assert_eq!(go_tag_to_semver(tag), want, "tag {tag:?}");
        }
    }

    #[test]
    fn test_canonical_accepts_all_prefixes() {
        let a = canonical("1.2.3").unwrap();
        let b = canonical("v1.2.3").unwrap();
        assert_eq!(a, b);
        let c = canonical("go1.2.3").unwrap();
        assert_eq!(a, c);
        assert!(canonical("").is_none());
        assert!(canonical("not-a-version").is_none());
    }

    #[test]
    fn test_canonical_orders_prereleases_first() {
        let rc = canonical("go1.21rc1").unwrap();
        let rel = canonical("v1.21.0").unwrap();
        assert!(rc < rel);
    }

    #[test]
    fn test_is_valid() {
        assert!(is_valid("v1.0.0"));
        assert!(is_valid("go1.20"));
        assert!(!is_valid(""));
        assert!(!is_valid("1.2"));
    }
}
