//! Module path escaping
//!
//! Database files are named after module paths, which may contain uppercase
//! letters that collide on case-insensitive filesystems. Escaping replaces
//! each uppercase letter with `!` followed by its lowercase form. The
//! `stdlib` and `toolchain` pseudo-paths are the only non-module paths the
//! database serves and pass through untouched.

use vulnreach_core::{DbError, DbResult, STDLIB_MODULE_PATH, TOOLCHAIN_MODULE_PATH};

/// Escapes a module path for use as a database file name.
pub fn escape_module_path(path: &str) -> DbResult<String> {
    if path == STDLIB_MODULE_PATH || path == TOOLCHAIN_MODULE_PATH {
        return Ok(path.to_string());
    }
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '!' => {
                return Err(invalid(path, "'!' is reserved by the escaping scheme"));
            }
            c if !c.is_ascii() => {
                return Err(invalid(path, "path must be ASCII"));
            }
            c if c.is_ascii_control() => {
                return Err(invalid(path, "path may not contain control characters"));
            }
            'A'..='Z' => {
                escaped.push('!');
                escaped.push(c.to_ascii_lowercase());
            }
            c => escaped.push(c),
        }
    }
    Ok(escaped)
}

/// Inverts [`escape_module_path`].
pub fn unescape_module_path(escaped: &str) -> DbResult<String> {
    if escaped == STDLIB_MODULE_PATH || escaped == TOOLCHAIN_MODULE_PATH {
        return Ok(escaped.to_string());
    }
    let mut path = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        match c {
            '!' => match chars.next() {
                Some(lower @ 'a'..='z') => path.push(lower.to_ascii_uppercase()),
                _ => {
                    return Err(invalid(escaped, "'!' must be followed by a lowercase letter"));
                }
            },
            'A'..='Z' => {
                return Err(invalid(escaped, "escaped path may not contain uppercase letters"));
            }
            c => path.push(c),
        }
    }
    Ok(path)
}

fn invalid(path: &str, message: &str) -> DbError {
    DbError::InvalidModulePath {
        path: path.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_uppercase() {
        assert_eq!(
            escape_module_path("github.com/Azure/azure-sdk").unwrap(),
            "github.com/!azure/azure-sdk"
        );
        assert_eq!(
            escape_module_path("example.com/m").unwrap(),
            "example.com/m"
        );
    }

    #[test]
    fn test_pseudo_paths_pass_through() {
        assert_eq!(escape_module_path("stdlib").unwrap(), "stdlib");
        assert_eq!(escape_module_path("toolchain").unwrap(), "toolchain");
        assert_eq!(unescape_module_path("stdlib").unwrap(), "stdlib");
    }

    #[test]
    fn test_escape_round_trip() {
        for path in [
            "example.com/m",
            "github.com/BurntSushi/toml",
            "github.com/Sirupsen/logrus",
            "gopkg.in/yaml.v2",
        ] {
            let escaped = escape_module_path(path).unwrap();
            assert_eq!(unescape_module_path(&escaped).unwrap(), path);
        }
    }

    #[test]
    fn test_escape_rejects_reserved() {
        assert!(escape_module_path("example.com/dont!panic").is_err());
        assert!(escape_module_path("example.com/\u{00e9}").is_err());
    }

    #[test]
    fn test_unescape_rejects_malformed() {
        assert!(unescape_module_path("example.com/!").is_err());
        assert!(unescape_module_path("example.com/!9").is_err());
        assert!(unescape_module_path("example.com/Upper").is_err());
    }
}
