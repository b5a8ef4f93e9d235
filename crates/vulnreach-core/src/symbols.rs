//! Go symbol-name parsing
//!
//! Symbol tables and inline trees name functions as
//! `path/to/pkg.Func` or `path/to/pkg.(*Recv).Method`. The database names
//! methods `Recv.Method` with the pointer-receiver marker stripped, so both
//! spellings normalize to that form.

/// Splits a fully qualified symbol into (package path, normalized symbol).
///
/// Returns `None` for names that do not follow the `pkg.symbol` shape, such
/// as compiler-generated type descriptors.
pub fn parse_symbol(full: &str) -> Option<(String, String)> {
    let (pkg, sym) = match full.rfind('/') {
        Some(slash) => {
            let tail = &full[slash + 1..];
            let dot = tail.find('.')?;
            (&full[..slash + 1 + dot], &tail[dot + 1..])
        }
        None => {
            let dot = full.find('.')?;
            (&full[..dot], &full[dot + 1..])
        }
    };
    if pkg.is_empty() || sym.is_empty() {
        return None;
    }
    Some((pkg.to_string(), normalize_receiver(sym)))
}

/// Rewrites `(*Recv).Method` to `Recv.Method`; other names pass through.
pub fn normalize_receiver(sym: &str) -> String {
    if let Some(rest) = sym.strip_prefix("(*") {
        if let Some((recv, method)) = rest.split_once(')') {
            return format!("{recv}{method}");
        }
    }
    sym.to_string()
}

/// The symbol name for a function, `Recv.Method` when it is a method.
pub fn symbol_name(recv_type: Option<&str>, name: &str) -> String {
    match recv_type {
        Some(recv) => {
            let recv = recv.trim_start_matches('*');
            // Receiver types may arrive fully qualified; only the bare type
            // name participates in database symbol names.
            let recv = recv.rsplit('/').next().unwrap_or(recv);
            let recv = recv.rsplit('.').next().unwrap_or(recv);
            format!("{recv}.{name}")
        }
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_function() {
        assert_eq!(
            parse_symbol("example.com/m/pkg.Decode"),
            Some(("example.com/m/pkg".to_string(), "Decode".to_string()))
        );
        assert_eq!(
            parse_symbol("main.main"),
            Some(("main".to_string(), "main".to_string()))
        );
    }

    #[test]
    fn test_parse_method_strips_pointer_receiver() {
        assert_eq!(
            parse_symbol("example.com/m/pkg.(*Reader).Read"),
            Some(("example.com/m/pkg".to_string(), "Reader.Read".to_string()))
        );
        assert_eq!(
            parse_symbol("example.com/m/pkg.Reader.Read"),
            Some(("example.com/m/pkg".to_string(), "Reader.Read".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_non_symbols() {
        assert_eq!(parse_symbol("go-buildid"), None);
        assert_eq!(parse_symbol(""), None);
    }

    #[test]
    fn test_symbol_name() {
        assert_eq!(symbol_name(None, "Vuln"), "Vuln");
        assert_eq!(symbol_name(Some("VulnData"), "Vuln1"), "VulnData.Vuln1");
        assert_eq!(symbol_name(Some("*VulnData"), "Vuln1"), "VulnData.Vuln1");
        assert_eq!(
            symbol_name(Some("example.com/m/avuln.VulnData"), "Vuln1"),
            "VulnData.Vuln1"
        );
    }
}
