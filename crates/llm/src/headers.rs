//! Inbound-header forwarding hygiene (spec.md §4.4/§6/§10.4, P8).
//!
//! Only a short whitelist of client headers ever reaches an upstream
//! provider, and a handful are always dropped even if a caller tried to
//! smuggle them in under a whitelisted name's casing. Sorted `const` slices
//! with a binary-search lookup, same trick the sibling gateway crate's
//! `proxy/utils/headers.rs` uses for its own hop-by-hop filtering.

use std::sync::OnceLock;

use http::HeaderMap;

// Kept sorted — `binary_search` requires it.
const WHITELIST: &[&str] = &[
    "accept-language",
    "user-agent",
    "x-correlation-id",
    "x-forwarded-for",
    "x-real-ip",
    "x-request-id",
    "x-trace-id",
];

const BLOCKLIST: &[&str] = &["authorization", "connection", "content-length", "host", "transfer-encoding", "x-api-key"];

fn whitelist() -> &'static [&'static str] {
    static SORTED: OnceLock<Vec<&'static str>> = OnceLock::new();
    SORTED.get_or_init(|| {
        debug_assert!(WHITELIST.is_sorted());
        WHITELIST.to_vec()
    })
}

fn blocklist() -> &'static [&'static str] {
    static SORTED: OnceLock<Vec<&'static str>> = OnceLock::new();
    SORTED.get_or_init(|| {
        debug_assert!(BLOCKLIST.is_sorted());
        BLOCKLIST.to_vec()
    })
}

fn is_whitelisted(name: &str) -> bool {
    whitelist().binary_search(&name).is_ok()
}

pub(crate) fn is_blocked(name: &str) -> bool {
    blocklist().binary_search(&name).is_ok()
}

/// Returns the subset of `inbound` that's safe to forward upstream: on the
/// whitelist and never on the blocklist, regardless of what the client sent.
pub fn forwardable(inbound: &HeaderMap) -> Vec<(String, String)> {
    let mut out = Vec::new();

    for (name, value) in inbound.iter() {
        let name = name.as_str().to_ascii_lowercase();
        if is_blocked(&name) || !is_whitelisted(&name) {
            continue;
        }
        let Ok(value) = value.to_str() else { continue };
        out.push((name, value.to_string()));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_and_blocklist_stay_sorted() {
        assert!(WHITELIST.is_sorted());
        assert!(BLOCKLIST.is_sorted());
    }

    #[test]
    fn blocklisted_headers_never_forward() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        headers.insert("x-api-key", "sk-x".parse().unwrap());
        headers.insert("host", "example.com".parse().unwrap());
        assert!(forwardable(&headers).is_empty());
    }

    #[test]
    fn whitelisted_headers_forward() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "abc-123".parse().unwrap());
        headers.insert("user-agent", "curl/8".parse().unwrap());
        headers.insert("x-unrelated", "nope".parse().unwrap());

        let forwarded = forwardable(&headers);
        assert_eq!(forwarded.len(), 2);
        assert!(forwarded.iter().any(|(n, v)| n == "x-request-id" && v == "abc-123"));
        assert!(forwarded.iter().any(|(n, v)| n == "user-agent" && v == "curl/8"));
    }

    #[test]
    fn blocklist_wins_over_whitelist_casing() {
        let mut headers = HeaderMap::new();
        headers.insert("Host", "internal".parse().unwrap());
        assert!(forwardable(&headers).is_empty());
    }
}
