//! Environment variable substitution for configuration strings.
//!
//! A value is substituted only when it is *exactly* `$NAME` or `${NAME}` (NAME
//! being uppercase ASCII letters, digits, and underscores). Anything else —
//! including a string that merely contains a `$` somewhere in the middle — is
//! returned unchanged. This mirrors the narrow env-var substitution this
//! codebase's `serde-dynamic-string` crate performs for config values such as
//! API keys, without pulling in the loader that decides *when* to call it.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ResolveError;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\$\{?([A-Z0-9_]+)\}?$").expect("static regex is valid"))
}

/// Resolve a single configuration string against the process environment.
///
/// Returns the input unchanged if it doesn't exactly match `$NAME` or
/// `${NAME}`. Returns [`ResolveError`] if it matches but the named variable
/// isn't set.
pub fn resolve(value: &str) -> Result<String, ResolveError> {
    let Some(captures) = pattern().captures(value) else {
        return Ok(value.to_string());
    };

    let name = &captures[1];

    std::env::var(name).map_err(|_| ResolveError(name.to_string()))
}
