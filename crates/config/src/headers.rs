//! Header transformation rules attached to a provider or model.
//!
//! These are the configuration-side counterpart of the hygiene rules the
//! pipeline engine enforces unconditionally (`llm::headers`):
//! a `HeaderRule` can only ever add to or rename headers the engine is going
//! to send anyway, never resurrect a blocked one.

use serde::Deserialize;

/// A single outbound header transformation, configured per provider or model.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum HeaderRule {
    /// Always set `name` to `value`, overwriting any existing header.
    Insert { name: String, value: String },
    /// Forward the inbound header `name` if present, otherwise `default` if set.
    Forward {
        name: String,
        #[serde(default)]
        default: Option<String>,
    },
    /// Drop the header `name` from the outbound request.
    Remove { name: String },
}
