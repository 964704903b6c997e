//! Configuration schema for the LLM gateway: provider/model definitions,
//! header transformation rules, and environment-variable substitution.
//!
//! Loading a [`LlmConfig`] from a file, merging multiple sources, or watching
//! for changes is the out-of-scope configuration-loading concern named in
//! spec.md §1; this crate only defines the schema and the small pure helpers
//! (`resolve`) that are directly testable.

pub mod error;
mod headers;
mod llm;
pub mod resolve;

pub use headers::HeaderRule;
pub use llm::{
    AuthStyle, LlmConfig, ModelConfig, ModelFilter, Protocol, ProviderConfig, TransformerChainConfig, TransformerUse,
};
