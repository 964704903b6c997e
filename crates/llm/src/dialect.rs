//! Bidirectional conversions between client-facing dialects and the unified
//! model (spec.md §4.5, C5).

pub mod anthropic;
pub mod anthropic_stream;
pub mod openai;
pub mod responses;
