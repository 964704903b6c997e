//! Provider-specific request/response reshaping (spec.md §4.6, C6). Each
//! submodule owns the quirks one upstream family needs beyond the generic
//! OpenAI-dialect wire format; everything else flows through
//! [`crate::dialect::openai`] untouched.

pub mod deepseek;
pub mod groq_cerebras;
pub mod openai_gpt5;
pub mod openrouter;
pub mod vertex;
