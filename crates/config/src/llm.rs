//! LLM provider/model configuration schema.
//!
//! This mirrors the shape spec.md §6 calls "Configuration schema": a provider
//! entry is `{name, api_base_url, api_key, models[], transformer?}`, where
//! `transformer.use` is an ordered list of transformer names or
//! `[name, options]` pairs. Loading this from a file or environment (merging,
//! watching, validating cross-references) is the out-of-scope registry/loader
//! concern named in spec.md §1 — only the schema types and small pure helpers
//! live here.

use std::{collections::BTreeMap, fmt};

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::headers::HeaderRule;

/// Top-level LLM gateway configuration: one entry per named provider.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub enabled_default: bool,
    pub providers: IndexMap<String, ProviderConfig>,
}

/// The upstream wire protocol a provider speaks.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    OpenAi,
    Anthropic,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::OpenAi
    }
}

/// How a provider wants its API key attached to outbound requests.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    Bearer,
    ApiKeyHeader,
}

impl Default for AuthStyle {
    fn default() -> Self {
        Self::Bearer
    }
}

/// Case-insensitive regex filter for matching model identifiers, used to
/// auto-route otherwise-unconfigured models to a provider.
#[derive(Clone)]
pub struct ModelFilter {
    regex: Regex,
}

impl ModelFilter {
    fn new(pattern: &str) -> Result<Self, String> {
        let trimmed = pattern.trim();

        if trimmed.is_empty() {
            return Err("model_filter cannot be empty".to_string());
        }

        let regex = RegexBuilder::new(trimmed)
            .case_insensitive(true)
            .build()
            .map_err(|err| format!("invalid model_filter regex: {err}"))?;

        Ok(Self { regex })
    }

    pub fn is_match(&self, model: &str) -> bool {
        self.regex.is_match(model)
    }
}

impl fmt::Debug for ModelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFilter").field("pattern", &self.regex.as_str()).finish()
    }
}

impl<'de> Deserialize<'de> for ModelFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        ModelFilter::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// Configuration for a single model within a provider.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Actual provider-side model name, if it differs from the config key.
    pub rename: Option<String>,
    /// Header rules scoped to this model only (applied after the provider's own).
    pub headers: Vec<HeaderRule>,
    /// Transformer chain scoped to this model only; falls back to the
    /// provider's chain when absent.
    pub transformer: Option<TransformerChainConfig>,
}

/// An element of `transformer.use`: a bare transformer name, or a
/// `[name, options]` pair carrying per-stage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransformerUse {
    Name(String),
    NameWithOptions(String, serde_json::Value),
}

impl TransformerUse {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::NameWithOptions(name, _) => name,
        }
    }

    pub fn options(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Name(_) => None,
            Self::NameWithOptions(_, options) => Some(options),
        }
    }
}

/// An ordered transformer chain bound to a provider, optionally scoped to one
/// model through [`ModelConfig::transformer`].
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct TransformerChainConfig {
    #[serde(rename = "use", default)]
    pub use_: Vec<TransformerUse>,
}

/// A configured upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub protocol: Protocol,
    pub api_base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub auth_style: AuthStyle,
    pub forward_token: bool,
    pub model_filter: Option<ModelFilter>,
    pub models: BTreeMap<String, ModelConfig>,
    pub headers: Vec<HeaderRule>,
    pub transformer: TransformerChainConfig,
}

impl<'de> Deserialize<'de> for ProviderConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize, Default)]
        #[serde(default, rename_all = "snake_case")]
        struct Raw {
            protocol: Protocol,
            api_base_url: Option<String>,
            api_key: Option<SecretString>,
            auth_style: AuthStyle,
            forward_token: bool,
            model_filter: Option<ModelFilter>,
            models: BTreeMap<String, ModelConfig>,
            headers: Vec<HeaderRule>,
            transformer: TransformerChainConfig,
        }

        let raw = Raw::deserialize(deserializer)?;

        Ok(Self {
            protocol: raw.protocol,
            api_base_url: raw.api_base_url,
            api_key: raw.api_key,
            auth_style: raw.auth_style,
            forward_token: raw.forward_token,
            model_filter: raw.model_filter,
            models: raw.models,
            headers: raw.headers,
            transformer: raw.transformer,
        })
    }
}

impl ProviderConfig {
    /// Resolve a requested model name to its upstream name, honouring
    /// `rename` and the provider's model filter.
    pub fn resolve_model<'a>(&'a self, requested: &'a str) -> Option<&'a str> {
        if let Some(model) = self.models.get(requested) {
            return Some(model.rename.as_deref().unwrap_or(requested));
        }

        if let Some(filter) = &self.model_filter
            && filter.is_match(requested)
        {
            return Some(requested);
        }

        None
    }
}
