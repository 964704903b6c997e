//! The pipeline engine (spec.md §4.4, C4): resolves a client-supplied model
//! identifier to a configured provider, composes the outbound request
//! (headers, auth, timeout), and dispatches it through the seam traits in
//! [`crate::http_client`]. Grounded on the sibling gateway crate's
//! `server.rs` model-routing logic, re-cast around this crate's simpler
//! `provider,model` syntax (spec.md §6) rather than the sibling's
//! slash-prefixed legacy routing.

use std::{collections::HashMap, time::Duration};

use config::{AuthStyle, ProviderConfig};
use http::{HeaderMap, Method};
use secrecy::ExposeSecret;

use crate::{
    error::{LlmError, Result},
    headers,
    http_client::UpstreamRequest,
    provider::{deepseek::Deepseek, openai_gpt5::OpenAiGpt5, openrouter::{OpenRouter, OpenRouterOptions}},
    reasoning::Reasoning,
    tool_calling::{kimi::{Kimi, KimiOptions}, minimax::{MiniMax, MiniMaxOptions}},
    transformer::{Chain, Transformer},
};

/// Default request timeout (spec.md §4.4/§5): one hour.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Builds the model → provider route table once at startup and resolves
/// incoming model identifiers against it.
pub struct Router<'a> {
    providers: &'a indexmap::IndexMap<String, ProviderConfig>,
    /// Populated from each provider's explicit `models` map, so a bare model
    /// name unambiguously routes even when several providers could serve it
    /// via `model_filter`. The `provider,model` form always wins over this.
    routes: HashMap<String, String>,
}

impl<'a> Router<'a> {
    pub fn new(providers: &'a indexmap::IndexMap<String, ProviderConfig>) -> Self {
        let mut routes = HashMap::new();
        for (provider_name, provider) in providers {
            for model_name in provider.models.keys() {
                routes.entry(model_name.clone()).or_insert_with(|| provider_name.clone());
            }
        }
        Self { providers, routes }
    }

    /// Resolves a client-supplied `model` field (`provider,model` or bare
    /// `model`) to the provider config and the upstream-facing model name.
    pub fn resolve(&self, requested: &str) -> Result<(&'a str, &'a ProviderConfig, String)> {
        if let Some((provider_name, model)) = requested.split_once(',') {
            let (name, config) = self
                .providers
                .get_key_value(provider_name)
                .ok_or_else(|| LlmError::UnknownModel(requested.to_string()))?;
            let resolved = config
                .resolve_model(model)
                .ok_or_else(|| LlmError::UnknownModel(requested.to_string()))?
                .to_string();
            return Ok((name, config, resolved));
        }

        let provider_name = self.routes.get(requested).ok_or_else(|| LlmError::UnknownModel(requested.to_string()))?;
        let (name, config) = self
            .providers
            .get_key_value(provider_name.as_str())
            .ok_or_else(|| LlmError::UnknownModel(requested.to_string()))?;
        let resolved = config.resolve_model(requested).ok_or_else(|| LlmError::UnknownModel(requested.to_string()))?;

        Ok((name, config, resolved.to_string()))
    }
}

/// Deserializes one stage's `transformer.use` options, defaulting when the
/// config entry is a bare name with no `[name, options]` pair.
fn stage_options<T: serde::de::DeserializeOwned + Default>(use_: &config::TransformerUse) -> Result<T> {
    match use_.options() {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| LlmError::Internal(format!("invalid options for transformer '{}': {err}", use_.name()))),
        None => Ok(T::default()),
    }
}

/// Resolves one `transformer.use` entry to a constructed stage. `vertex` is
/// excluded: it needs a runtime `TokenSource` the static config schema
/// can't carry, so callers that need it construct `Vertex::new` directly.
/// `groq`/`cerebras` are excluded too — that module is a handful of free
/// functions with no `Transformer` impl to resolve to.
pub fn build_stage(use_: &config::TransformerUse) -> Result<Box<dyn Transformer>> {
    Ok(match use_.name() {
        "reasoning" => Box::new(Reasoning),
        "kimi" => Box::new(Kimi::new(stage_options::<KimiOptions>(use_)?)),
        "minimax" => Box::new(MiniMax::new(stage_options::<MiniMaxOptions>(use_)?)),
        "deepseek" => Box::new(Deepseek),
        "openai_gpt5" => Box::new(OpenAiGpt5),
        "openrouter" => Box::new(OpenRouter::new(stage_options::<OpenRouterOptions>(use_)?)),
        other => return Err(LlmError::Internal(format!("unknown transformer stage: {other}"))),
    })
}

/// Builds the ordered [`Chain`] a provider (or model override) configures
/// under `transformer.use`.
pub fn build_chain(config: &config::TransformerChainConfig) -> Result<Chain> {
    let stages = config.use_.iter().map(build_stage).collect::<Result<Vec<_>>>()?;
    Ok(Chain::new(stages))
}

/// Builds the outbound request for a resolved provider call: auth header,
/// provider-configured header rules, and the whitelisted subset of inbound
/// headers (spec.md §4.4/§6/§10.4), with the content-type set and the
/// configured timeout applied.
pub fn build_request(
    provider: &ProviderConfig,
    endpoint: &str,
    body: Vec<u8>,
    inbound: &HeaderMap,
) -> Result<UpstreamRequest> {
    let base_url = provider.api_base_url.as_deref().ok_or_else(|| {
        LlmError::Internal("provider is missing an api_base_url".to_string())
    })?;
    let url = format!("{}{endpoint}", base_url.trim_end_matches('/'));

    let mut request_headers = headers::forwardable(inbound);
    request_headers.push(("content-type".to_string(), "application/json".to_string()));

    if let Some(api_key) = &provider.api_key {
        match provider.auth_style {
            AuthStyle::Bearer => {
                request_headers.push(("authorization".to_string(), format!("Bearer {}", api_key.expose_secret())));
            }
            AuthStyle::ApiKeyHeader => {
                request_headers.push(("x-api-key".to_string(), api_key.expose_secret().to_string()));
            }
        }
    }

    for rule in &provider.headers {
        apply_header_rule(&mut request_headers, rule, inbound);
    }

    Ok(UpstreamRequest { method: Method::POST, url, headers: request_headers, body, timeout: DEFAULT_TIMEOUT })
}

/// Applies one configured header rule. Blocklisted names are refused even
/// here (P8): a provider-side `forward`/`insert` rule naming e.g.
/// `authorization` would otherwise resurrect exactly the header the
/// whitelist pass just stripped.
fn apply_header_rule(out: &mut Vec<(String, String)>, rule: &config::HeaderRule, inbound: &HeaderMap) {
    match rule {
        config::HeaderRule::Insert { name, value } => {
            if headers::is_blocked(&name.to_ascii_lowercase()) {
                return;
            }
            out.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            out.push((name.clone(), value.clone()));
        }
        config::HeaderRule::Forward { name, default } => {
            if headers::is_blocked(&name.to_ascii_lowercase()) {
                return;
            }
            let value = inbound.get(name).and_then(|v| v.to_str().ok()).map(str::to_string).or_else(|| default.clone());
            if let Some(value) = value {
                out.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
                out.push((name.clone(), value));
            }
        }
        config::HeaderRule::Remove { name } => {
            out.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        }
    }
}
