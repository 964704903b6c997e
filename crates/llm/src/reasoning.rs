//! Reasoning/thinking normalisation (spec.md §4.8, C8): prefix/hashtag
//! token stripping on the way in, and collapsing the various
//! `thinking`/`reasoning`/`reasoning_content` shapes different upstreams use
//! into this crate's single `reasoning_effort` field (I5) or, on the way
//! out, into a uniform two-part content rendering.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::{
    error::Result,
    transformer::Transformer,
    unified::{self, ReasoningEffort, Request, Verbosity},
};

struct TokenMapping {
    effort: ReasoningEffort,
    verbosity: Verbosity,
}

fn mapping_for(token: &str) -> Option<TokenMapping> {
    match token.to_ascii_lowercase().as_str() {
        "quick" => Some(TokenMapping { effort: ReasoningEffort::Low, verbosity: Verbosity::Low }),
        "deep" => Some(TokenMapping { effort: ReasoningEffort::High, verbosity: Verbosity::Medium }),
        "explain" => Some(TokenMapping { effort: ReasoningEffort::Medium, verbosity: Verbosity::High }),
        "brief" => Some(TokenMapping { effort: ReasoningEffort::Medium, verbosity: Verbosity::Low }),
        _ => None,
    }
}

fn prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(Quick|Deep|Explain|Brief):\s*").unwrap())
}

fn hashtag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)#(quick|deep|explain|brief)\b\s*").unwrap())
}

/// P5: strips at most one prefix token and one hashtag token from the final
/// user message, applying the effort/verbosity mapping to fields not
/// already set. Leaves everything else in the request untouched.
pub fn strip_tokens(request: &mut Request) {
    let Some(message) = request.messages.iter_mut().rev().find(|m| m.role == unified::Role::User) else {
        return;
    };

    let unified::ContentContainer::Text(text) = &mut message.content else {
        return;
    };

    let mut matched = None;

    if let Some(captures) = prefix_regex().captures(text) {
        let token = captures[1].to_string();
        let matched_len = captures[0].len();
        *text = text[matched_len..].to_string();
        matched = mapping_for(&token);
    }

    if let Some(captures) = hashtag_regex().captures(&text.clone()) {
        let token = captures[1].to_string();
        *text = hashtag_regex().replace(text, "").to_string();
        if matched.is_none() {
            matched = mapping_for(&token);
        }
    }

    *text = text.trim().to_string();

    if let Some(mapping) = matched {
        if request.reasoning_effort.is_none() {
            request.reasoning_effort = Some(mapping.effort);
        }
        if request.verbosity.is_none() {
            request.verbosity = Some(mapping.verbosity);
        }
    }
}

/// Collapses whatever reasoning shape an ingress dialect's raw JSON body
/// carries (`thinking`, `enable_thinking`, structured `reasoning`) into the
/// single `reasoning_effort` key, run before the body is parsed into the
/// typed unified request. Anthropic's own `thinking.budget_tokens` is
/// handled in `dialect::anthropic` instead, since that conversion already
/// has a typed `Thinking` value to work from; this is for everything else.
pub fn normalize_reasoning_json(body: &mut Value) {
    let Some(object) = body.as_object_mut() else { return };

    let already_set = object.contains_key("reasoning_effort");

    let thinking_enabled = object
        .get("thinking")
        .and_then(|t| t.get("type"))
        .and_then(Value::as_str)
        .is_some_and(|t| t == "enabled")
        || object.get("enable_thinking").and_then(Value::as_bool).unwrap_or(false);

    if thinking_enabled && !already_set {
        object.insert("reasoning_effort".to_string(), Value::String("medium".to_string()));
    }
    object.remove("thinking");
    object.remove("enable_thinking");

    if let Some(reasoning) = object.remove("reasoning") {
        let already_set = object.contains_key("reasoning_effort");
        if !already_set {
            if let Some(effort) = reasoning.get("effort").and_then(Value::as_str) {
                object.insert("reasoning_effort".to_string(), Value::String(effort.to_string()));
            } else if let Some(max_tokens) = reasoning.get("max_tokens").and_then(Value::as_u64) {
                let effort = if max_tokens > 1000 {
                    "high"
                } else if max_tokens > 500 {
                    "medium"
                } else {
                    "minimal"
                };
                object.insert("reasoning_effort".to_string(), Value::String(effort.to_string()));
            }
            // Any other shape of `reasoning` is dropped (§4.8): no branch needed,
            // the `remove` above already discarded it.
        }
    }
}

/// Response-side (§4.8): when an assistant message carries separate
/// `thinking`, render it as the two-part `[{type:"thinking"}, {type:"text"}]`
/// content array some OpenAI-compatible clients expect, rather than as this
/// crate's internal side-channel field.
pub fn response_content_with_thinking(message: &unified::Message) -> Value {
    let text = message.content.as_text();
    match &message.thinking {
        Some(reasoning) => serde_json::json!([
            { "type": "thinking", "content": reasoning },
            { "type": "text", "text": text },
        ]),
        None => Value::String(text),
    }
}

/// Reasoning stage (§4.8): strips prefix/hashtag tokens from the final user
/// message on the way in. The JSON-level normalisation
/// ([`normalize_reasoning_json`]) and response-side rendering
/// ([`response_content_with_thinking`]) operate on raw pre-/post-parse JSON
/// that no `Transformer` hook exposes, so dialect bridges call those
/// directly instead (see `dialect::openai`).
pub struct Reasoning;

#[async_trait]
impl Transformer for Reasoning {
    fn name(&self) -> &'static str {
        "reasoning"
    }

    async fn request_in(&self, mut request: unified::Request) -> Result<unified::Request> {
        strip_tokens(&mut request);
        Ok(request)
    }
}

/// Per-stream state for the streaming equivalent: accumulates
/// `reasoning_content` deltas into `thinking` deltas and closes them off
/// with a synthesised signature once a non-reasoning delta arrives.
#[derive(Default)]
pub struct ReasoningStreamState {
    accumulating: bool,
}

impl ReasoningStreamState {
    /// Feeds one raw delta (before it's folded into [`unified::ChunkDelta`]
    /// by the provider adapter) and returns the `thinking` delta to emit, if
    /// any. `signature_seed` stands in for the timestamp the source uses —
    /// callers pass a monotonically increasing counter so this stays pure.
    pub fn on_delta(&mut self, reasoning_content: Option<&str>, signature_seed: u64) -> Option<unified::ThinkingDelta> {
        match reasoning_content {
            Some(content) => {
                self.accumulating = true;
                Some(unified::ThinkingDelta { content: Some(content.to_string()), signature: None })
            }
            None if self.accumulating => {
                self.accumulating = false;
                Some(unified::ThinkingDelta { content: None, signature: Some(format!("reasoning-{signature_seed}")) })
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unified::{ContentContainer, Message, Role};

    fn request_with_user_text(text: &str) -> Request {
        Request {
            model: "m".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: ContentContainer::Text(text.to_string()),
                tool_calls: None,
                tool_call_id: None,
                thinking: None,
                annotations: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn deep_prefix_strips_and_sets_high_effort() {
        let mut request = request_with_user_text("Deep: explain TCP");
        strip_tokens(&mut request);
        assert_eq!(request.messages[0].content.as_text(), "explain TCP");
        assert_eq!(request.reasoning_effort, Some(ReasoningEffort::High));
        assert_eq!(request.verbosity, Some(Verbosity::Medium));
    }

    #[test]
    fn hashtag_token_strips_from_anywhere_in_text() {
        let mut request = request_with_user_text("tell me a joke #quick please");
        strip_tokens(&mut request);
        assert_eq!(request.messages[0].content.as_text(), "tell me a joke please");
        assert_eq!(request.reasoning_effort, Some(ReasoningEffort::Low));
    }

    #[test]
    fn preset_reasoning_effort_is_not_overwritten() {
        let mut request = request_with_user_text("Deep: hi");
        request.reasoning_effort = Some(ReasoningEffort::Minimal);
        strip_tokens(&mut request);
        assert_eq!(request.reasoning_effort, Some(ReasoningEffort::Minimal));
    }

    #[test]
    fn enable_thinking_sets_medium_when_unset() {
        let mut body = serde_json::json!({ "model": "m", "enable_thinking": true });
        normalize_reasoning_json(&mut body);
        assert_eq!(body["reasoning_effort"], "medium");
        assert!(body.get("enable_thinking").is_none());
    }

    #[test]
    fn reasoning_max_tokens_maps_to_effort_table() {
        let mut body = serde_json::json!({ "model": "m", "reasoning": { "max_tokens": 1500 } });
        normalize_reasoning_json(&mut body);
        assert_eq!(body["reasoning_effort"], "high");
        assert!(body.get("reasoning").is_none());
    }

    #[tokio::test]
    async fn reasoning_transformer_strips_tokens_on_request_in() {
        let request = request_with_user_text("Quick: what time is it");
        let result = Reasoning.request_in(request).await.unwrap();
        assert_eq!(result.messages[0].content.as_text(), "what time is it");
        assert_eq!(result.reasoning_effort, Some(ReasoningEffort::Low));
    }

    #[test]
    fn reasoning_stream_emits_signature_on_transition() {
        let mut state = ReasoningStreamState::default();
        assert!(state.on_delta(Some("thinking..."), 0).is_some());
        let closing = state.on_delta(None, 1).unwrap();
        assert!(closing.signature.is_some());
        assert!(state.on_delta(None, 2).is_none());
    }
}
