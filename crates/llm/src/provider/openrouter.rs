//! OpenRouter quirks (spec.md §4.6). `HTTP-Referer`/`X-Title` are plain
//! outbound headers and belong in the provider's configured `headers: []`
//! `Insert` rules (`config::HeaderRule`), not here — this module only owns
//! the body- and stream-level reshaping nothing in config can express.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{error::Result, transformer::Transformer, unified};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenRouterOptions {
    /// `provider.order`, if the deployment pins a routing preference.
    pub provider_order: Option<Vec<String>>,
}

pub fn reshape_request(body: &mut Value, options: &OpenRouterOptions) {
    let Some(object) = body.as_object_mut() else { return };

    if let Some(order) = &options.provider_order {
        let mut provider = serde_json::Map::new();
        provider.insert("order".to_string(), serde_json::json!(order));
        object.insert("provider".to_string(), Value::Object(provider));
    }

    if let Some(messages) = object.get_mut("messages").and_then(Value::as_array_mut) {
        for message in messages {
            strip_cache_control_and_rewrite_images(message);
        }
    }
}

fn strip_cache_control_and_rewrite_images(message: &mut Value) {
    let Some(parts) = message.get_mut("content").and_then(Value::as_array_mut) else { return };

    for part in parts {
        let Some(object) = part.as_object_mut() else { continue };
        object.remove("cache_control");

        let media_type = object.get("media_type").and_then(Value::as_str).map(str::to_string);
        if let Some(media_type) = media_type
            && let Some(image_url) = object.get_mut("image_url")
            && let Some(url) = image_url.get("url").and_then(Value::as_str)
            && !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("data:")
        {
            *image_url = serde_json::json!({ "url": format!("data:{media_type};base64,{url}") });
        }
    }
}

/// Per-stream state for the reshaping that genuinely needs cross-chunk
/// memory (finish_reason relabeling, index bumping once a tool call starts
/// after content) — `Transformer::response_in` only sees one chunk at a
/// time, so callers drive this directly rather than through the chain.
#[derive(Default)]
pub struct OpenRouterStream {
    saw_tool_call: bool,
    saw_content: bool,
}

impl OpenRouterStream {
    /// Reshapes one chunk in place: `reasoning_content` deltas become
    /// `thinking` deltas, numeric-string tool-call ids are remapped, and
    /// `finish_reason` is relabeled to `tool_calls` once any have been seen.
    pub fn on_chunk(&mut self, chunk: &mut unified::Chunk<'_>) {
        for choice in &mut chunk.choices {
            if let Some(reasoning) = choice.delta.reasoning_content.take() {
                choice.delta.thinking = Some(unified::ThinkingDelta { content: Some(reasoning), signature: None });
            } else if self.saw_tool_call_transition(&choice.delta) && choice.delta.thinking.is_none() {
                choice.delta.thinking = Some(unified::ThinkingDelta { content: None, signature: Some("openrouter-reasoning-end".to_string()) });
            }

            if choice.delta.content.is_some() {
                self.saw_content = true;
            }

            if let Some(calls) = &mut choice.delta.tool_calls {
                self.saw_tool_call = true;
                for call in calls {
                    if let Some(id) = &call.id
                        && id.chars().all(|c| c.is_ascii_digit())
                    {
                        call.id = Some(format!("call_{}", uuid::Uuid::new_v4()));
                    }
                    if self.saw_content {
                        call.index += 1;
                    }
                }
            }

            if self.saw_tool_call && choice.finish_reason.is_some() {
                choice.finish_reason = Some("tool_calls".to_string());
            }
        }
    }

    fn saw_tool_call_transition(&self, delta: &unified::ChunkDelta) -> bool {
        delta.tool_calls.is_some() && delta.content.is_none()
    }
}

pub struct OpenRouter {
    options: OpenRouterOptions,
}

impl OpenRouter {
    pub fn new(options: OpenRouterOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Transformer for OpenRouter {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn request_out(&self, mut body: Value) -> Result<Value> {
        reshape_request(&mut body, &self.options);
        Ok(body)
    }
}
