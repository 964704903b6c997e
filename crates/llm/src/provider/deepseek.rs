//! Deepseek `reasoner` round-tripping (spec.md §4.6): the model expects
//! every assistant message to carry `reasoning_content` (even empty) on the
//! way in, and the gateway must keep exposing it on the way out so a
//! multi-turn conversation can feed it back in on the next request.

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::Result, transformer::Transformer, unified};

pub const REASONER_MODEL: &str = "deepseek-reasoner";

pub fn ensure_reasoning_content_on_request(body: &mut Value) {
    let Some(object) = body.as_object_mut() else { return };
    if object.get("model").and_then(Value::as_str) != Some(REASONER_MODEL) {
        return;
    }

    let Some(messages) = object.get_mut("messages").and_then(Value::as_array_mut) else { return };
    for message in messages {
        let Some(message) = message.as_object_mut() else { continue };
        if message.get("role").and_then(Value::as_str) == Some("assistant") && !message.contains_key("reasoning_content") {
            message.insert("reasoning_content".to_string(), Value::String(String::new()));
        }
    }
}

/// `responseOut`: guarantees the egress message always exposes
/// `reasoning_content`, defaulting to empty rather than omitting the field.
pub fn ensure_reasoning_content_on_response(response: &mut unified::Response) {
    if response.message.thinking.is_none() {
        response.message.thinking = Some(String::new());
    }
}

pub struct Deepseek;

#[async_trait]
impl Transformer for Deepseek {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    async fn request_out(&self, mut body: Value) -> Result<Value> {
        ensure_reasoning_content_on_request(&mut body);
        Ok(body)
    }

    async fn response_out(&self, mut response: unified::Response) -> Result<unified::Response> {
        ensure_reasoning_content_on_response(&mut response);
        Ok(response)
    }
}
