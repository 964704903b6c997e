//! GPT-5-family quirks (spec.md §4.6): a rename, a temperature restriction
//! the model enforces server-side, reasoning/verbosity field shuffling, and
//! tool-schema cleanup. Grounded on the sibling gateway crate's
//! `provider/openai.rs` adapter shape, with the body-reshaping pulled out
//! into free functions so they're testable without a `Transformer`.

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::Result, transformer::Transformer, unified};

/// Rewrites a GPT-5-bound OpenAI-dialect request body in place.
pub fn reshape_request(body: &mut Value) {
    let Some(object) = body.as_object_mut() else { return };

    if let Some(max_tokens) = object.remove("max_tokens") {
        object.insert("max_completion_tokens".to_string(), max_tokens);
    }

    if object.get("temperature").and_then(Value::as_f64).is_some_and(|t| t != 1.0) {
        object.remove("temperature");
    }

    if let Some(reasoning) = object.remove("reasoning")
        && !object.contains_key("reasoning_effort")
    {
        let effort = reasoning.get("effort").and_then(Value::as_str).unwrap_or("medium");
        object.insert("reasoning_effort".to_string(), Value::String(effort.to_string()));
    }

    if let Some(tools) = object.get_mut("tools").and_then(Value::as_array_mut) {
        for tool in tools {
            reshape_tool(tool);
        }
    }

    let verbosity_valid = object.get("verbosity").and_then(Value::as_str).is_some_and(|v| matches!(v, "low" | "medium" | "high"));
    if object.contains_key("verbosity") && !verbosity_valid {
        object.remove("verbosity");
    }
}

fn reshape_tool(tool: &mut Value) {
    let Some(object) = tool.as_object_mut() else { return };

    if object.get("type").and_then(Value::as_str) == Some("custom") {
        return;
    }

    if let Some(input_schema) = object.remove("input_schema") {
        let name = object.get("name").cloned().unwrap_or(Value::Null);
        let description = object.get("description").cloned();
        *object = serde_json::Map::new();
        object.insert("type".to_string(), Value::String("function".to_string()));
        let mut function = serde_json::Map::new();
        function.insert("name".to_string(), name);
        if let Some(description) = description {
            function.insert("description".to_string(), description);
        }
        function.insert("parameters".to_string(), input_schema);
        object.insert("function".to_string(), Value::Object(function));
        return;
    }

    if let Some(parameters) = object.get_mut("function").and_then(|f| f.get_mut("parameters")) {
        if let Some(schema) = parameters.as_object_mut() {
            schema.remove("$schema");
            schema.remove("additionalProperties");
        }
    }
}

/// `responseIn` (§4.6): surfaces side-channel reasoning as a visible
/// `<reasoning>…</reasoning>` prefix, keeping the raw text in
/// `message.thinking` so a later turn can still round-trip it.
pub fn prepend_reasoning(response: &mut unified::Response) {
    let Some(reasoning) = response.message.thinking.clone() else { return };
    let text = response.message.content.as_text();
    response.message.content = unified::ContentContainer::Text(format!("<reasoning>{reasoning}</reasoning>{text}"));
}

pub struct OpenAiGpt5;

#[async_trait]
impl Transformer for OpenAiGpt5 {
    fn name(&self) -> &'static str {
        "openai_gpt5"
    }

    async fn request_out(&self, mut body: Value) -> Result<Value> {
        reshape_request(&mut body);
        Ok(body)
    }

    async fn response_out(&self, mut response: unified::Response) -> Result<unified::Response> {
        prepend_reasoning(&mut response);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_tokens_renames_to_max_completion_tokens() {
        let mut body = serde_json::json!({ "model": "gpt-5", "max_tokens": 100 });
        reshape_request(&mut body);
        assert_eq!(body["max_completion_tokens"], 100);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn non_default_temperature_is_dropped() {
        let mut body = serde_json::json!({ "model": "gpt-5", "temperature": 0.2 });
        reshape_request(&mut body);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn default_temperature_is_kept() {
        let mut body = serde_json::json!({ "model": "gpt-5", "temperature": 1.0 });
        reshape_request(&mut body);
        assert_eq!(body["temperature"], 1.0);
    }

    #[test]
    fn reasoning_object_lifts_effort_and_defaults_to_medium() {
        let mut body = serde_json::json!({ "model": "gpt-5", "reasoning": {} });
        reshape_request(&mut body);
        assert_eq!(body["reasoning_effort"], "medium");
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn anthropic_shaped_tool_is_converted_to_function() {
        let mut body = serde_json::json!({
            "model": "gpt-5",
            "tools": [{ "name": "get_weather", "description": "d", "input_schema": { "type": "object" } }],
        });
        reshape_request(&mut body);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
    }

    #[test]
    fn custom_tool_passes_through_untouched() {
        let mut body = serde_json::json!({ "model": "gpt-5", "tools": [{ "type": "custom", "name": "raw" }] });
        let before = body.clone();
        reshape_request(&mut body);
        assert_eq!(body, before);
    }

    #[test]
    fn invalid_verbosity_is_dropped() {
        let mut body = serde_json::json!({ "model": "gpt-5", "verbosity": "loud" });
        reshape_request(&mut body);
        assert!(body.get("verbosity").is_none());
    }

    #[test]
    fn reasoning_content_is_prepended_to_visible_text() {
        let mut response = unified::Response {
            id: "1".to_string(),
            model: "gpt-5".to_string(),
            message: unified::Message {
                role: unified::Role::Assistant,
                content: unified::ContentContainer::Text("the answer".to_string()),
                tool_calls: None,
                tool_call_id: None,
                thinking: Some("step by step".to_string()),
                annotations: None,
            },
            finish_reason: unified::FinishReason::EndTurn,
            usage: unified::Usage::default(),
        };
        prepend_reasoning(&mut response);
        assert_eq!(response.message.content.as_text(), "<reasoning>step by step</reasoning>the answer");
    }
}
