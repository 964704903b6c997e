//! OpenAI Responses-API ↔ Chat-Completions conversion (spec.md §4.5.4).
//!
//! Some upstreams (the GPT-5 family foremost among them) only expose the
//! Responses API, while the rest of this crate's pipeline speaks in
//! chat-completions-shaped JSON throughout. These functions sit at the
//! provider-adapter seam (C6) and operate directly on `serde_json::Value`
//! rather than the unified model, because the Responses API's `output[]`
//! shape has no chat-completions equivalent to route through.

use serde_json::{Value, json};

use crate::error::{LlmError, Result};

/// Chat-completions-shaped request body → Responses-API request body.
pub fn request_to_responses(mut body: Value) -> Result<Value> {
    let Some(object) = body.as_object_mut() else {
        return Err(LlmError::BadRequest("request body must be a JSON object".to_string()));
    };

    object.remove("temperature");
    object.remove("max_tokens");

    let messages = object.remove("messages").and_then(|v| v.as_array().cloned()).unwrap_or_default();
    let mut instructions = None;
    let mut input = Vec::new();

    for (i, message) in messages.into_iter().enumerate() {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user").to_string();

        if i == 0 && role == "system" {
            instructions = message.get("content").and_then(Value::as_str).map(str::to_string);
            continue;
        }

        if role == "tool" {
            input.push(json!({
                "type": "function_call_output",
                "call_id": message.get("tool_call_id"),
                "output": message.get("content"),
            }));
            continue;
        }

        if role == "assistant"
            && let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array)
        {
            for call in tool_calls {
                input.push(json!({
                    "type": "function_call",
                    "call_id": call["id"],
                    "name": call["function"]["name"],
                    "arguments": call["function"]["arguments"],
                }));
            }
            continue;
        }

        input.push(json!({ "role": role, "content": content_to_responses(message.get("content"), &role) }));
    }

    object.insert("input".to_string(), Value::Array(input));
    if let Some(instructions) = instructions {
        object.insert("instructions".to_string(), Value::String(instructions));
    }

    if let Some(tools) = object.get_mut("tools") {
        *tools = flatten_tools(tools);
    }

    Ok(Value::Object(object.clone()))
}

fn content_to_responses(content: Option<&Value>, role: &str) -> Value {
    let text_kind = if role == "assistant" { "output_text" } else { "input_text" };

    match content {
        Some(Value::String(text)) => json!([{ "type": text_kind, "text": text }]),
        Some(Value::Array(parts)) => Value::Array(
            parts
                .iter()
                .map(|part| match part.get("type").and_then(Value::as_str) {
                    Some("text") => json!({ "type": text_kind, "text": part.get("text") }),
                    Some("image_url") => json!({ "type": "input_image", "image_url": part["image_url"]["url"] }),
                    _ => part.clone(),
                })
                .collect(),
        ),
        _ => Value::Array(Vec::new()),
    }
}

fn flatten_tools(tools: &Value) -> Value {
    let Some(tools) = tools.as_array() else { return tools.clone() };

    let mut flattened: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let function = tool.get("function").unwrap_or(tool);
            json!({
                "type": "function",
                "name": function.get("name"),
                "description": function.get("description"),
                "parameters": function.get("parameters"),
            })
        })
        .collect();

    let has_web_search = flattened.iter().any(|tool| tool.get("name").and_then(Value::as_str) == Some("web_search"));
    if has_web_search {
        flattened.push(json!({ "type": "web_search_preview" }));
    }

    Value::Array(flattened)
}

/// Responses-API non-streaming response body → chat-completion body.
pub fn response_to_chat(body: Value) -> Result<Value> {
    let output = body.get("output").and_then(Value::as_array).cloned().unwrap_or_default();

    let mut text_parts = Vec::new();
    let mut image_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for item in &output {
        match item.get("type").and_then(Value::as_str) {
            Some("output_text") => {
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    text_parts.push(text.to_string());
                }
            }
            Some("output_image") => {
                image_parts.push(json!({ "type": "image_url", "image_url": { "url": item.get("image_url") } }));
            }
            Some("function_call") => {
                tool_calls.push(json!({
                    "id": item.get("call_id"),
                    "type": "function",
                    "function": { "name": item.get("name"), "arguments": item.get("arguments") },
                }));
            }
            _ => {}
        }
    }

    let content = if image_parts.is_empty() {
        Value::String(text_parts.join(""))
    } else {
        let mut parts = image_parts;
        if !text_parts.is_empty() {
            parts.insert(0, json!({ "type": "text", "text": text_parts.join("") }));
        }
        Value::Array(parts)
    };

    let finish_reason = if tool_calls.is_empty() { "stop" } else { "tool_calls" };
    let tool_calls = if tool_calls.is_empty() { Value::Null } else { Value::Array(tool_calls) };

    let usage = body.get("usage");
    let prompt_tokens = usage.and_then(|u| u.get("input_tokens")).cloned().unwrap_or(json!(0));
    let completion_tokens = usage.and_then(|u| u.get("output_tokens")).cloned().unwrap_or(json!(0));

    Ok(json!({
        "id": body.get("id"),
        "object": "chat.completion",
        "model": body.get("model"),
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content, "tool_calls": tool_calls },
            "finish_reason": finish_reason,
        }],
        "usage": { "prompt_tokens": prompt_tokens, "completion_tokens": completion_tokens },
    }))
}

/// Per-stream state for the Responses-API streaming bridge. Lives in the
/// response closure, never on the adapter (§5, §9).
#[derive(Default)]
pub struct ResponsesStreamState {
    saw_tool_calls: bool,
}

/// Converts one named Responses-API SSE event into a chat-completion-chunk
/// JSON value, or `None` for event types with no chat-completions
/// equivalent (forwarded unchanged by the caller).
pub fn event_to_chunk(event_type: &str, data: &Value, state: &mut ResponsesStreamState) -> Option<Value> {
    match event_type {
        "response.output_text.delta" => {
            let delta = data.get("delta").cloned().unwrap_or(Value::Null);
            Some(json!({ "choices": [{ "index": 0, "delta": { "content": delta } }] }))
        }
        "response.output_image.delta" => {
            let delta = data.get("delta").cloned().unwrap_or(Value::Null);
            Some(json!({
                "choices": [{ "index": 0, "delta": { "content": [{ "type": "image_url", "image_url": { "url": delta } }] } }],
            }))
        }
        "response.output_item.added" if data.get("item").and_then(|i| i.get("type")).and_then(Value::as_str) == Some("function_call") => {
            state.saw_tool_calls = true;
            let item = &data["item"];
            Some(json!({
                "choices": [{ "index": 0, "delta": { "tool_calls": [{
                    "index": 0,
                    "id": item.get("call_id"),
                    "type": "function",
                    "function": { "name": item.get("name"), "arguments": "" },
                }] } }],
            }))
        }
        "response.function_call_arguments.delta" => {
            state.saw_tool_calls = true;
            let delta = data.get("delta").cloned().unwrap_or(Value::Null);
            Some(json!({
                "choices": [{ "index": 0, "delta": { "tool_calls": [{
                    "index": 0,
                    "function": { "arguments": delta },
                }] } }],
            }))
        }
        "response.completed" => {
            let finish_reason = if state.saw_tool_calls { "tool_calls" } else { "stop" };
            Some(json!({ "choices": [{ "index": 0, "delta": {}, "finish_reason": finish_reason }] }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_becomes_instructions() {
        let body = json!({
            "model": "gpt-5",
            "messages": [
                { "role": "system", "content": "be terse" },
                { "role": "user", "content": "hi" },
            ],
        });
        let responses = request_to_responses(body).unwrap();
        assert_eq!(responses["instructions"], "be terse");
        assert_eq!(responses["input"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn temperature_and_max_tokens_are_dropped() {
        let body = json!({ "model": "gpt-5", "messages": [], "temperature": 0.5, "max_tokens": 10 });
        let responses = request_to_responses(body).unwrap();
        assert!(responses.get("temperature").is_none());
        assert!(responses.get("max_tokens").is_none());
    }

    #[test]
    fn function_call_output_becomes_chat_response() {
        let body = json!({
            "id": "resp_1",
            "model": "gpt-5",
            "output": [{ "type": "function_call", "call_id": "c1", "name": "f", "arguments": "{}" }],
        });
        let chat = response_to_chat(body).unwrap();
        assert_eq!(chat["choices"][0]["finish_reason"], "tool_calls");
    }

    #[test]
    fn completed_event_reflects_tool_calls_seen() {
        let mut state = ResponsesStreamState::default();
        event_to_chunk("response.output_item.added", &json!({ "item": { "type": "function_call", "call_id": "c1", "name": "f" } }), &mut state);
        let chunk = event_to_chunk("response.completed", &json!({}), &mut state).unwrap();
        assert_eq!(chunk["choices"][0]["finish_reason"], "tool_calls");
    }
}
