//! OpenAI `/v1/chat/completions` wire types and conversions to/from the
//! unified model. Since the internal chunk representation is itself
//! OpenAI-chunk-shaped (§9), the streaming egress direction here is mostly
//! direct serialization rather than a structural rewrite — unlike the
//! Anthropic bridge, which needs the state machine in
//! [`super::anthropic_stream`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{LlmError, Result},
    unified,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// Parses the raw body into a `Value` first so [`crate::reasoning::normalize_reasoning_json`]
/// can collapse whatever `thinking`/`enable_thinking`/`reasoning` shape the
/// caller sent into `reasoning_effort` before the typed deserialize runs.
pub fn parse_request(body: &[u8]) -> Result<Request> {
    let mut value: Value = serde_json::from_slice(body).map_err(|err| LlmError::BadRequest(err.to_string()))?;
    crate::reasoning::normalize_reasoning_json(&mut value);
    serde_json::from_value(value).map_err(|err| LlmError::BadRequest(err.to_string()))
}

pub fn request_to_unified(request: Request) -> Result<unified::Request> {
    let messages = request.messages.into_iter().map(message_to_unified).collect::<Result<Vec<_>>>()?;

    Ok(unified::Request {
        model: request.model,
        messages,
        tools: request.tools.map(|tools| tools.into_iter().map(tool_to_unified).collect()),
        tool_choice: request.tool_choice.and_then(|v| serde_json::from_value(v).ok()),
        stream: request.stream,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        reasoning_effort: request.reasoning_effort.and_then(|effort| serde_json::from_value(Value::String(effort)).ok()),
        verbosity: request.verbosity.and_then(|v| serde_json::from_value(Value::String(v)).ok()),
        ..Default::default()
    })
}

fn message_to_unified(message: Message) -> Result<unified::Message> {
    let role = match message.role.as_str() {
        "system" => unified::Role::System,
        "user" => unified::Role::User,
        "assistant" => unified::Role::Assistant,
        "tool" => unified::Role::Tool,
        other => return Err(LlmError::BadRequest(format!("unsupported message role: {other}"))),
    };

    if matches!(role, unified::Role::Tool)
        && (message.tool_call_id.is_none() || message.content.is_none())
    {
        return Err(LlmError::BadRequest("tool message requires tool_call_id and content".to_string()));
    }

    let content = match message.content {
        Some(MessageContent::Text(text)) => unified::ContentContainer::Text(text),
        Some(MessageContent::Parts(parts)) => unified::ContentContainer::Blocks(
            parts
                .into_iter()
                .map(|part| match part {
                    ContentPart::Text { text } => unified::Content::Text { text },
                    ContentPart::ImageUrl { image_url } => {
                        unified::Content::Image { source: unified::ImageSource::Url(image_url.url) }
                    }
                })
                .collect(),
        ),
        None => unified::ContentContainer::Text(String::new()),
    };

    Ok(unified::Message {
        role,
        content,
        tool_calls: message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|call| unified::ToolCall { id: call.id, function: unified::FunctionCall { name: call.function.name, arguments: call.function.arguments } })
                .collect()
        }),
        tool_call_id: message.tool_call_id,
        thinking: None,
        annotations: None,
    })
}

fn tool_to_unified(tool: Tool) -> unified::Tool {
    unified::Tool::Function {
        function: unified::FunctionDefinition {
            name: tool.function.name,
            description: tool.function.description,
            parameters: tool.function.parameters,
        },
    }
}

/// `responseOut`: a non-streaming unified response, shaped as a
/// `chat.completion` object. `created`/`id` are supplied by the caller
/// (ambient concerns this crate's core doesn't own).
pub fn response_from_unified(response: unified::Response, created: u64) -> Value {
    let finish_reason = match response.finish_reason {
        unified::FinishReason::EndTurn => "stop",
        unified::FinishReason::MaxTokens => "length",
        unified::FinishReason::ToolUse => "tool_calls",
        unified::FinishReason::StopSequence => "content_filter",
    };

    let tool_calls = response.message.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|call| {
                serde_json::json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.function.name, "arguments": call.function.arguments },
                })
            })
            .collect::<Vec<_>>()
    });

    serde_json::json!({
        "id": response.id,
        "object": "chat.completion",
        "created": created,
        "model": response.model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": crate::reasoning::response_content_with_thinking(&response.message),
                "tool_calls": tool_calls,
            },
            "finish_reason": finish_reason,
        }],
        "usage": {
            "prompt_tokens": response.usage.input_tokens,
            "completion_tokens": response.usage.output_tokens,
            "total_tokens": response.usage.input_tokens + response.usage.output_tokens,
        },
    })
}

/// `responseOut` for a streaming chunk: the internal representation is
/// already OpenAI-chunk-shaped, so egress only needs the envelope fields.
pub fn chunk_from_unified(chunk: &unified::Chunk<'_>, created: u64) -> Value {
    serde_json::json!({
        "id": chunk.id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": chunk.model,
        "choices": chunk.choices,
    })
}

// --- Provider-response ingestion ---------------------------------------
//
// The internal chunk type already mirrors an OpenAI SSE chunk closely enough
// that streaming ingestion is a direct `serde_json::from_slice::<unified::Chunk>`
// at the call site (C6 adapters do this themselves). Non-streaming responses
// need the richer `choices[]` envelope below.

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<ProviderChoice>,
    #[serde(default)]
    pub usage: ProviderUsage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderChoice {
    pub message: ProviderMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Deepseek/OpenRouter-style side-channel reasoning, folded into
    /// `message.thinking` on ingestion (§4.6, §4.8).
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub completion_tokens_details: Option<ProviderCompletionTokensDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: Option<u32>,
}

pub fn parse_response(body: &[u8]) -> Result<ProviderResponse> {
    serde_json::from_slice(body).map_err(|err| LlmError::Internal(format!("malformed provider response: {err}")))
}

/// Folds a provider's `chat.completion` envelope into the unified shape.
/// `choices[0]` is the only choice this gateway ever asks providers for.
pub fn response_to_unified(response: ProviderResponse) -> unified::Response {
    let choice = response
        .choices
        .into_iter()
        .next()
        .unwrap_or(ProviderChoice { message: ProviderMessage::default(), finish_reason: None });

    let finish_reason = choice
        .finish_reason
        .as_deref()
        .map(unified::FinishReason::from_openai_str)
        .unwrap_or(unified::FinishReason::EndTurn);

    let reasoning_tokens = response.usage.completion_tokens_details.and_then(|d| d.reasoning_tokens);

    unified::Response {
        id: response.id,
        model: response.model,
        message: unified::Message {
            role: unified::Role::Assistant,
            content: unified::ContentContainer::Text(choice.message.content.unwrap_or_default()),
            tool_calls: choice.message.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|call| unified::ToolCall { id: call.id, function: unified::FunctionCall { name: call.function.name, arguments: call.function.arguments } })
                    .collect()
            }),
            tool_call_id: None,
            thinking: choice.message.reasoning_content,
            annotations: None,
        },
        finish_reason,
        usage: unified::Usage {
            input_tokens: response.usage.prompt_tokens,
            output_tokens: response.usage.completion_tokens,
            cached_read_tokens: None,
            reasoning_tokens,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_without_call_id_is_rejected() {
        let message = Message { role: "tool".to_string(), content: Some(MessageContent::Text("42".to_string())), tool_calls: None, tool_call_id: None };
        assert!(message_to_unified(message).is_err());
    }

    #[test]
    fn text_message_round_trips() {
        let message = Message { role: "user".to_string(), content: Some(MessageContent::Text("hi".to_string())), tool_calls: None, tool_call_id: None };
        let unified = message_to_unified(message).unwrap();
        assert_eq!(unified.content.as_text(), "hi");
        assert_eq!(unified.role, unified::Role::User);
    }

    #[test]
    fn provider_response_carries_reasoning_content_into_thinking() {
        let body = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "deepseek-reasoner",
            "choices": [{
                "message": { "content": "the answer", "reasoning_content": "step by step" },
                "finish_reason": "stop",
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 },
        });
        let response = response_to_unified(parse_response(body.to_string().as_bytes()).unwrap());
        assert_eq!(response.message.thinking.as_deref(), Some("step by step"));
        assert_eq!(response.message.content.as_text(), "the answer");
        assert_eq!(response.finish_reason, unified::FinishReason::EndTurn);
    }

    #[test]
    fn response_maps_tool_calls_finish_reason() {
        let response = unified::Response {
            id: "resp_1".to_string(),
            model: "gpt-5".to_string(),
            message: unified::Message {
                role: unified::Role::Assistant,
                content: unified::ContentContainer::Text(String::new()),
                tool_calls: Some(vec![unified::ToolCall { id: "c1".to_string(), function: unified::FunctionCall { name: "f".to_string(), arguments: "{}".to_string() } }]),
                tool_call_id: None,
                thinking: None,
                annotations: None,
            },
            finish_reason: unified::FinishReason::ToolUse,
            usage: unified::Usage::default(),
        };
        let body = response_from_unified(response, 0);
        assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
    }

    #[test]
    fn parse_request_normalizes_enable_thinking_before_typed_parse() {
        let body = serde_json::json!({
            "model": "m",
            "messages": [{ "role": "user", "content": "hi" }],
            "enable_thinking": true,
        });
        let request = parse_request(body.to_string().as_bytes()).unwrap();
        assert_eq!(request.reasoning_effort.as_deref(), Some("medium"));
    }

    #[test]
    fn response_with_thinking_renders_two_part_content() {
        let response = unified::Response {
            id: "resp_1".to_string(),
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
        let body = response_from_unified(response, 0);
        assert_eq!(body["choices"][0]["message"]["content"][0]["type"], "thinking");
        assert_eq!(body["choices"][0]["message"]["content"][1]["text"], "the answer");
    }
}
