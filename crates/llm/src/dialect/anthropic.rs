//! Anthropic `/v1/messages` wire types and the non-streaming conversions
//! to/from the unified model (spec.md §4.5.1, §4.5.3). The streaming
//! direction lives in [`super::anthropic_stream`].
//!
//! Grounded on the sibling gateway crate's `messages/anthropic.rs` (wire
//! shapes) and `messages/unified/{to,from}_anthropic.rs` (conversion logic),
//! re-scoped to the field set this crate actually threads through C1.

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
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Thinking>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<TextBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Content>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<ToolResultContent>,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<TextBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Any,
    None,
    Tool { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thinking {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Role,
    pub model: String,
    pub content: Vec<Content>,
    pub stop_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// §4.1 stop-reason table, in the Anthropic-facing direction.
pub fn finish_reason_to_stop_reason(reason: unified::FinishReason) -> &'static str {
    match reason {
        unified::FinishReason::EndTurn => "end_turn",
        unified::FinishReason::MaxTokens => "max_tokens",
        unified::FinishReason::ToolUse => "tool_use",
        unified::FinishReason::StopSequence => "stop_sequence",
    }
}

// --- requestOut: Anthropic ingress → unified (§4.5.1) -------------------

pub fn request_to_unified(request: Request) -> Result<unified::Request> {
    let mut messages = Vec::new();

    if let Some(system) = request.system {
        let content = match system {
            SystemPrompt::Text(text) => unified::ContentContainer::Text(text),
            SystemPrompt::Blocks(blocks) => unified::ContentContainer::Blocks(
                blocks.into_iter().map(|block| unified::Content::Text { text: block.text }).collect(),
            ),
        };
        messages.push(unified::Message {
            role: unified::Role::System,
            content,
            tool_calls: None,
            tool_call_id: None,
            thinking: None,
            annotations: None,
        });
    }

    for message in request.messages {
        convert_message(message, &mut messages)?;
    }

    let reasoning_effort = request.thinking.as_ref().filter(|thinking| thinking.kind == "enabled").map(thinking_to_effort);

    Ok(unified::Request {
        model: request.model,
        messages,
        tools: request.tools.map(|tools| tools.into_iter().map(tool_to_unified).collect()),
        tool_choice: request.tool_choice.map(tool_choice_to_unified),
        stream: request.stream,
        temperature: request.temperature,
        max_tokens: Some(request.max_tokens),
        top_p: request.top_p,
        stop_sequences: request.stop_sequences,
        reasoning_effort,
        ..Default::default()
    })
}

fn convert_message(message: Message, out: &mut Vec<unified::Message>) -> Result<()> {
    match message.role {
        Role::User => convert_user_message(message.content, out),
        Role::Assistant => convert_assistant_message(message.content, out),
    }
}

fn convert_user_message(content: MessageContent, out: &mut Vec<unified::Message>) {
    let blocks = match content {
        MessageContent::Text(text) => {
            out.push(unified::Message {
                role: unified::Role::User,
                content: unified::ContentContainer::Text(text),
                tool_calls: None,
                tool_call_id: None,
                thinking: None,
                annotations: None,
            });
            return;
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut residual = Vec::new();

    for block in blocks {
        match block {
            Content::ToolResult { tool_use_id, content } => {
                let text = match content {
                    Some(ToolResultContent::Text(text)) => text,
                    Some(ToolResultContent::Blocks(blocks)) => {
                        blocks.into_iter().map(|b| b.text).collect::<Vec<_>>().join("\n")
                    }
                    None => String::new(),
                };
                out.push(unified::Message {
                    role: unified::Role::Tool,
                    content: unified::ContentContainer::Text(text),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id),
                    thinking: None,
                    annotations: None,
                });
            }
            Content::Text { text } => residual.push(unified::Content::Text { text }),
            Content::Image { source } => residual.push(unified::Content::Image { source: image_source_to_unified(source) }),
            other => residual.push(other_to_unified(other)),
        }
    }

    if !residual.is_empty() {
        out.push(unified::Message {
            role: unified::Role::User,
            content: unified::ContentContainer::Blocks(residual),
            tool_calls: None,
            tool_call_id: None,
            thinking: None,
            annotations: None,
        });
    }
}

fn convert_assistant_message(content: MessageContent, out: &mut Vec<unified::Message>) {
    let blocks = match content {
        MessageContent::Text(text) => {
            out.push(unified::Message {
                role: unified::Role::Assistant,
                content: unified::ContentContainer::Text(text),
                tool_calls: None,
                tool_call_id: None,
                thinking: None,
                annotations: None,
            });
            return;
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut thinking = None;

    for block in blocks {
        match block {
            Content::Text { text } => text_parts.push(text),
            Content::ToolUse { id, name, input } => {
                tool_calls.push(unified::ToolCall {
                    id,
                    function: unified::FunctionCall { name, arguments: input.to_string() },
                });
            }
            Content::Thinking { thinking: text, .. } => thinking = Some(text),
            _ => {}
        }
    }

    out.push(unified::Message {
        role: unified::Role::Assistant,
        content: unified::ContentContainer::Text(text_parts.join("\n")),
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
        thinking,
        annotations: None,
    });
}

fn other_to_unified(content: Content) -> unified::Content {
    match content {
        Content::ToolUse { id, name, input } => unified::Content::ToolUse { id, name, input },
        Content::Thinking { thinking, signature } => unified::Content::Thinking { text: thinking, signature },
        other => unreachable!("residual user content block has no other variant: {other:?}"),
    }
}

fn image_source_to_unified(source: ImageSource) -> unified::ImageSource {
    match source {
        ImageSource::Base64 { media_type, data } => unified::ImageSource::Base64 { media_type, data },
        ImageSource::Url { url } => unified::ImageSource::Url(url),
    }
}

/// `thinking.budget_tokens` → `reasoning_effort` (§4.5.1): >1000→high,
/// >500→medium, else minimal. Only called once the caller has already
/// checked `thinking.kind == "enabled"`.
fn thinking_to_effort(thinking: &Thinking) -> unified::ReasoningEffort {
    match thinking.budget_tokens {
        Some(budget) if budget > 1000 => unified::ReasoningEffort::High,
        Some(budget) if budget > 500 => unified::ReasoningEffort::Medium,
        _ => unified::ReasoningEffort::Minimal,
    }
}

fn tool_to_unified(tool: Tool) -> unified::Tool {
    unified::Tool::Function {
        function: unified::FunctionDefinition { name: tool.name, description: tool.description, parameters: tool.input_schema },
    }
}

fn tool_choice_to_unified(choice: ToolChoice) -> unified::ToolChoice {
    match choice {
        ToolChoice::Tool { name } => unified::ToolChoice::Specific { function: unified::ToolChoiceFunction { name } },
        ToolChoice::Auto => unified::ToolChoice::Mode(unified::ToolChoiceMode::Auto),
        ToolChoice::Any => unified::ToolChoice::Mode(unified::ToolChoiceMode::Required),
        ToolChoice::None => unified::ToolChoice::Mode(unified::ToolChoiceMode::None),
    }
}

// --- responseOut: unified → Anthropic JSON (§4.5.3) ---------------------

pub fn response_from_unified(response: unified::Response) -> Result<Response> {
    let mut content = Vec::new();

    if let Some(annotations) = &response.message.annotations {
        for _ in annotations {
            content.push(Content::ToolUse {
                id: format!("srvtoolu_{}", uuid::Uuid::new_v4()),
                name: "web_search".to_string(),
                input: Value::Object(Default::default()),
            });
        }
    }

    let text = response.message.content.as_text();
    if !text.is_empty() {
        content.push(Content::Text { text });
    }

    if let Some(tool_calls) = &response.message.tool_calls {
        for call in tool_calls {
            let input = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({ "text": call.function.arguments }));
            content.push(Content::ToolUse { id: call.id.clone(), name: call.function.name.clone(), input });
        }
    }

    if let Some(thinking) = response.message.thinking {
        content.push(Content::Thinking { thinking, signature: None });
    }

    Ok(Response {
        id: response.id,
        kind: "message".to_string(),
        role: Role::Assistant,
        model: response.model,
        content,
        stop_reason: finish_reason_to_stop_reason(response.finish_reason).to_string(),
        stop_sequence: None,
        usage: Usage { input_tokens: response.usage.input_tokens, output_tokens: response.usage.output_tokens },
    })
}

pub fn parse_request(body: &[u8]) -> Result<Request> {
    serde_json::from_slice(body).map_err(|err| LlmError::BadRequest(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_and_user_text_become_messages() {
        let request = Request {
            model: "claude-opus".to_string(),
            messages: vec![Message { role: Role::User, content: MessageContent::Text("hi".to_string()) }],
            max_tokens: 100,
            system: Some(SystemPrompt::Text("be nice".to_string())),
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: false,
            tools: None,
            tool_choice: None,
            thinking: None,
        };

        let unified = request_to_unified(request).unwrap();
        assert_eq!(unified.messages.len(), 2);
        assert_eq!(unified.messages[0].role, unified::Role::System);
        assert_eq!(unified.messages[1].content.as_text(), "hi");
    }

    #[test]
    fn tool_result_becomes_its_own_tool_message() {
        let request = Request {
            model: "claude-opus".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![
                    Content::ToolResult { tool_use_id: "abc".to_string(), content: Some(ToolResultContent::Text("42".to_string())) },
                    Content::Text { text: "thanks".to_string() },
                ]),
            }],
            max_tokens: 100,
            system: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: false,
            tools: None,
            tool_choice: None,
            thinking: None,
        };

        let unified = request_to_unified(request).unwrap();
        assert_eq!(unified.messages.len(), 2);
        assert_eq!(unified.messages[0].role, unified::Role::Tool);
        assert_eq!(unified.messages[0].tool_call_id.as_deref(), Some("abc"));
        assert_eq!(unified.messages[1].role, unified::Role::User);
    }

    #[test]
    fn thinking_budget_maps_to_effort() {
        let high = Thinking { kind: "enabled".to_string(), budget_tokens: Some(2000) };
        let medium = Thinking { kind: "enabled".to_string(), budget_tokens: Some(600) };
        let minimal = Thinking { kind: "enabled".to_string(), budget_tokens: Some(10) };
        assert_eq!(thinking_to_effort(&high), unified::ReasoningEffort::High);
        assert_eq!(thinking_to_effort(&medium), unified::ReasoningEffort::Medium);
        assert_eq!(thinking_to_effort(&minimal), unified::ReasoningEffort::Minimal);
    }

    #[test]
    fn disabled_thinking_leaves_reasoning_effort_unset() {
        let request = Request {
            model: "claude-opus".to_string(),
            messages: vec![Message { role: Role::User, content: MessageContent::Text("hi".to_string()) }],
            max_tokens: 100,
            system: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: false,
            tools: None,
            tool_choice: None,
            thinking: Some(Thinking { kind: "disabled".to_string(), budget_tokens: Some(2000) }),
        };

        let unified = request_to_unified(request).unwrap();
        assert_eq!(unified.reasoning_effort, None);
    }

    #[test]
    fn response_maps_tool_calls_and_stop_reason() {
        let response = unified::Response {
            id: "msg_1".to_string(),
            model: "claude-opus".to_string(),
            message: unified::Message {
                role: unified::Role::Assistant,
                content: unified::ContentContainer::Text("hello".to_string()),
                tool_calls: Some(vec![unified::ToolCall {
                    id: "call_1".to_string(),
                    function: unified::FunctionCall { name: "get_weather".to_string(), arguments: "{\"c\":\"sf\"}".to_string() },
                }]),
                tool_call_id: None,
                thinking: None,
                annotations: None,
            },
            finish_reason: unified::FinishReason::ToolUse,
            usage: unified::Usage { input_tokens: 3, output_tokens: 1, cached_read_tokens: None, reasoning_tokens: None },
        };

        let anthropic = response_from_unified(response).unwrap();
        assert_eq!(anthropic.stop_reason, "tool_use");
        assert_eq!(anthropic.content.len(), 2);
    }
}
