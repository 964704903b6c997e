//! The dialect-neutral value types every transformer and dialect bridge
//! speaks (spec.md §3, C1). Pure data plus the couple of well-defined
//! conversion helpers spec.md §4.1 calls out (image `data:` URLs, stop-reason
//! mapping) — no behaviour beyond that lives here.
//!
//! Grounded on the sibling gateway crate's `messages/unified.rs`, trimmed to
//! the fields this spec actually threads through the pipeline and with doc
//! comments kept sparse rather than one-per-field.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentContainer {
    Text(String),
    Blocks(Vec<Content>),
}

impl ContentContainer {
    /// Flattens to a single text string, joining block text with newlines.
    /// Non-text blocks are dropped — callers that need them should match on
    /// `Blocks` directly.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    Content::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
    Image { source: ImageSource },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: ToolResultContent },
    Thinking { text: String, signature: Option<String> },
    WebSearchResult { url: String, title: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    Url(String),
    Base64 { media_type: String, data: String },
}

impl ImageSource {
    /// `base64` + media type → `data:` URL, per spec.md §4.1.
    pub fn into_data_url(self) -> String {
        match self {
            Self::Url(url) => url,
            Self::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments are carried as a JSON-encoded string on the wire (OpenAI
    /// dialect) even though they originate as structured `input` on the
    /// Anthropic side; conversions stringify at the boundary.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: ContentContainer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// `thinking` text surfaced on an assistant message (non-streaming
    /// reasoning, MiniMax `<thinking>`, …). Not part of `content` so dialect
    /// bridges can place it wherever their wire format expects it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Provider-specific annotations (e.g. OpenAI `annotations[]`), preserved
    /// untouched unless a stage explicitly owns them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    Function { function: FunctionDefinition },
    /// Opaque plaintext schema, passed through untouched by every adapter.
    Custom { name: String, description: Option<String>, format: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    None,
    Auto,
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Specific { function: ToolChoiceFunction },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Request {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// Exactly one reasoning representation survives normalisation (I5); C8
    /// is responsible for collapsing `thinking`/`reasoning` into this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    StopSequence,
}

impl FinishReason {
    /// stop→end_turn, length→max_tokens, tool_calls→tool_use,
    /// content_filter→stop_sequence, anything else→end_turn (spec.md §4.1).
    pub fn from_openai_str(reason: &str) -> Self {
        match reason {
            "length" => Self::MaxTokens,
            "tool_calls" => Self::ToolUse,
            "content_filter" => Self::StopSequence,
            _ => Self::EndTurn,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_read_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub message: Message,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

// --- Streaming ---------------------------------------------------------
//
// The internal streaming representation is OpenAI-chunk-shaped (one `delta`
// per choice, as spec.md §4.5.2 assumes for its state machine's input): this
// is what provider adapters (C6) and tool-calling/reasoning stages (C7/C8)
// produce and consume. Dialect bridges (C5) convert it at the edges — into
// Anthropic's indexed content-block events on egress, or out of them on
// ingress (see `dialect::anthropic_stream`).

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Chunk<'a> {
    #[serde(default)]
    pub id: Cow<'a, str>,
    #[serde(default)]
    pub model: Cow<'a, str>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StreamingToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThinkingDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

// --- Canonical streaming event (§3 "Streaming Event (internal)") -------
//
// Dialect-neutral output of the Anthropic-egress state machine
// (`dialect::anthropic_stream`): one event per content-block lifecycle
// transition, matching the Anthropic wire shape closely enough that egress
// is a near-direct serialization, while still being the form any other
// egress dialect converts from.

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    MessageStart { id: String, model: String },
    ContentBlockStart { index: u32, block: ContentBlockKind },
    ContentBlockDelta { index: u32, delta: BlockDelta },
    ContentBlockStop { index: u32 },
    MessageDelta { stop_reason: FinishReason, usage: Usage },
    MessageStop,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlockKind {
    Text,
    Thinking,
    ToolUse { id: String, name: String },
    WebSearchToolResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockDelta {
    Text(String),
    ThinkingText(String),
    ThinkingSignature(String),
    InputJson(String),
    Annotation(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingToolCall {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamingFunctionCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamingFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_image_becomes_data_url() {
        let source = ImageSource::Base64 {
            media_type: "image/png".to_string(),
            data: "Zm9v".to_string(),
        };
        assert_eq!(source.into_data_url(), "data:image/png;base64,Zm9v");
    }

    #[test]
    fn url_image_passes_through() {
        let source = ImageSource::Url("https://example.com/a.png".to_string());
        assert_eq!(source.into_data_url(), "https://example.com/a.png");
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(FinishReason::from_openai_str("stop"), FinishReason::EndTurn);
        assert_eq!(FinishReason::from_openai_str("length"), FinishReason::MaxTokens);
        assert_eq!(FinishReason::from_openai_str("tool_calls"), FinishReason::ToolUse);
        assert_eq!(FinishReason::from_openai_str("content_filter"), FinishReason::StopSequence);
        assert_eq!(FinishReason::from_openai_str("weird"), FinishReason::EndTurn);
    }

    #[test]
    fn content_container_flattens_text_blocks() {
        let blocks = ContentContainer::Blocks(vec![
            Content::Text { text: "a".to_string() },
            Content::ToolUse {
                id: "1".to_string(),
                name: "f".to_string(),
                input: Value::Null,
            },
            Content::Text { text: "b".to_string() },
        ]);
        assert_eq!(blocks.as_text(), "a\nb");
    }
}
