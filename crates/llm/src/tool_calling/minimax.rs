//! MiniMax-M2 XML-style tool-call and thinking extraction (spec.md §4.7.2,
//! C7). Grammar: an optional `<thinking>…</thinking>` block, followed by
//! zero or more `<invoke name="FN">…<parameter name="P">VALUE</parameter>…
//! </invoke>` blocks.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::Result,
    transformer::Transformer,
    unified::{self, FunctionCall, ToolCall},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    Uuid,
    Counter,
    FunctionBased,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MiniMaxOptions {
    pub enable_thinking: bool,
    pub buffer_incomplete_xml: bool,
    pub id_strategy: IdStrategy,
    pub id_prefix: String,
}

impl Default for MiniMaxOptions {
    fn default() -> Self {
        Self { enable_thinking: true, buffer_incomplete_xml: true, id_strategy: IdStrategy::Uuid, id_prefix: "functions".to_string() }
    }
}

fn thinking_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<thinking>(?P<body>.*?)</thinking>").unwrap())
}

fn invoke_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<invoke name="(?P<name>[^"]+)">(?P<body>.*?)</invoke>"#).unwrap())
}

fn parameter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<parameter name="(?P<name>[^"]+)">(?P<value>.*?)</parameter>"#).unwrap())
}

pub struct Extracted {
    pub content: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Non-streaming parse (§4.7.2). Parse failures (malformed XML, counted as
/// "no `<invoke>` match found") return the original content untouched and
/// no tool calls (§7).
pub fn parse(text: &str, options: &MiniMaxOptions, counter: u64) -> Extracted {
    let mut content = text.to_string();
    let mut thinking = None;

    if options.enable_thinking
        && let Some(captures) = thinking_regex().captures(&content.clone())
    {
        thinking = Some(captures["body"].trim().to_string());
        content = thinking_regex().replace(&content, "").to_string();
    }

    let mut tool_calls = Vec::new();
    for (index, invoke) in invoke_regex().captures_iter(&content.clone()).enumerate() {
        let name = invoke["name"].to_string();
        let mut params = serde_json::Map::new();

        for param in parameter_regex().captures_iter(&invoke["body"]) {
            let key = param["name"].to_string();
            let value = strip_one_newline(&param["value"]);
            let parsed = serde_json::from_str(&value).unwrap_or(Value::String(value));
            params.insert(key, parsed);
        }

        let id = match options.id_strategy {
            IdStrategy::Uuid => format!("{}.{name}.{}", options.id_prefix, Uuid::new_v4()),
            IdStrategy::Counter => format!("{}.{name}.{}", options.id_prefix, counter + index as u64),
            IdStrategy::FunctionBased => format!("{}.{name}", options.id_prefix),
        };

        tool_calls.push(ToolCall { id, function: FunctionCall { name, arguments: Value::Object(params).to_string() } });
    }

    content = invoke_regex().replace_all(&content, "").trim().to_string();

    Extracted { content, thinking, tool_calls }
}

/// A single leading/trailing newline only — not general whitespace
/// trimming, per §4.7.2.
fn strip_one_newline(value: &str) -> String {
    let value = value.strip_prefix('\n').unwrap_or(value);
    value.strip_suffix('\n').unwrap_or(value).to_string()
}

/// Streaming buffer: accumulates text deltas while
/// `bufferIncompleteXML=true`. The caller always forwards the original
/// chunk; this buffer only feeds the final synthesised chunk on `[DONE]`.
#[derive(Default)]
pub struct XmlBuffer {
    text: String,
}

impl XmlBuffer {
    pub fn push(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Runs the non-streaming parse over everything buffered so far.
    pub fn finish(&self, options: &MiniMaxOptions, counter: u64) -> Extracted {
        parse(&self.text, options, counter)
    }
}

/// MiniMax-M2 stage (§4.7.2): pulls `<thinking>`/`<invoke>` XML out of the
/// response text on the way out. Has nothing to say about the request.
pub struct MiniMax {
    options: MiniMaxOptions,
}

impl MiniMax {
    pub fn new(options: MiniMaxOptions) -> Self {
        Self { options }
    }

    /// Per-response buffer for `bufferIncompleteXML=true`. Constructed fresh
    /// by the caller for each streamed response, never held on `self`.
    pub fn new_xml_buffer(&self) -> XmlBuffer {
        XmlBuffer::default()
    }
}

#[async_trait]
impl Transformer for MiniMax {
    fn name(&self) -> &'static str {
        "minimax"
    }

    async fn response_out(&self, mut response: unified::Response) -> Result<unified::Response> {
        let extracted = parse(&response.message.content.as_text(), &self.options, 0);

        response.message.content = unified::ContentContainer::Text(extracted.content);
        if !extracted.tool_calls.is_empty() {
            response.message.tool_calls = Some(extracted.tool_calls);
        }
        if self.options.enable_thinking && extracted.thinking.is_some() {
            response.message.thinking = extracted.thinking;
        }

        Ok(response)
    }
}
