//! Kimi-K2 tool-call marker parsing, ID repair, and streaming delta
//! assembly (spec.md §4.7.1, C7).
//!
//! `emitToolCallsInJson` is carried as a field but intentionally does
//! nothing: the source this was distilled from branches on it with two
//! identical arms, so no behavior is specified (§9 Open Questions; see
//! `DESIGN.md`). `idNormalization`'s interplay with `counterScope` across
//! turns is likewise an open question resolved in `DESIGN.md`: `next_index`
//! is computed from the entire conversation history, not reset per turn.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::Result,
    transformer::Transformer,
    unified::{self, FunctionCall, Message, StreamingFunctionCall, StreamingToolCall, ToolCall},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KimiOptions {
    pub accept_role_tool: bool,
    pub enforce_finish_reason_loop: bool,
    pub manual_tool_parsing: bool,
    /// Reserved; the source this is grounded on branches on this flag with
    /// two identical outcomes, so it is accepted but has no effect.
    pub emit_tool_calls_in_json: bool,
    pub assemble_tool_deltas: bool,
    pub id_normalization: bool,
    pub repair_on_mismatch: bool,
    pub id_prefix: String,
    /// `toolChoiceDefault` (§4.7.1): set on the request when tools are
    /// present and the caller left `tool_choice` unset.
    pub tool_choice_default: String,
}

impl Default for KimiOptions {
    fn default() -> Self {
        Self {
            accept_role_tool: true,
            enforce_finish_reason_loop: true,
            manual_tool_parsing: false,
            emit_tool_calls_in_json: false,
            assemble_tool_deltas: false,
            id_normalization: false,
            repair_on_mismatch: true,
            id_prefix: "functions".to_string(),
            tool_choice_default: "auto".to_string(),
        }
    }
}

fn canonical_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<prefix>[^.]+)\.(?P<name>.+):(?P<n>\d+)$").unwrap())
}

fn marker_section_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<\|tool_calls_section_begin\|>(?P<body>.*?)<\|tool_calls_section_end\|>").unwrap()
    })
}

fn marker_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<\|tool_call_begin\|>(?P<func_id>.*?)<\|tool_call_argument_begin\|>(?P<args>.*?)<\|tool_call_end\|>").unwrap()
    })
}

/// `<prefix>.<name>` with an optional `:<idx>` suffix — looser than
/// [`canonical_id_regex`], which requires the index, since a freshly
/// emitted marker's funcId may not carry one yet.
fn func_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<prefix>[^.]+)\.(?P<name>.+?)(:(?P<n>\d+))?$").unwrap())
}

struct ParsedFuncId {
    name: String,
}

fn parse_func_id(func_id: &str) -> ParsedFuncId {
    match func_id_regex().captures(func_id) {
        Some(captures) => ParsedFuncId { name: captures["name"].to_string() },
        None => ParsedFuncId { name: func_id.to_string() },
    }
}

/// Non-streaming manual marker parse. Returns the cleaned text and any
/// extracted calls; an empty `Vec` means no marker section was present and
/// `text` is returned untouched.
pub fn parse_markers(text: &str) -> (String, Vec<ToolCall>) {
    let Some(section) = marker_section_regex().captures(text) else {
        return (text.to_string(), Vec::new());
    };

    let mut calls = Vec::new();
    for call in marker_call_regex().captures_iter(&section["body"]) {
        let parsed = parse_func_id(call["func_id"].trim());
        let raw_args = call["args"].trim();
        let arguments = parse_arguments(raw_args).map(|value| value.to_string()).unwrap_or_else(|| raw_args.to_string());
        calls.push(ToolCall {
            id: call["func_id"].trim().to_string(),
            function: FunctionCall { name: parsed.name, arguments },
        });
    }

    let cleaned = marker_section_regex().replace(text, "").to_string();
    let cleaned = cleaned.trim().to_string();

    (cleaned, calls)
}

/// Computes the next id-repair index from a conversation's prior messages,
/// scanning every `tool_calls[].id` against the canonical form (§9's
/// resolved open question: this is a whole-conversation maximum, not a
/// per-turn counter, so repair stays idempotent across turns too).
pub fn next_index(history: &[Message]) -> u32 {
    let max = history
        .iter()
        .filter_map(|message| message.tool_calls.as_ref())
        .flatten()
        .filter_map(|call| canonical_id_regex().captures(&call.id))
        .filter_map(|captures| captures["n"].parse::<u32>().ok())
        .max();

    max.map_or(0, |m| m + 1)
}

/// Rewrites tool-call ids into canonical `{prefix}.{name}:{n}` form per the
/// options in force. Idempotent: already-canonical ids under
/// `repair_on_mismatch` (without `id_normalization`) are left untouched (P2).
pub fn repair_ids(calls: Vec<ToolCall>, options: &KimiOptions, starting_index: u32) -> Vec<ToolCall> {
    let mut offset = 0u32;

    calls
        .into_iter()
        .map(|call| {
            let is_canonical = canonical_id_regex().is_match(&call.id);
            let should_rewrite = options.id_normalization || (options.repair_on_mismatch && !is_canonical);

            if !should_rewrite {
                return call;
            }

            let id = format!("{}.{}:{}", options.id_prefix, call.function.name, starting_index + offset);
            offset += 1;
            ToolCall { id, function: call.function }
        })
        .collect()
}

/// Runs the full manual-parse + ID-repair pass described in §4.7.1 over an
/// assistant message's raw text, given the conversation history for
/// `next_index`.
pub fn manual_parse_and_repair(
    text: &str,
    history: &[Message],
    options: &KimiOptions,
) -> Option<(String, Vec<ToolCall>)> {
    if !options.manual_tool_parsing {
        return None;
    }

    let (cleaned, calls) = parse_markers(text);
    if calls.is_empty() {
        return None;
    }

    let repaired = repair_ids(calls, options, next_index(history));
    Some((cleaned, repaired))
}

/// `acceptRoleTool=true` request validation (§4.7.1): a `role: tool`
/// message missing `tool_call_id` or content fails with `bad_request`.
pub fn validate_tool_message(message: &Message, options: &KimiOptions) -> Result<()> {
    use crate::{error::LlmError, unified::Role};

    if !options.accept_role_tool || message.role != Role::Tool {
        return Ok(());
    }

    let has_content = !message.content.as_text().is_empty();
    if message.tool_call_id.is_none() || !has_content {
        return Err(LlmError::BadRequest("tool message requires tool_call_id and non-empty content".to_string()));
    }

    Ok(())
}

fn tool_choice_mode(value: &str) -> Option<unified::ToolChoiceMode> {
    match value {
        "auto" => Some(unified::ToolChoiceMode::Auto),
        "required" => Some(unified::ToolChoiceMode::Required),
        "none" => Some(unified::ToolChoiceMode::None),
        _ => None,
    }
}

/// `toolChoiceDefault` (§4.7.1): set when tools are present and the caller
/// left `tool_choice` unset.
pub fn apply_tool_choice_default(request: &mut unified::Request, options: &KimiOptions) {
    if request.tools.is_some()
        && request.tool_choice.is_none()
        && let Some(mode) = tool_choice_mode(&options.tool_choice_default)
    {
        request.tool_choice = Some(unified::ToolChoice::Mode(mode));
    }
}

// --- Streaming assembly --------------------------------------------------

#[derive(Debug, Clone, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Per-stream buffer for `assembleToolDeltas=true`. Lives in the response
/// closure, never on a shared transformer instance (§5, §9).
#[derive(Default)]
pub struct ToolCallAssembler {
    buffers: Vec<(u32, PartialCall)>,
    options_prefix: String,
}

impl ToolCallAssembler {
    pub fn new(options: &KimiOptions) -> Self {
        Self { buffers: Vec::new(), options_prefix: options.id_prefix.clone() }
    }

    fn buffer_mut(&mut self, index: u32) -> &mut PartialCall {
        if let Some(pos) = self.buffers.iter().position(|(i, _)| *i == index) {
            &mut self.buffers[pos].1
        } else {
            self.buffers.push((index, PartialCall::default()));
            &mut self.buffers.last_mut().unwrap().1
        }
    }

    /// Feeds one streamed fragment. Per §4.7.1 this never changes what gets
    /// forwarded to the client — the caller always forwards the original
    /// chunk unchanged; this only accumulates state for the synthesised
    /// final chunk.
    pub fn feed(&mut self, call: &StreamingToolCall) {
        let buffer = self.buffer_mut(call.index);

        if let Some(id) = &call.id
            && !id.is_empty()
        {
            buffer.id = Some(id.clone());
        }

        if let Some(function) = &call.function {
            if let Some(name) = &function.name
                && !name.is_empty()
            {
                buffer.name = Some(name.clone());
            }
            if let Some(arguments) = &function.arguments {
                buffer.arguments.push_str(arguments);
            }
        }

        if buffer.id.is_none()
            && let Some(name) = &buffer.name
        {
            buffer.id = Some(format!("{}.{name}:{}", self.options_prefix, call.index));
        }
    }

    /// Produces the synthesised final `delta.tool_calls` chunk (§4.7.1): the
    /// buffered calls run through [`repair_ids`] (same as the non-streaming
    /// path) and sorted by index.
    pub fn finish(&self, options: &KimiOptions, starting_index: u32) -> Vec<StreamingToolCall> {
        let mut sorted = self.buffers.clone();
        sorted.sort_by_key(|(index, _)| *index);

        let calls = sorted
            .iter()
            .map(|(_, partial)| ToolCall {
                id: partial.id.clone().unwrap_or_default(),
                function: FunctionCall { name: partial.name.clone().unwrap_or_default(), arguments: partial.arguments.clone() },
            })
            .collect();
        let repaired = repair_ids(calls, options, starting_index);

        sorted
            .into_iter()
            .zip(repaired)
            .map(|((index, _), call)| StreamingToolCall {
                index,
                id: Some(call.id),
                function: Some(StreamingFunctionCall { name: Some(call.function.name), arguments: Some(call.function.arguments) }),
            })
            .collect()
    }
}

/// Parses a Kimi marker `function.arguments` payload into JSON, matching
/// I3's "parse, possibly after control-char fixup" allowance: on a plain
/// parse failure, strip C0/C1 control characters and retry directly (not
/// wrapped into a JSON string, which would change the structure `tool_use.input`
/// needs).
pub fn parse_arguments(raw: &str) -> Option<Value> {
    serde_json::from_str(raw).ok().or_else(|| {
        let fixed: String = raw.chars().filter(|c| !c.is_control()).collect();
        serde_json::from_str(&fixed).ok()
    })
}

/// Kimi-K2 stage (§4.7.1): validates incoming `role: tool` messages and
/// sets `toolChoiceDefault` on the way in, manually parses marker-style tool
/// calls out of the response text on the way out.
pub struct Kimi {
    options: KimiOptions,
}

impl Kimi {
    pub fn new(options: KimiOptions) -> Self {
        Self { options }
    }

    /// Per-response buffer for `assembleToolDeltas=true`. Constructed fresh
    /// by the caller for each streamed response, never held on `self` (§5,
    /// §9) — mirrors how `OpenRouterStream`/`AnthropicStreamState` are used.
    pub fn new_assembler(&self) -> ToolCallAssembler {
        ToolCallAssembler::new(&self.options)
    }
}

#[async_trait]
impl Transformer for Kimi {
    fn name(&self) -> &'static str {
        "kimi"
    }

    async fn request_in(&self, mut request: unified::Request) -> Result<unified::Request> {
        for message in &request.messages {
            validate_tool_message(message, &self.options)?;
        }
        apply_tool_choice_default(&mut request, &self.options);
        Ok(request)
    }

    /// `manualToolParsing=true`: pulls marker-style tool calls out of the
    /// response text. `next_index` needs the conversation history, which
    /// this hook doesn't carry, so repair here always starts from zero —
    /// callers that need whole-conversation id continuity should drive
    /// [`manual_parse_and_repair`] directly with the real history instead.
    async fn response_out(&self, mut response: unified::Response) -> Result<unified::Response> {
        if self.options.manual_tool_parsing
            && let Some((cleaned, calls)) = manual_parse_and_repair(&response.message.content.as_text(), &[], &self.options)
        {
            response.message.content = unified::ContentContainer::Text(cleaned);
            response.message.tool_calls = Some(calls);
        }
        Ok(response)
    }
}
