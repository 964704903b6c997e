//! The Anthropic-egress streaming state machine (spec.md §4.5.2, §9): turns
//! the OpenAI-shaped internal chunk stream ([`unified::Chunk`]) into the
//! canonical [`unified::StreamEvent`] sequence, open/closing content blocks
//! in the order Anthropic's wire protocol requires (I1, I2, P1).
//!
//! This is the one piece of this crate with no direct ancestor in the
//! teacher codebase's naive `From<UnifiedChunk> for AnthropicStreamEvent` —
//! per the design notes, streaming parsers are state machines with explicit
//! state, not ad-hoc flags, so [`OpenBlock`] is the single source of truth
//! for what's open rather than a scatter of booleans.

use crate::unified::{BlockDelta, ChunkDelta, ContentBlockKind, FinishReason, StreamEvent, StreamingToolCall, Usage};

#[derive(Debug, Clone, Copy, PartialEq)]
enum OpenBlock {
    None,
    Text(u32),
    Thinking(u32),
    ToolUse(u32),
}

/// A tool-call block whose `id`/`name` aren't both known yet. Opening is
/// deferred until they are (or until something forces a flush), since
/// Anthropic's wire protocol has no way to amend an already-sent
/// `content_block_start` (§4.5.2's "upgraded in-place" requirement).
#[derive(Debug, Clone, Default)]
struct PendingToolCall {
    index: u32,
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Per-stream state. Never stored on a transformer instance (§5, §9) — one
/// of these lives in the closure scoped to a single response.
pub struct AnthropicStreamState {
    started: bool,
    open: OpenBlock,
    next_index: u32,
    tool_blocks: Vec<(u32, u32)>,
    pending_tool: Option<PendingToolCall>,
    pending_finish: Option<FinishReason>,
    usage: Usage,
    id: String,
    model: String,
    done: bool,
}

impl AnthropicStreamState {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            started: false,
            open: OpenBlock::None,
            next_index: 0,
            tool_blocks: Vec::new(),
            pending_tool: None,
            pending_finish: None,
            usage: Usage::default(),
            id: id.into(),
            model: model.into(),
            done: false,
        }
    }

    fn open_block(&mut self, kind: ContentBlockKind, out: &mut Vec<StreamEvent>) -> u32 {
        self.flush_pending(out);
        self.close_current(out);
        let index = self.next_index;
        self.next_index += 1;
        out.push(StreamEvent::ContentBlockStart { index, block: kind });
        index
    }

    /// Opens the deferred tool-use block, falling back to the provisional
    /// `call_pending_{idx}`/`tool_{idx}` forms only if forced to flush before
    /// both `id` and `name` arrived. Inlines its own open-block bookkeeping
    /// rather than calling [`Self::open_block`] to avoid recursing back here.
    fn flush_pending(&mut self, out: &mut Vec<StreamEvent>) {
        let Some(pending) = self.pending_tool.take() else { return };

        self.close_current(out);
        let id = pending.id.unwrap_or_else(|| format!("call_pending_{}", pending.index));
        let name = pending.name.unwrap_or_else(|| format!("tool_{}", pending.index));

        let index = self.next_index;
        self.next_index += 1;
        out.push(StreamEvent::ContentBlockStart { index, block: ContentBlockKind::ToolUse { id, name } });
        self.tool_blocks.push((pending.index, index));
        self.open = OpenBlock::ToolUse(index);

        if !pending.arguments.is_empty()
            && let Some(fixed) = repair_json_fragment(&pending.arguments)
        {
            out.push(StreamEvent::ContentBlockDelta { index, delta: BlockDelta::InputJson(fixed) });
        }
    }

    fn close_current(&mut self, out: &mut Vec<StreamEvent>) {
        let index = match self.open {
            OpenBlock::None => return,
            OpenBlock::Text(i) | OpenBlock::Thinking(i) | OpenBlock::ToolUse(i) => i,
        };
        out.push(StreamEvent::ContentBlockStop { index });
        self.open = OpenBlock::None;
    }

    fn tool_block_index(&self, tool_index: u32) -> Option<u32> {
        self.tool_blocks.iter().find(|(t, _)| *t == tool_index).map(|(_, b)| *b)
    }

    /// Feeds one incoming delta (one choice of one [`unified::Chunk`]),
    /// returning the events it produces.
    pub fn on_delta(&mut self, delta: &ChunkDelta, finish_reason: Option<&str>) -> Vec<StreamEvent> {
        let mut out = Vec::new();

        if !self.started {
            out.push(StreamEvent::MessageStart { id: self.id.clone(), model: self.model.clone() });
            self.started = true;
        }

        if let Some(thinking) = &delta.thinking {
            if let Some(content) = &thinking.content {
                if !matches!(self.open, OpenBlock::Thinking(_)) {
                    let index = self.open_block(ContentBlockKind::Thinking, &mut out);
                    self.open = OpenBlock::Thinking(index);
                }
                if let OpenBlock::Thinking(index) = self.open {
                    out.push(StreamEvent::ContentBlockDelta { index, delta: BlockDelta::ThinkingText(content.clone()) });
                }
            }
            if let Some(signature) = &thinking.signature {
                if let OpenBlock::Thinking(index) = self.open {
                    out.push(StreamEvent::ContentBlockDelta { index, delta: BlockDelta::ThinkingSignature(signature.clone()) });
                    out.push(StreamEvent::ContentBlockStop { index });
                    self.open = OpenBlock::None;
                }
            }
        }

        if let Some(text) = &delta.content {
            if !matches!(self.open, OpenBlock::Text(_)) {
                let index = self.open_block(ContentBlockKind::Text, &mut out);
                self.open = OpenBlock::Text(index);
            }
            if let OpenBlock::Text(index) = self.open {
                out.push(StreamEvent::ContentBlockDelta { index, delta: BlockDelta::Text(text.clone()) });
            }
        }

        if let Some(annotations) = &delta.annotations {
            self.close_current(&mut out);
            for annotation in annotations {
                let index = self.open_block(ContentBlockKind::WebSearchToolResult, &mut out);
                out.push(StreamEvent::ContentBlockDelta { index, delta: BlockDelta::Annotation(annotation.clone()) });
                out.push(StreamEvent::ContentBlockStop { index });
                self.open = OpenBlock::None;
            }
        }

        if let Some(tool_calls) = &delta.tool_calls {
            for call in tool_calls {
                self.apply_tool_call_delta(call, &mut out);
            }
        }

        if let Some(reason) = finish_reason {
            self.flush_pending(&mut out);
            self.close_current(&mut out);
            self.pending_finish = Some(FinishReason::from_openai_str(reason));
        }

        out
    }

    /// Forwards a streamed tool-call fragment. Once a block is open for this
    /// call's index, arguments are forwarded directly (with JSON-fixup
    /// retry); until then, id/name/arguments accumulate on `pending_tool` so
    /// a later chunk can still supply the id/name before anything is opened.
    fn apply_tool_call_delta(&mut self, call: &StreamingToolCall, out: &mut Vec<StreamEvent>) {
        if let Some(block_index) = self.tool_block_index(call.index) {
            if let Some(function) = &call.function
                && let Some(arguments) = &function.arguments
                && let Some(fixed) = repair_json_fragment(arguments)
            {
                out.push(StreamEvent::ContentBlockDelta { index: block_index, delta: BlockDelta::InputJson(fixed) });
            }
            return;
        }

        if self.pending_tool.as_ref().is_some_and(|pending| pending.index != call.index) {
            self.flush_pending(out);
        }

        let pending = self.pending_tool.get_or_insert_with(|| PendingToolCall { index: call.index, ..Default::default() });

        if let Some(id) = &call.id {
            pending.id = Some(id.clone());
        }
        if let Some(function) = &call.function {
            if let Some(name) = &function.name {
                pending.name = Some(name.clone());
            }
            if let Some(arguments) = &function.arguments {
                pending.arguments.push_str(arguments);
            }
        }

        if self.pending_tool.as_ref().is_some_and(|pending| pending.id.is_some() && pending.name.is_some()) {
            self.flush_pending(out);
        }
    }

    /// Accumulates usage seen on a chunk; the final figure is reported with
    /// the eventual `message_delta`.
    pub fn record_usage(&mut self, usage: Usage) {
        self.usage = usage;
    }

    /// Called once the upstream stream has ended (natural EOF, not
    /// cancellation — §5 says cancellation need not emit a final event).
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        self.done = true;

        let mut out = Vec::new();
        self.flush_pending(&mut out);
        self.close_current(&mut out);
        let stop_reason = self.pending_finish.take().unwrap_or(FinishReason::EndTurn);
        out.push(StreamEvent::MessageDelta { stop_reason, usage: self.usage });
        out.push(StreamEvent::MessageStop);
        out
    }
}

/// On a JSON control-character parse error, retries after stripping C0/C1
/// control bytes (§4.5.2's I3 fixup); any other parse error (almost always
/// an ordinary incomplete streaming fragment) is forwarded unchanged rather
/// than treated as a failure, since most fragments never parse standalone.
/// Returns `None` only when the control-char retry itself still fails,
/// signalling the caller should log and skip this fragment.
fn repair_json_fragment(fragment: &str) -> Option<String> {
    match serde_json::from_str::<serde_json::Value>(fragment) {
        Ok(_) => Some(fragment.to_string()),
        Err(err) => {
            let is_control_char_error = err.classify() == serde_json::error::Category::Syntax && err.to_string().contains("control character");
            if !is_control_char_error {
                return Some(fragment.to_string());
            }

            let fixed: String = fragment.chars().filter(|c| !c.is_control()).collect();
            match serde_json::from_str::<serde_json::Value>(&fixed) {
                Ok(_) => Some(fixed),
                Err(_) => {
                    log::warn!("dropping unrecoverable tool-call argument fragment with control characters");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unified::{StreamingFunctionCall, ThinkingDelta};

    fn text_delta(text: &str) -> ChunkDelta {
        ChunkDelta { content: Some(text.to_string()), ..Default::default() }
    }

    #[test]
    fn text_only_stream_opens_and_closes_one_block() {
        let mut state = AnthropicStreamState::new("msg_1", "claude-opus");
        let mut events = state.on_delta(&text_delta("hel"), None);
        events.extend(state.on_delta(&text_delta("lo"), None));
        events.extend(state.finish());

        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(events[1], StreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(events[2], StreamEvent::ContentBlockDelta { index: 0, .. }));
        assert!(matches!(events[3], StreamEvent::ContentBlockDelta { index: 0, .. }));
        assert!(matches!(events[4], StreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(events[5], StreamEvent::MessageDelta { stop_reason: FinishReason::EndTurn, .. }));
        assert!(matches!(events[6], StreamEvent::MessageStop));
    }

    #[test]
    fn thinking_then_text_closes_thinking_block_first() {
        let mut state = AnthropicStreamState::new("msg_1", "model");
        let mut events = state.on_delta(
            &ChunkDelta { thinking: Some(ThinkingDelta { content: Some("pondering".to_string()), signature: None }), ..Default::default() },
            None,
        );
        events.extend(state.on_delta(&text_delta("answer"), None));

        let thinking_start = events.iter().position(|e| matches!(e, StreamEvent::ContentBlockStart { block: ContentBlockKind::Thinking, .. })).unwrap();
        let thinking_stop = events.iter().position(|e| matches!(e, StreamEvent::ContentBlockStop { index: 0 })).unwrap();
        let text_start = events.iter().position(|e| matches!(e, StreamEvent::ContentBlockStart { block: ContentBlockKind::Text, .. })).unwrap();
        assert!(thinking_start < thinking_stop);
        assert!(thinking_stop < text_start);
    }

    #[test]
    fn tool_call_fragments_accumulate_on_same_block() {
        let mut state = AnthropicStreamState::new("msg_1", "model");
        let first = state.on_delta(
            &ChunkDelta {
                tool_calls: Some(vec![StreamingToolCall {
                    index: 0,
                    id: Some("call_1".to_string()),
                    function: Some(StreamingFunctionCall { name: Some("get_weather".to_string()), arguments: Some(String::new()) }),
                }]),
                ..Default::default()
            },
            None,
        );
        let second = state.on_delta(
            &ChunkDelta {
                tool_calls: Some(vec![StreamingToolCall {
                    index: 0,
                    id: None,
                    function: Some(StreamingFunctionCall { name: None, arguments: Some("{\"c\":1}".to_string()) }),
                }]),
                ..Default::default()
            },
            Some("tool_calls"),
        );

        assert!(matches!(first[1], StreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(second[0], StreamEvent::ContentBlockDelta { index: 0, delta: BlockDelta::InputJson(_) }));
        let finished = state.finish();
        assert!(matches!(finished.last(), Some(StreamEvent::MessageStop)));
        assert!(matches!(finished[0], StreamEvent::MessageDelta { stop_reason: FinishReason::ToolUse, .. }));
    }

    #[test]
    fn every_open_block_has_exactly_one_stop_before_message_stop() {
        let mut state = AnthropicStreamState::new("msg_1", "model");
        let mut events = state.on_delta(&text_delta("a"), None);
        events.extend(state.on_delta(
            &ChunkDelta {
                tool_calls: Some(vec![StreamingToolCall {
                    index: 0,
                    id: Some("call_1".to_string()),
                    function: Some(StreamingFunctionCall { name: Some("f".to_string()), arguments: Some("{}".to_string()) }),
                }]),
                ..Default::default()
            },
            Some("tool_calls"),
        ));
        events.extend(state.finish());

        let starts = events.iter().filter(|e| matches!(e, StreamEvent::ContentBlockStart { .. })).count();
        let stops = events.iter().filter(|e| matches!(e, StreamEvent::ContentBlockStop { .. })).count();
        assert_eq!(starts, stops);
    }

    #[test]
    fn tool_call_id_and_name_arriving_separately_upgrade_before_block_opens() {
        let mut state = AnthropicStreamState::new("msg_1", "model");
        let first = state.on_delta(
            &ChunkDelta {
                tool_calls: Some(vec![StreamingToolCall {
                    index: 0,
                    id: Some("call_1".to_string()),
                    function: Some(StreamingFunctionCall { name: None, arguments: Some("{\"c\":".to_string()) }),
                }]),
                ..Default::default()
            },
            None,
        );
        assert!(first.iter().all(|e| !matches!(e, StreamEvent::ContentBlockStart { .. })));

        let second = state.on_delta(
            &ChunkDelta {
                tool_calls: Some(vec![StreamingToolCall {
                    index: 0,
                    id: None,
                    function: Some(StreamingFunctionCall { name: Some("get_weather".to_string()), arguments: Some("1}".to_string()) }),
                }]),
                ..Default::default()
            },
            None,
        );

        let Some(StreamEvent::ContentBlockStart { block: ContentBlockKind::ToolUse { id, name }, .. }) = second.first() else {
            panic!("expected a tool_use block to open once id and name were both known");
        };
        assert_eq!(id, "call_1");
        assert_eq!(name, "get_weather");
        assert!(matches!(second[1], StreamEvent::ContentBlockDelta { delta: BlockDelta::InputJson(ref json), .. } if json == "{\"c\":1}"));
    }

    #[test]
    fn tool_call_missing_id_and_name_falls_back_to_provisional_on_forced_flush() {
        let mut state = AnthropicStreamState::new("msg_1", "model");
        let mut events = state.on_delta(
            &ChunkDelta {
                tool_calls: Some(vec![StreamingToolCall { index: 0, id: None, function: Some(StreamingFunctionCall { name: None, arguments: Some("{}".to_string()) }) }]),
                ..Default::default()
            },
            None,
        );
        events.extend(state.finish());

        let Some(StreamEvent::ContentBlockStart { block: ContentBlockKind::ToolUse { id, name }, .. }) = events.iter().find(|e| matches!(e, StreamEvent::ContentBlockStart { .. })) else {
            panic!("expected a provisional tool_use block to open on flush");
        };
        assert_eq!(id, "call_pending_0");
        assert_eq!(name, "tool_0");
    }

    #[test]
    fn repair_json_fragment_passes_through_ordinary_incomplete_json() {
        assert_eq!(repair_json_fragment("{\"loc").as_deref(), Some("{\"loc"));
    }

    #[test]
    fn repair_json_fragment_strips_control_characters() {
        let fragment = "{\"a\":\"x\u{7}y\"}";
        assert!(serde_json::from_str::<serde_json::Value>(fragment).is_err());
        let fixed = repair_json_fragment(fragment).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&fixed).is_ok());
    }
}
