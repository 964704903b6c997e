//! Incremental Server-Sent-Events codec (spec.md §4.2, C2).
//!
//! Upstream providers and our own egress both speak SSE, and bytes arrive in
//! arbitrary chunks — a `data:` line can be split across two `feed()` calls,
//! or two whole events can land in one. [`SseDecoder`] accumulates a byte
//! buffer and only yields events once a blank-line terminator has been seen,
//! same as the accumulator pattern other proxies in this codebase use for
//! their own SSE consumers.

use crate::error::Result;

/// Upper bound on how much unterminated input we'll buffer before forcing a
/// flush (spec.md §4.2 P7): a provider that never sends the blank-line
/// terminator must not be allowed to grow the buffer unbounded. Crossing it
/// is not an error — already-complete events are still parsed out, and only
/// the incomplete tail is kept.
const MAX_EVENT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        Self { event: None, data: data.into(), id: None }
    }

    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self { event: Some(event.into()), data: data.into(), id: None }
    }

    /// Render as wire bytes, terminated by the blank line that ends an event.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-received bytes in, draining as many complete events as are
    /// now available. Leftover partial data stays buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();

        loop {
            let Some(boundary) = find_event_boundary(&self.buffer) else {
                break;
            };

            let raw: Vec<u8> = self.buffer.drain(..boundary.0).collect();
            self.buffer.drain(..boundary.1 - boundary.0);

            if let Some(event) = parse_event(&raw) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_EVENT_BYTES {
            log::warn!("SSE event exceeded {MAX_EVENT_BYTES} buffered bytes without a terminator; flushing incomplete tail");
            events.extend(self.flush());
        }

        Ok(events)
    }

    /// Parse whatever remains as a final, unterminated event (used when the
    /// upstream connection closes without a trailing blank line).
    pub fn flush(&mut self) -> Vec<SseEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let raw = std::mem::take(&mut self.buffer);
        parse_event(&raw).into_iter().collect()
    }
}

/// Finds the first `\n\n` or `\r\n\r\n` terminator. Returns `(event_end,
/// after_terminator)` so the caller can split data from terminator cleanly
/// regardless of which line ending the provider used.
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buffer.len() {
        if buffer[i] == b'\n' && buffer[i + 1] == b'\n' {
            return Some((i, i + 2));
        }
        if i + 3 < buffer.len() && &buffer[i..i + 4] == b"\r\n\r\n" {
            return Some((i, i + 4));
        }
        i += 1;
    }
    None
}

fn parse_event(raw: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(raw);
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();
    let mut saw_field = false;

    for line in text.split(['\n']) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        saw_field = true;
        match field {
            "event" => event.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            "id" => event.id = Some(value.to_string()),
            _ => {}
        }
    }

    if !saw_field {
        return None;
    }

    event.data = data_lines.join("\n");
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: message_start\ndata: {\"a\":1}\n\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message_start"));
        assert_eq!(events[0].data, r#"{"a":1}"#);
    }

    #[test]
    fn tolerates_split_at_arbitrary_byte_boundary() {
        let whole = b"event: ping\ndata: hello world\n\n";
        let mut decoder = SseDecoder::new();
        let mut all = Vec::new();

        for chunk in whole.chunks(3) {
            all.extend(decoder.feed(chunk).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data, "hello world");
    }

    #[test]
    fn multiple_events_in_one_feed() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: one\n\ndata: two\n\n").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "one");
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn multiline_data_is_joined_with_newline() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: line one\ndata: line two\n\n").unwrap();
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn flush_yields_unterminated_trailing_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: partial").unwrap().is_empty());
        let flushed = decoder.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].data, "partial");
    }

    #[test]
    fn oversized_unterminated_event_flushes_instead_of_erroring() {
        let mut decoder = SseDecoder::new();
        let mut chunk = b"data: ".to_vec();
        chunk.extend(vec![b'a'; MAX_EVENT_BYTES]);
        let events = decoder.feed(&chunk).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.len(), MAX_EVENT_BYTES);
        assert!(decoder.flush().is_empty());
    }

    #[test]
    fn complete_events_before_an_oversized_tail_still_yield() {
        let mut decoder = SseDecoder::new();
        let mut chunk = b"data: one\n\ndata: ".to_vec();
        chunk.extend(vec![b'a'; MAX_EVENT_BYTES]);
        let events = decoder.feed(&chunk).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "one");
        assert_eq!(events[1].data.len(), MAX_EVENT_BYTES);
    }

    #[test]
    fn encode_round_trips_through_decoder() {
        let event = SseEvent::named("content_block_delta", "{\"x\":true}");
        let mut decoder = SseDecoder::new();
        let decoded = decoder.feed(event.encode().as_bytes()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], event);
    }
}
