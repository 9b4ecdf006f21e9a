use bytes::Bytes;
use log::debug;
use serde::Serialize;
use std::fmt;

use crate::errors::TransformError;

pub const DONE_MARKER: &str = "[DONE]";

// ============================================================================
// SSE EVENT CONTAINER
// ============================================================================

/// One server-sent event: an optional `event:` type plus its `data:` payload.
/// Multi-line payloads are joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        SseEvent {
            event: None,
            data: data.into(),
        }
    }

    pub fn with_event(event: impl Into<String>, data: impl Into<String>) -> Self {
        SseEvent {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    /// Serializes `payload` into the data field.
    pub fn json<T: Serialize>(event: Option<&str>, payload: &T) -> Result<Self, TransformError> {
        let data = serde_json::to_string(payload)
            .map_err(|e| TransformError::Internal(format!("failed to encode SSE payload: {}", e)))?;
        Ok(SseEvent {
            event: event.map(str::to_string),
            data,
        })
    }

    pub fn done() -> Self {
        SseEvent::data(DONE_MARKER)
    }

    /// Check if this event represents the end of the stream
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_MARKER
    }

    /// Keep-alive events carry no content.
    pub fn is_ping(&self) -> bool {
        self.event.as_deref() == Some("ping")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Wire form, terminated by the blank line that closes the event.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
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

impl fmt::Display for SseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl From<SseEvent> for Vec<u8> {
    fn from(event: SseEvent) -> Self {
        event.to_wire().into_bytes()
    }
}

impl From<SseEvent> for Bytes {
    fn from(event: SseEvent) -> Self {
        Bytes::from(event.to_wire())
    }
}

/// Concatenated wire form of a sequence of events.
pub fn to_wire_bytes(events: &[SseEvent]) -> Bytes {
    let mut out = String::new();
    for event in events {
        out.push_str(&event.to_wire());
    }
    Bytes::from(out)
}

// ============================================================================
// LINE PARSING
// ============================================================================

/// Accumulates field lines until the blank line that dispatches the event.
#[derive(Debug, Default)]
struct EventBlock {
    event: Option<String>,
    data: Vec<String>,
}

impl EventBlock {
    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.flush();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" | "retry" => {}
            other => debug!("ignoring unknown SSE field `{}`", other),
        }
        None
    }

    fn flush(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        let event = SseEvent {
            event: self.event.take(),
            data: self.data.join("\n"),
        };
        self.data.clear();
        Some(event)
    }
}

/// Parses a complete SSE body.
pub fn parse_sse(text: &str) -> Vec<SseEvent> {
    let mut block = EventBlock::default();
    let mut events: Vec<SseEvent> = text.lines().filter_map(|line| block.feed_line(line)).collect();
    events.extend(block.flush());
    events
}

/// Incremental parser for SSE bodies that arrive in arbitrary byte chunks,
/// including chunks that split a UTF-8 sequence or a line.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    block: EventBlock,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(event) = self.block.feed_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            if let Some(event) = self.block.feed_line(&line) {
                return Some(event);
            }
        }
        self.block.flush()
    }
}

/// Generic SSE streaming iterator: turns an iterator of lines into events.
/// Iteration stops after the `[DONE]` marker, which is still yielded.
pub struct SseStreamIter<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    lines: I,
    block: EventBlock,
    done_seen: bool,
    exhausted: bool,
}

impl<I> SseStreamIter<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            block: EventBlock::default(),
            done_seen: false,
            exhausted: false,
        }
    }
}

impl TryFrom<&[u8]> for SseStreamIter<std::vec::IntoIter<String>> {
    type Error = TransformError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| TransformError::Internal(format!("SSE body is not UTF-8: {}", e)))?;
        let lines: Vec<String> = s.lines().map(|line| line.to_string()).collect();
        Ok(SseStreamIter::new(lines.into_iter()))
    }
}

impl<I> Iterator for SseStreamIter<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = SseEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done_seen || self.exhausted {
            return None;
        }

        loop {
            let event = match self.lines.next() {
                Some(line) => self.block.feed_line(line.as_ref()),
                None => {
                    self.exhausted = true;
                    self.block.flush()
                }
            };
            match event {
                Some(event) if event.is_ping() => continue,
                Some(event) => {
                    if event.is_done() {
                        self.done_seen = true;
                    }
                    return Some(event);
                }
                None if self.exhausted => return None,
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blocks_with_event_lines() {
        let body = "event: message_start\ndata: {\"type\":\"message_start\"}\n\nevent: ping\ndata: {\"type\": \"ping\"}\n\n: keep-alive comment\ndata: {\"a\":1}\n\n";
        let events = parse_sse(body);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type(), Some("message_start"));
        assert!(events[1].is_ping());
        assert_eq!(events[2].event, None);
        assert_eq!(events[2].data, "{\"a\":1}");
    }

    #[test]
    fn test_multi_line_data_joined() {
        let events = parse_sse("data: line one\ndata: line two\n\n");
        assert_eq!(events, vec![SseEvent::data("line one\nline two")]);
        assert_eq!(events[0].to_wire(), "data: line one\ndata: line two\n\n");
    }

    #[test]
    fn test_incremental_parser_handles_split_chunks() {
        let mut parser = SseParser::new();
        let mut events = parser.push(b"data: {\"text\":\"caf");
        assert!(events.is_empty());
        events.extend(parser.push("é\"}\r\n\r\nda".as_bytes()));
        events.extend(parser.push(b"ta: [DONE]"));
        events.extend(parser.finish());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"text\":\"café\"}");
        assert!(events[1].is_done());
    }

    #[test]
    fn test_stream_iter_stops_after_done() {
        let body = "data: {\"id\":\"1\"}\n\nevent: ping\ndata: {}\n\ndata: [DONE]\n\ndata: {\"id\":\"2\"}\n\n";
        let events: Vec<SseEvent> = SseStreamIter::try_from(body.as_bytes()).unwrap().collect();
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_done());
        assert!(events[1].is_done());
    }

    #[test]
    fn test_wire_format_with_event() {
        let event = SseEvent::with_event("content_block_stop", "{\"index\":0}");
        let bytes: Vec<u8> = event.into();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "event: content_block_stop\ndata: {\"index\":0}\n\n"
        );
    }
}
