//! SSE event stream parser
//!
//! Implements the event stream format:
//! - a line's field name is the text before the first `:`; the value loses
//!   exactly one leading space
//! - `data:` values accumulate and are joined with newlines
//! - an empty line dispatches the pending event, but only if it carries data
//! - `:` lines are comments (keepalives) and are skipped
//! - line terminators may be LF, CRLF, or a lone CR
//! - a leading U+FEFF byte-order mark is ignored

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name (from `event:`), if the event was named.
    pub event_type: Option<String>,
    /// Payload from the `data:` field(s), joined with newlines.
    pub data: String,
    /// Event ID (from `id:`).
    pub id: Option<String>,
}

impl SseEvent {
    /// Event name used for dispatch; unnamed events are `message`.
    pub fn effective_type(&self) -> &str {
        self.event_type.as_deref().unwrap_or("message")
    }
}

/// Incremental parser: feed raw bytes, get back the events they complete.
///
/// Bytes are buffered until they form whole lines, so chunk boundaries may
/// fall anywhere, including inside a multi-byte UTF-8 sequence.
pub struct SseParser {
    /// Undecoded bytes (possibly an incomplete UTF-8 sequence tail).
    pending: Vec<u8>,
    /// Decoded text not yet consumed as lines.
    text: String,
    /// True until the first decoded character has been examined for a BOM.
    at_start: bool,
    event_type: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            text: String::new(),
            at_start: true,
            event_type: None,
            data_lines: Vec::new(),
            id: None,
        }
    }

    /// Feed bytes into the parser and return any events they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.decode(bytes);

        let mut events = Vec::new();
        while let Some(line) = self.take_line() {
            if let Some(event) = self.consume_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Drop all buffered bytes and the half-built event.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.text.clear();
        self.at_start = true;
        self.event_type = None;
        self.data_lines.clear();
        self.id = None;
    }

    /// Decode as much of `pending + bytes` as forms valid UTF-8, keeping an
    /// incomplete trailing sequence for the next chunk and skipping bytes
    /// that can never decode.
    fn decode(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut buf = std::mem::take(&mut self.pending);

        loop {
            match std::str::from_utf8(&buf) {
                Ok(s) => {
                    self.push_text(s);
                    buf.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // from_utf8 guarantees the prefix is valid.
                    if let Ok(s) = std::str::from_utf8(&buf[..valid]) {
                        self.push_text(s);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            tracing::warn!(bytes = bad, "skipping undecodable bytes in SSE stream");
                            buf.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the end of the chunk.
                            buf.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        self.pending = buf;
    }

    fn push_text(&mut self, s: &str) {
        let mut s = s;
        if self.at_start && !s.is_empty() {
            s = s.strip_prefix('\u{feff}').unwrap_or(s);
            self.at_start = false;
        }
        self.text.push_str(s);
    }

    /// Take the next complete line off the text buffer.
    ///
    /// A trailing CR with nothing after it stays buffered: it may be the
    /// first half of a CRLF, and consuming it early would fabricate an
    /// empty line (and so a spurious dispatch) when the LF arrives.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.text.find(['\r', '\n'])?;
        let terminator = self.text.as_bytes()[pos];
        if terminator == b'\r' && pos + 1 == self.text.len() {
            return None;
        }
        let line = self.text[..pos].to_string();
        let consumed = if terminator == b'\r' && self.text.as_bytes()[pos + 1] == b'\n' {
            pos + 2
        } else {
            pos + 1
        };
        self.text.drain(..consumed);
        Some(line)
    }

    /// Apply one line to the pending event; an empty line may dispatch it.
    fn consume_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                // Reconnection delay hint; this parser does not reconnect.
            }
            _ => {}
        }
        None
    }

    /// Dispatch the pending event. Events with no data are cleared without
    /// being dispatched, as an `EventSource` would.
    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take();
        let id = self.id.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(SseEvent {
            event_type,
            data,
            id,
        })
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_event_with_json_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: progress\ndata: {\"message\":\"Decomposed Table 1: Starting computations.\"}\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].effective_type(), "progress");
        assert_eq!(
            events[0].data,
            r#"{"message":"Decomposed Table 1: Starting computations."}"#
        );
    }

    #[test]
    fn test_unnamed_event_dispatches_as_message() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: hello\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, None);
        assert_eq!(events[0].effective_type(), "message");
    }

    #[test]
    fn test_multiline_data_joined_with_newlines() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: line1\ndata: line2\ndata: line3\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line1\nline2\nline3");
    }

    #[test]
    fn test_event_without_data_is_not_dispatched() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: complete\n\ndata: later\n\n");

        // The data-less `complete` is cleared; its name must not leak into
        // the following event.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, None);
        assert_eq!(events[0].data, "later");
    }

    #[test]
    fn test_comment_lines_are_skipped() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keepalive\nevent: progress\ndata: x\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("progress"));
    }

    #[test]
    fn test_chunk_boundary_inside_a_line() {
        let mut parser = SseParser::new();

        assert!(parser.feed(b"event: stream-err").is_empty());
        let events = parser.feed(b"or\ndata: {\"message\":\"boom\"}\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("stream-error"));
    }

    #[test]
    fn test_chunk_boundary_inside_utf8_sequence() {
        let mut parser = SseParser::new();
        let full = "data: d\u{00e9}j\u{00e0} vu\n\n".as_bytes();
        // Split in the middle of the two-byte 'é'.
        let split = full.iter().position(|&b| b == 0xc3).unwrap() + 1;

        assert!(parser.feed(&full[..split]).is_empty());
        let events = parser.feed(&full[split..]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "d\u{00e9}j\u{00e0} vu");
    }

    #[test]
    fn test_crlf_and_lone_cr_terminators() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: progress\r\ndata: a\rdata: b\r\n\r\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn test_trailing_cr_waits_for_next_chunk() {
        let mut parser = SseParser::new();

        assert!(parser.feed(b"data: x\r").is_empty());
        // The buffered CR pairs with this LF; the blank line then dispatches.
        let events = parser.feed(b"\n\r\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_leading_bom_is_ignored() {
        let mut parser = SseParser::new();
        let mut bytes = vec![0xef, 0xbb, 0xbf];
        bytes.extend_from_slice(b"data: after-bom\n\n");

        let events = parser.feed(&bytes);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "after-bom");
    }

    #[test]
    fn test_data_without_space_after_colon() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data:no-space\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "no-space");
    }

    #[test]
    fn test_field_value_keeps_only_first_space() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data:  two-spaces\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, " two-spaces");
    }

    #[test]
    fn test_id_and_retry_fields() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"id: 7\nretry: 3000\ndata: x\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events =
            parser.feed(b"event: progress\ndata: 1\n\nevent: complete\ndata: 2\n\n");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("progress"));
        assert_eq!(events[1].event_type.as_deref(), Some("complete"));
    }

    #[test]
    fn test_invalid_bytes_are_skipped() {
        let mut parser = SseParser::new();
        // 0xff can never begin a UTF-8 sequence.
        let events = parser.feed(b"data: ok\xff\xffstill\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "okstill");
    }

    #[test]
    fn test_reset_discards_half_built_event() {
        let mut parser = SseParser::new();
        parser.feed(b"event: progress\ndata: partial");

        parser.reset();

        let events = parser.feed(b"event: complete\ndata: fresh\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("complete"));
        assert_eq!(events[0].data, "fresh");
    }
}
