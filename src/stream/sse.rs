/// SSE (Server-Sent Events) frame parser and chunk decoding utilities.
///
/// Handles the low-level splitting of an upstream byte stream into discrete
/// SSE frames, buffering partial lines across arbitrary chunk boundaries per
/// the [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html).
use super::SseEvent;
use memchr::memchr_iter;

// ---------------------------------------------------------------------------
// SseParser — incremental SSE line parser
// ---------------------------------------------------------------------------

/// Incremental SSE line parser.
///
/// Feed it text chunks (potentially arriving at arbitrary byte boundaries)
/// and it yields fully-assembled [`SseEvent`] frames. A frame is emitted
/// only when its terminating blank line has been seen; unterminated data is
/// retained for the next `feed` call. Call [`SseParser::flush`] at
/// end-of-input to dispatch whatever is still buffered.
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            event_type: None,
            data_buffer: String::new(),
            has_data: false,
        }
    }

    /// Feed raw text and return any complete events parsed.
    ///
    /// SSE grammar rules:
    /// - `event:` lines set the event type for the next frame
    /// - `data:` lines append to the data buffer (one leading space after
    ///   the colon is stripped, multiple `data:` lines join with `\n`)
    /// - an empty line terminates the frame — emit it and reset
    /// - `:`-prefixed comment lines are ignored
    /// - lines that match no known `field:` grammar are ignored, never an
    ///   error (a single corrupt line must not abort the stream)
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        let bytes = self.buffer.as_bytes();
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                out,
            );
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
        } else if self.read_offset >= 4 * 1024 {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Signal end-of-input and return any still-buffered frame.
    ///
    /// End-of-input acts as the final dispatch boundary: a trailing partial
    /// line is processed as if newline-terminated, and a pending frame that
    /// has accumulated data is emitted. Upstreams that close the connection
    /// without the final blank line thus lose no bytes.
    pub fn flush(&mut self) -> Vec<SseEvent> {
        let mut out = Vec::new();
        if self.read_offset < self.buffer.len() {
            let tail = self.buffer.split_off(self.read_offset);
            let mut line = tail.as_str();
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                &mut out,
            );
        }
        self.buffer.clear();
        self.read_offset = 0;
        if self.has_data {
            out.push(SseEvent {
                event: self.event_type.take(),
                data: std::mem::take(&mut self.data_buffer),
            });
            self.has_data = false;
        }
        out
    }

    fn process_line(
        line: &str,
        event_type: &mut Option<String>,
        data_buffer: &mut String,
        has_data: &mut bool,
        events: &mut Vec<SseEvent>,
    ) {
        if line.is_empty() {
            // Empty line = dispatch event
            if *has_data {
                events.push(SseEvent {
                    event: event_type.take(),
                    data: std::mem::take(data_buffer),
                });
                *has_data = false;
            }
            return;
        }

        // Comment line — ignore
        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            // Per spec: strip exactly one leading space after "data:"
            let value = value.strip_prefix(' ').unwrap_or(value);
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *event_type = Some(value.to_string());
        }
        // Unknown fields and malformed lines are ignored
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ChunkDecoder — incremental UTF-8 decoding of RawChunks
// ---------------------------------------------------------------------------

/// Incremental UTF-8 decoder for upstream byte chunks.
///
/// A multi-byte sequence split across chunk boundaries is carried over to
/// the next call rather than dropped or replaced, so every upstream byte
/// reaches the parser exactly once.
#[derive(Default)]
pub struct ChunkDecoder {
    remainder: Vec<u8>,
}

impl ChunkDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, invoking `emit` with each valid UTF-8 run.
    pub fn decode(&mut self, bytes: &[u8], mut emit: impl FnMut(&str)) {
        if self.remainder.is_empty() {
            match std::str::from_utf8(bytes) {
                Ok(text) => emit(text),
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                    let text = unsafe { std::str::from_utf8_unchecked(&bytes[..valid_up_to]) };
                    emit(text);
                    self.remainder.extend_from_slice(&bytes[valid_up_to..]);
                }
            }
            return;
        }

        self.remainder.extend_from_slice(bytes);
        match std::str::from_utf8(&self.remainder) {
            Ok(text) => {
                emit(text);
                self.remainder.clear();
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                let text = unsafe { std::str::from_utf8_unchecked(&self.remainder[..valid_up_to]) };
                emit(text);
                if valid_up_to > 0 {
                    let remain_len = self.remainder.len() - valid_up_to;
                    self.remainder.copy_within(valid_up_to.., 0);
                    self.remainder.truncate(remain_len);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_data_frame() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: hello world\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello world");
        assert!(events[0].event.is_none());
    }

    #[test]
    fn test_parse_named_event() {
        let mut parser = SseParser::new();
        let events = parser.feed("event: completion\ndata: {\"choices\":[]}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("completion"));
        assert_eq!(events[0].data, "{\"choices\":[]}");
    }

    #[test]
    fn test_parse_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: line1\ndata: line2\ndata: line3\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line1\nline2\nline3");
    }

    #[test]
    fn test_parse_multiple_frames_order() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: first\n\ndata: second\n\ndata: third\n\n");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data, "first");
        assert_eq!(events[1].data, "second");
        assert_eq!(events[2].data, "third");
    }

    #[test]
    fn test_parse_ignores_comments() {
        let mut parser = SseParser::new();
        let events = parser.feed(": keep-alive\ndata: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_parse_ignores_malformed_lines() {
        let mut parser = SseParser::new();
        let events = parser.feed("garbage without colon\ndata: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_parse_incremental_chunks() {
        let mut parser = SseParser::new();

        // First chunk — partial line
        let events = parser.feed("data: hel");
        assert!(events.is_empty());

        // Second chunk — completes the line but no blank line yet
        let events = parser.feed("lo\n");
        assert!(events.is_empty());

        // Third chunk — blank line terminates the frame
        let events = parser.feed("\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_parse_split_invariance() {
        let input = "event: completion\ndata: {\"a\":1}\n\ndata: [DONE]\n\ndata: tail\n\n";

        let mut whole = SseParser::new();
        let expected = whole.feed(input);

        for split_width in 1..input.len() {
            let mut parser = SseParser::new();
            let mut events = Vec::new();
            for chunk in input.as_bytes().chunks(split_width) {
                parser.feed_into(std::str::from_utf8(chunk).unwrap(), &mut events);
            }
            assert_eq!(events, expected, "split width {split_width}");
        }
    }

    #[test]
    fn test_parse_data_no_space_after_colon() {
        let mut parser = SseParser::new();
        let events = parser.feed("data:nospace\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "nospace");
    }

    #[test]
    fn test_parse_empty_data() {
        let mut parser = SseParser::new();
        let events = parser.feed("data:\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn test_parse_crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: hello\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_parse_empty_lines_without_data_dont_emit() {
        let mut parser = SseParser::new();
        let events = parser.feed("\n\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_flush_emits_unterminated_frame() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: trailing").is_empty());
        let events = parser.flush();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "trailing");
        // A second flush has nothing left to emit
        assert!(parser.flush().is_empty());
    }

    #[test]
    fn test_flush_after_terminated_frame_is_empty() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: done\n\n");
        assert_eq!(events.len(), 1);
        assert!(parser.flush().is_empty());
    }

    #[test]
    fn test_flush_keeps_event_type() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: completion\ndata: tail").is_empty());
        let events = parser.flush();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("completion"));
        assert_eq!(events[0].data, "tail");
    }

    #[test]
    fn test_feed_into_appends_without_clearing_output() {
        let mut parser = SseParser::new();
        let mut out = vec![SseEvent {
            event: None,
            data: "seed".to_string(),
        }];
        parser.feed_into("data: a\n\n", &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].data, "seed");
        assert_eq!(out[1].data, "a");
    }

    #[test]
    fn test_parse_completion_sequence() {
        let mut parser = SseParser::new();
        let input = "\
data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\
\n\
data: {\"choices\":[{\"delta\":{\"content\":\" there\"},\"finish_reason\":null}]}\n\
\n\
data: [DONE]\n\
\n";
        let events = parser.feed(input);
        assert_eq!(events.len(), 3);
        assert!(events[0].event.is_none());
        assert_eq!(events[2].data, "[DONE]");
    }

    // -- ChunkDecoder tests --

    #[test]
    fn test_chunk_decoder_plain_ascii() {
        let mut decoder = ChunkDecoder::new();
        let mut out = String::new();
        decoder.decode(b"hello", |s| out.push_str(s));
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_chunk_decoder_split_multibyte() {
        // "héllo" with the two-byte é split across chunks
        let bytes = "h\u{e9}llo".as_bytes();
        let mut decoder = ChunkDecoder::new();
        let mut out = String::new();
        decoder.decode(&bytes[..2], |s| out.push_str(s));
        decoder.decode(&bytes[2..], |s| out.push_str(s));
        assert_eq!(out, "h\u{e9}llo");
    }

    #[test]
    fn test_chunk_decoder_split_four_byte_scalar() {
        let text = "a\u{1F600}b";
        let bytes = text.as_bytes();
        for split in 1..bytes.len() {
            let mut decoder = ChunkDecoder::new();
            let mut out = String::new();
            decoder.decode(&bytes[..split], |s| out.push_str(s));
            decoder.decode(&bytes[split..], |s| out.push_str(s));
            assert_eq!(out, text, "split at {split}");
        }
    }
}
