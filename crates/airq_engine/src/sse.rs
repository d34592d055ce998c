/// Incremental decoder for a `text/event-stream` body.
///
/// Only `data:` fields matter here; `event:`, `id:` and `retry:` are skipped,
/// as are comment lines. Multi-line data is joined with `\n`. An event is
/// dispatched on the blank line that terminates it, so data left over when
/// the stream ends is never emitted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk and returns the payload of every completed event.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(&['\r', '\n'][..]);
            if let Some(event) = self.feed_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// True when the stream stopped in the middle of an event.
    pub fn has_partial(&self) -> bool {
        !self.data.is_empty() || !self.buffer.is_empty()
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let event = self.data.join("\n");
            self.data.clear();
            return Some(event);
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"status\":").is_empty());
        assert!(decoder.push(b"\"start\"}\r\n").is_empty());
        let events = decoder.push(b"\r\ndata: {\"status\":\"complete\"}\n\n");
        assert_eq!(
            events,
            vec![
                r#"{"status":"start"}"#.to_string(),
                r#"{"status":"complete"}"#.to_string()
            ]
        );
        assert!(!decoder.has_partial());
    }

    #[test]
    fn skips_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: progress\nid: 7\ndata:a\ndata: b\n\n\n");
        assert_eq!(events, vec!["a\nb".to_string()]);
    }

    #[test]
    fn unterminated_event_is_held_back() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"status\":\"done\"}\n").is_empty());
        assert!(decoder.has_partial());
    }
}
