//! Server-sent-event framing.
//!
//! A frame is `event: <type>\ndata: <json>\n\n`. [`SseDecoder`] accepts the
//! stream in arbitrary chunks and yields a frame at every blank line.

use super::StreamingEvent;

/// Encodes an event as one SSE frame.
#[must_use]
pub fn encode(event: &StreamingEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "null".to_string());
    encode_frame(event.event_type.as_str(), &data)
}

/// Encodes a raw `event`/`data` pair. Multi-line data is split across
/// `data:` lines.
#[must_use]
pub fn encode_frame(event: &str, data: &str) -> String {
    let mut frame = format!("event: {event}\n");
    for line in data.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// One decoded frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// The `data:` lines joined by `\n`.
    pub data: String,
}

impl SseFrame {
    /// Parses the data as a [`StreamingEvent`].
    pub fn to_event(&self) -> Result<StreamingEvent, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// Incremental SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    current: SseFrame,
    has_fields: bool,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if self.has_fields {
                    frames.push(std::mem::take(&mut self.current));
                    self.has_fields = false;
                }
                continue;
            }
            self.field(line);
        }

        frames
    }

    /// Returns true if a partial line or frame is buffered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || self.has_fields
    }

    fn field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (name, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);

        match name {
            "event" => {
                self.current.event = Some(value.to_string());
                self.has_fields = true;
            }
            "data" => {
                if self.has_fields && !self.current.data.is_empty() {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
                self.has_fields = true;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_encode_frame_layout() {
        let event = StreamingEvent::new(EventType::Heartbeat, "e1", 4, json!({}));
        let frame = encode(&event);

        assert!(frame.starts_with("event: heartbeat\ndata: {"));
        assert!(frame.ends_with("}\n\n"));
        assert_eq!(frame.matches('\n').count(), 3);
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let event = StreamingEvent::new(
            EventType::StepCompleted,
            "e1",
            2,
            json!({ "stepId": "a", "output": { "n": 1 } }),
        );
        let wire = format!("{}{}", encode(&event), encode_frame("heartbeat", "{}"));

        let mut decoder = SseDecoder::new();
        let mut frames = Vec::new();
        for chunk in wire.as_bytes().chunks(7) {
            frames.extend(decoder.push(std::str::from_utf8(chunk).unwrap()));
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.as_deref(), Some("step.completed"));
        assert_eq!(frames[0].to_event().unwrap(), event);
        assert_eq!(frames[1].data, "{}");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decoder_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(": keep-alive\r\nevent: x\r\ndata: a\r\ndata: b\r\n\r\n");

        assert_eq!(
            frames,
            vec![SseFrame {
                event: Some("x".into()),
                data: "a\nb".into()
            }]
        );
    }

    #[test]
    fn test_decoder_keeps_partial_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push("event: step.started\nda").is_empty());
        assert!(decoder.has_pending());

        let frames = decoder.push("ta: {}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{}");
    }

    #[test]
    fn test_encode_frame_splits_multiline_data() {
        assert_eq!(encode_frame("x", "a\nb"), "event: x\ndata: a\ndata: b\n\n");
    }
}
