use serde_json::Value;
use tracing::trace;

use crate::events::ExecEvent;

/// Incremental decoder for newline-delimited JSON output.
///
/// Partial lines are buffered as raw bytes so a multi-byte character split
/// across two reads is reassembled before decoding.
#[derive(Debug, Default)]
pub struct JsonLineDecoder {
    buffer: Vec<u8>,
}

impl JsonLineDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ExecEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..].iter().position(|byte| *byte == b'\n') {
            let end = consumed + offset;
            if let Some(event) = decode_line(&self.buffer[consumed..end]) {
                events.push(event);
            }
            consumed = end + 1;
        }

        self.buffer.drain(..consumed);
        events
    }

    /// Gives a trailing unterminated line one last decode attempt and clears the buffer.
    pub fn finish(&mut self) -> Option<ExecEvent> {
        let remainder = std::mem::take(&mut self.buffer);
        decode_line(&remainder)
    }

    /// Decode a complete payload in one shot, including an unterminated last line.
    pub fn parse_lines(input: &str) -> Vec<ExecEvent> {
        let mut decoder = Self::default();
        let mut events = decoder.feed(input.as_bytes());
        events.extend(decoder.finish());
        events
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn decode_line(line: &[u8]) -> Option<ExecEvent> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(line) {
        Ok(value) => ExecEvent::from_value(value),
        Err(error) => {
            trace!(%error, len = line.len(), "dropping malformed exec output line");
            None
        }
    }
}
