//! NUL-delimited packet framing and path-based JSON field access.
//!
//! Frames are split on the NUL byte (0x00), a record terminator rather than
//! a field separator. Each frame is expected to be a JSON object with a
//! string `type` field; anything else is a malformed frame. Field access
//! uses dotted paths directly over the parsed `serde_json::Value` so a
//! single parse per frame serves every lookup a dispatch needs, instead of
//! re-walking or re-serializing the document per field.

use crate::error::CodecError;
use serde_json::Value;

/// Incrementally splits an inbound byte stream on NUL bytes.
///
/// Mirrors a `bufio.SplitFunc`: bytes are pushed in as they arrive off the
/// socket, and complete frames are popped off in order. Unterminated bytes
/// left over when the stream ends form one final frame, but only if
/// non-empty.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buf: Vec<u8>,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete frame (bytes before the next NUL), if any.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|&b| b == 0)?;
        let frame: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(frame[..frame.len() - 1].to_vec())
    }

    /// Called at EOF: returns any unterminated trailing bytes as a final
    /// frame, provided they are non-empty.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// A parsed inbound frame: the original bytes (kept for forwarding without
/// re-serializing) and the parsed JSON tree (used for field lookups).
#[derive(Debug, Clone)]
pub struct Packet {
    pub raw: String,
    pub value: Value,
}

impl Packet {
    /// Parses and validates one frame: must be valid JSON, and must carry
    /// a string `type` field.
    pub fn parse(frame: &[u8]) -> Result<Self, CodecError> {
        let raw = String::from_utf8_lossy(frame).into_owned();
        let value: Value = serde_json::from_str(&raw)?;
        if !matches!(value.get("type"), Some(Value::String(_))) {
            return Err(CodecError::MissingType);
        }
        Ok(Self { raw, value })
    }

    pub fn packet_type(&self) -> &str {
        // `parse` already guaranteed `type` is present and a string.
        self.value.get("type").and_then(Value::as_str).unwrap_or("")
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        get_path(&self.value, path)?.as_str()
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        get_path(&self.value, path)?.as_u64()
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        get_path(&self.value, path)?.as_bool()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.value, path)
    }
}

/// Resolves a dotted path (`"state.teamId"`) against nested JSON objects.
/// Missing intermediate fields resolve to `None` rather than erroring.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Encodes an outbound packet: JSON text followed by a single NUL.
pub fn encode_frame(value: &Value) -> Vec<u8> {
    let mut bytes = serde_json::to_vec(value).unwrap_or_default();
    bytes.push(0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_multiple_frames_in_one_push() {
        let mut splitter = FrameSplitter::new();
        splitter.push(b"{\"type\":\"A\"}\x00{\"type\":\"B\"}\x00");

        assert_eq!(splitter.next_frame().unwrap(), b"{\"type\":\"A\"}");
        assert_eq!(splitter.next_frame().unwrap(), b"{\"type\":\"B\"}");
        assert!(splitter.next_frame().is_none());
    }

    #[test]
    fn reassembles_a_frame_split_across_pushes() {
        let mut splitter = FrameSplitter::new();
        splitter.push(b"{\"type\":\"A");
        assert!(splitter.next_frame().is_none());
        splitter.push(b"\"}\x00");
        assert_eq!(splitter.next_frame().unwrap(), b"{\"type\":\"A\"}");
    }

    #[test]
    fn trailing_bytes_at_eof_form_a_final_frame() {
        let mut splitter = FrameSplitter::new();
        splitter.push(b"{\"type\":\"A\"}");
        assert!(splitter.next_frame().is_none());
        assert_eq!(splitter.finish().unwrap(), b"{\"type\":\"A\"}");
    }

    #[test]
    fn empty_trailing_buffer_yields_no_final_frame() {
        let mut splitter = FrameSplitter::new();
        splitter.push(b"{\"type\":\"A\"}\x00");
        splitter.next_frame();
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Packet::parse(b"{bad}").is_err());
    }

    #[test]
    fn rejects_missing_type_field() {
        assert!(Packet::parse(b"{\"clientId\":1}").is_err());
    }

    #[test]
    fn dotted_path_reads_nested_fields() {
        let packet = Packet::parse(br#"{"type":"UPDATE_CLIENT_STATE","state":{"teamId":"T1"}}"#)
            .unwrap();
        assert_eq!(packet.get_str("state.teamId"), Some("T1"));
        assert_eq!(packet.get_str("state.missing"), None);
        assert_eq!(packet.get_str("missing.path"), None);
    }

    #[test]
    fn encode_frame_round_trips() {
        let value = json!({"type": "HEARTBEAT", "quiet": true});
        let bytes = encode_frame(&value);
        assert_eq!(*bytes.last().unwrap(), 0);
        let without_nul = &bytes[..bytes.len() - 1];
        let decoded: Value = serde_json::from_slice(without_nul).unwrap();
        assert_eq!(decoded, value);
    }
}
