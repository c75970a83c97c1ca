//! Frame codec: one inbound websocket payload -> one [`Event`].
//!
//! Decoding is pure and never panics. Callers drop frames that fail to
//! decode; a bad frame must not end the receive loop.

use thiserror::Error;

use crate::types::Event;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not JSON, not UTF-8, missing the discriminant, or a body that does
    /// not match its kind.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Well-formed envelope with a `type` this client does not know.
    #[error("unknown frame kind: {0:?}")]
    UnknownKind(String),
}

/// Decode a text frame.
pub fn decode(text: &str) -> Result<Event, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| DecodeError::Malformed("missing string field `type`".into()))?;

    if !Event::KINDS.contains(&kind) {
        return Err(DecodeError::UnknownKind(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))
}

/// Decode a binary frame carrying UTF-8 JSON.
pub fn decode_bytes(bytes: &[u8]) -> Result<Event, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DecodeError::Malformed(format!("invalid utf-8: {e}")))?;
    decode(text)
}

/// Encode an event in the same adjacently tagged shape [`decode`] accepts.
pub fn encode(event: &Event) -> String {
    // Every field is a plain string, integer, bool or nested struct of
    // those, so serialization cannot fail.
    serde_json::to_string(event).unwrap_or_default()
}
