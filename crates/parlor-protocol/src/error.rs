//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, an unknown `type` tag,
    /// missing fields, or wrong field types.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but is not valid where it arrived, e.g. a
    /// `SubmitAction` before the handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The process handoff context is missing or inconsistent.
    #[error("invalid handoff context: {0}")]
    InvalidHandoff(String),
}
