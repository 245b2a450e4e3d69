//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec converts between message types and frame bodies. Servers are
//! generic over [`Codec`], so the wire encoding can change without
//! touching connection handling. [`JsonCodec`] produces compact UTF-8
//! JSON, which is what every Parlor peer speaks today.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task of a server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame body.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a frame body.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do not
    /// match the expected type (including unknown message tags).
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses compact JSON (via `serde_json`).
///
/// ```rust
/// use parlor_protocol::{Codec, JsonCodec, LobbyRequest};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&LobbyRequest::Ping).unwrap();
/// assert_eq!(bytes, br#"{"type":"Ping"}"#);
///
/// let decoded: LobbyRequest = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, LobbyRequest::Ping);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
