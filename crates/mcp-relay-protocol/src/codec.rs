//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The relay only ever needs to turn a value into one frame's worth of
//! bytes and back. Framing itself (where one message ends) belongs to
//! the transport, so a codec must never emit a raw newline.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec lives in state shared by
/// the accept loop, every connection task, and the dispatcher.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type.
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
/// Compact output escapes every newline inside strings, which is what
/// lets the transport use `\n` as the frame delimiter.
///
/// ## Example
///
/// ```rust
/// use mcp_relay_protocol::{Codec, JsonCodec, Message};
///
/// let codec = JsonCodec;
/// let message = Message::chat("hello", true);
///
/// let bytes = codec.encode(&message).unwrap();
/// assert!(!bytes.contains(&b'\n'));
///
/// let decoded: Message = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded.content, "hello");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
