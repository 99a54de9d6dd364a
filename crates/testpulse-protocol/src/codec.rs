//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The session engine doesn't care how messages are serialized. It just
//! needs something that implements the [`Codec`] trait.

use serde::{de::DeserializeOwned, Serialize};

use crate::{ClientMessage, Envelope, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → safe to share between the read loop, the push loop
///   and the writer task of a session.
/// - `'static` → the codec owns everything it needs, so it can live in
///   long-lived async tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes one client frame: first the [`Envelope`], then the typed
    /// payload selected by its `type` tag.
    ///
    /// A frame that isn't an envelope at all is [`ProtocolError::Decode`].
    /// An unknown tag is [`ProtocolError::UnknownType`]; a known tag with a
    /// bad payload is [`ProtocolError::InvalidPayload`].
    fn decode_client(&self, data: &[u8]) -> Result<ClientMessage, ProtocolError> {
        let envelope: Envelope = self.decode(data)?;
        ClientMessage::try_from(envelope)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is the only format clients speak today; every frame is one
/// complete JSON document.
///
/// ## Example
///
/// ```rust
/// use testpulse_protocol::{Analytics, ClientMessage, Codec, JsonCodec, ServerMessage};
///
/// let codec = JsonCodec;
///
/// let msg = codec
///     .decode_client(br#"{"type":"request_analytics"}"#)
///     .unwrap();
/// assert!(matches!(msg, ClientMessage::RequestAnalytics(_)));
///
/// let bytes = codec
///     .encode(&ServerMessage::Analytics(Analytics::default()))
///     .unwrap();
/// let text = String::from_utf8(bytes).unwrap();
/// assert!(text.starts_with(r#"{"type":"analytics""#));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
