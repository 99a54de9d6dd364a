//! Error types for the protocol layer.
//!
//! Each crate in Testpulse defines its own error enum. When you see a
//! `ProtocolError`, the problem is in serialization/deserialization of a
//! frame, not in networking, authentication, or storage.

/// Errors that can occur in the protocol layer.
///
/// Every variant except [`ProtocolError::Encode`] describes a bad frame
/// from the client. The session answers those with an error envelope and
/// keeps reading.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not a valid envelope: malformed JSON, not an object,
    /// or a missing/non-string `type`.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope parsed, but its `type` is not one the server handles.
    #[error("unknown message type: {0:?}")]
    UnknownType(String),

    /// The `type` is known but its `payload` doesn't match the schema
    /// for that type.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// The wire tag whose payload failed to decode.
        kind: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Returns `true` if the error came from a bad client frame rather
    /// than from encoding a server message.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }
}
