//! Error types for the session layer.
//!
//! Two kinds of failure exist inside a session:
//!
//! - [`RequestError`]: one request went wrong. The client gets an `error`
//!   envelope and the session carries on.
//! - [`SessionError`]: the connection itself is broken. The session ends.

use testpulse_auth::AuthError;
use testpulse_protocol::{kind, ProtocolError};
use testpulse_store::StoreError;

/// Boxed transport error, so the session stays generic over the
/// connection type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failed request. Never fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The frame couldn't be decoded into a client message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Login or token validation failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The analytics snapshot couldn't be read.
    #[error("analytics query failed: {0}")]
    Analytics(#[source] StoreError),

    /// The profile lookup failed.
    #[error("user data query failed: {0}")]
    UserData(#[source] StoreError),

    /// The token or session refers to a user that no longer exists.
    #[error("user not found")]
    UserNotFound,
}

impl RequestError {
    /// The text sent back in the `error` envelope.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Protocol(e) => match e {
                ProtocolError::Decode(_) => "invalid message format",
                ProtocolError::UnknownType(_) => "unknown message type",
                ProtocolError::InvalidPayload { kind: kind::AUTH, .. } => "invalid auth request",
                ProtocolError::InvalidPayload { .. } => "invalid user data request",
                ProtocolError::Encode(_) => "internal error",
            },
            Self::Auth(e) => e.client_message(),
            Self::Analytics(_) => "analytics unavailable",
            Self::UserData(_) | Self::UserNotFound => "failed to get user data",
        }
    }

    /// `true` when the server, not the client, is at fault. Those are
    /// logged at `warn`; client mistakes only at `debug`.
    pub fn is_server_fault(&self) -> bool {
        match self {
            Self::Protocol(e) => !e.is_client_fault(),
            Self::Auth(e) => !e.is_rejection(),
            Self::Analytics(_) | Self::UserData(_) => true,
            Self::UserNotFound => false,
        }
    }
}

/// A failure that ends the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading from or writing to the connection failed.
    #[error("transport failed: {0}")]
    Transport(#[source] BoxError),

    /// One of the session's tasks panicked.
    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
