//! Core protocol types for Testpulse's wire format.
//!
//! Every frame in either direction is one JSON document shaped as
//! `{"type": <string>, "payload": <object>}`. The `type` tag selects the
//! schema of `payload`.
//!
//! Client → server messages are modelled as the closed enum
//! [`ClientMessage`]; server → client messages as [`ServerMessage`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// Wire tags for every message kind.
pub mod kind {
    /// Client → server: log in with username and password.
    pub const AUTH: &str = "auth";
    /// Client → server: ask for a fresh analytics snapshot.
    pub const REQUEST_ANALYTICS: &str = "request_analytics";
    /// Client → server: ask for the authenticated user's profile.
    pub const REQUEST_USER_DATA: &str = "request_user_data";
    /// Server → client: result of a successful `auth`.
    pub const AUTH_RESPONSE: &str = "auth_response";
    /// Server → client: analytics snapshot (requested or pushed).
    pub const ANALYTICS: &str = "analytics";
    /// Server → client: user profile.
    pub const USER_DATA: &str = "user_data";
    /// Server → client: any recoverable failure.
    pub const ERROR: &str = "error";
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A user's primary key in the store.
///
/// Newtype so a user id can't be confused with a device or test id.
/// `#[serde(transparent)]` keeps it a plain number on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The untyped wrapper every frame is decoded into first.
///
/// A missing `payload` becomes `null`, which is fine for message kinds
/// whose payload is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The message kind, e.g. `"auth"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Kind-specific body.
    #[serde(default)]
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Payload of an `auth` message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

// Never print the password, not even in debug logs.
impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Payload of a `request_analytics` message. Usually absent.
///
/// `token` is only consulted when the server requires a token for
/// analytics requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl AnalyticsRequest {
    /// Never fails: the payload is ignored apart from `token`. A token that
    /// isn't a string is kept in its JSON form so validation rejects it.
    pub fn from_payload(payload: &Value) -> Self {
        let token = payload
            .get("token")
            .filter(|token| !token.is_null())
            .map(|token| match token.as_str() {
                Some(text) => text.to_owned(),
                None => token.to_string(),
            });
        Self { token }
    }
}

/// Payload of a `request_user_data` message.
///
/// Without a token, the session's authenticated user is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Every message a client may send.
///
/// Serializes in the adjacently tagged wire shape
/// (`{"type": "...", "payload": {...}}`); decoding goes through
/// [`Envelope`] so each failure mode gets its own [`ProtocolError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth(AuthRequest),
    RequestAnalytics(AnalyticsRequest),
    RequestUserData(UserDataRequest),
}

impl ClientMessage {
    /// The wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => kind::AUTH,
            Self::RequestAnalytics(_) => kind::REQUEST_ANALYTICS,
            Self::RequestUserData(_) => kind::REQUEST_USER_DATA,
        }
    }
}

impl TryFrom<Envelope> for ClientMessage {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        match envelope.kind.as_str() {
            kind::AUTH => payload(kind::AUTH, envelope.payload).map(Self::Auth),
            kind::REQUEST_ANALYTICS => Ok(Self::RequestAnalytics(
                AnalyticsRequest::from_payload(&envelope.payload),
            )),
            kind::REQUEST_USER_DATA => {
                optional_payload(kind::REQUEST_USER_DATA, envelope.payload)
                    .map(Self::RequestUserData)
            }
            _ => Err(ProtocolError::UnknownType(envelope.kind)),
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    value: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(value)
        .map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Like [`payload`], but `null`/absent means "all defaults".
fn optional_payload<T: serde::de::DeserializeOwned + Default>(
    kind: &'static str,
    value: Value,
) -> Result<T, ProtocolError> {
    if value.is_null() {
        Ok(T::default())
    } else {
        payload(kind, value)
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Outcome marker carried inside auth and error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Payload of `auth_response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Aggregate test/device counts. Computed fresh for every request and
/// every push, never cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analytics {
    pub total_tests: u64,
    pub passed: u64,
    pub failed: u64,
    pub devices_online: u64,
}

/// Payload of `user_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub id: UserId,
    pub username: String,
    /// Empty when the user has no team.
    pub team_name: String,
    /// Empty when the user has no avatar.
    pub avatar_url: String,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub status: Status,
    pub message: String,
}

/// Every message the server may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthResponse(AuthResponse),
    Analytics(Analytics),
    UserData(UserData),
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Builds an `error` envelope with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            status: Status::Error,
            message: message.into(),
        })
    }

    /// Builds the `auth_response` sent after a successful login.
    pub fn authenticated(token: String) -> Self {
        Self::AuthResponse(AuthResponse {
            status: Status::Success,
            message: "authenticated".to_string(),
            token: Some(token),
        })
    }

    /// The wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthResponse(_) => kind::AUTH_RESPONSE,
            Self::Analytics(_) => kind::ANALYTICS,
            Self::UserData(_) => kind::USER_DATA,
            Self::Error(_) => kind::ERROR,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
