//! Wire protocol for Testpulse.
//!
//! This crate defines the "language" that clients and the server speak
//! over a session:
//!
//! - **Types** ([`Envelope`], [`ClientMessage`], [`ServerMessage`], and
//!   their payloads): the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the session
//! engine (dispatch). It doesn't know about connections or the database;
//! it only serializes and deserializes messages.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope → ClientMessage) → Session (dispatch)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    kind, Analytics, AnalyticsRequest, AuthRequest, AuthResponse, ClientMessage,
    Envelope, ErrorPayload, ServerMessage, Status, UserData, UserDataRequest,
    UserId,
};
