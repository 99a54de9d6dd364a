//! Session protocol engine for Testpulse.
//!
//! A [`Session`] owns one client connection from accept to close. It
//! multiplexes three things over that single connection:
//!
//! - request/response traffic (`auth`, `request_analytics`,
//!   `request_user_data`), where every inbound frame gets exactly one
//!   reply;
//! - periodic analytics pushes from a timer;
//! - error envelopes for anything that goes wrong in between.
//!
//! Only a broken transport ends a session. Bad frames, failed logins, and
//! store outages are answered with an `error` envelope and the session
//! keeps reading.

mod config;
mod error;
mod outbox;
mod session;

pub use config::{AuthPolicy, PushScope, SessionConfig};
pub use error::{BoxError, RequestError, SessionError};
pub use outbox::{spawn_writer, Outbox};
pub use session::Session;
