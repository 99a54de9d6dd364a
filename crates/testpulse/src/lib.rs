//! # Testpulse
//!
//! Real-time test analytics over WebSocket.
//!
//! Clients connect to `/ws`, log in with `auth`, and get an analytics
//! snapshot (total, passed and failed tests plus online devices) on
//! request and on a fixed push interval. This crate wires the layers
//! into a runnable server:
//!
//! - [`testpulse_transport`]: WebSocket listener and connections
//! - [`testpulse_protocol`]: the JSON envelope and message types
//! - [`testpulse_store`]: MySQL-backed users and analytics
//! - [`testpulse_auth`]: bcrypt credentials and HS256 tokens
//! - [`testpulse_session`]: the per-connection protocol engine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use testpulse::prelude::*;
//!
//! # async fn run() -> Result<(), TestpulseError> {
//! let config = ServerConfig::load(None)?;
//! let store = Arc::new(
//!     MySqlStore::connect(&config.store.database_url, &config.store.pool_options()).await?,
//! );
//! let auth = PasswordAuthenticator::new(
//!     Arc::clone(&store),
//!     CredentialVerifier::new(config.auth.bcrypt_cost),
//!     TokenIssuer::new(config.auth.jwt_secret.as_bytes(), config.auth.token_ttl()),
//! )
//! .await?;
//! let server = TestpulseServerBuilder::from_config(&config)
//!     .build(auth, store)
//!     .await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod config;
mod error;
pub mod health;
pub mod logging;
mod server;

pub use error::TestpulseError;
pub use server::{TestpulseServer, TestpulseServerBuilder};

pub use testpulse_auth;
pub use testpulse_protocol;
pub use testpulse_session;
pub use testpulse_store;
pub use testpulse_transport;

/// The types most servers and tests need.
pub mod prelude {
    pub use crate::config::ServerConfig;
    pub use crate::{TestpulseError, TestpulseServer, TestpulseServerBuilder};
    pub use testpulse_auth::{
        AuthError, Authenticator, CredentialVerifier, Login, PasswordAuthenticator, TokenIssuer,
    };
    pub use testpulse_protocol::{Analytics, ClientMessage, ServerMessage, UserData, UserId};
    pub use testpulse_session::{AuthPolicy, PushScope, SessionConfig};
    pub use testpulse_store::{
        AnalyticsReader, MemoryStore, MySqlStore, MySqlStoreOptions, StoreError, TestOutcome,
        UserStore,
    };
}
