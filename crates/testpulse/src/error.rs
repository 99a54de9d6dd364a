//! Unified error type for the Testpulse server.

use testpulse_auth::AuthError;
use testpulse_session::SessionError;
use testpulse_store::StoreError;
use testpulse_transport::TransportError;

use crate::config::ConfigError;
use crate::logging::LogError;

/// Top-level error that wraps the errors of every layer.
///
/// Everything here is fatal to the process: the server only returns it
/// from startup or from its accept loop. Per-request failures never get
/// this far; sessions answer them with an `error` envelope.
#[derive(Debug, thiserror::Error)]
pub enum TestpulseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LogError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
