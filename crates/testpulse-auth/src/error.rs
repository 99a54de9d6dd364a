//! Error types for the auth layer.

use testpulse_store::StoreError;

/// Everything that can go wrong while logging in or checking a token.
///
/// Each variant maps to exactly one client-facing message via
/// [`AuthError::client_message`]; the `Display` text is for logs.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown user or wrong password, reported without saying which.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No user with that name. Only produced when distinct errors are on.
    #[error("user not found")]
    UserNotFound,

    /// The password didn't match. Only produced when distinct errors are on.
    #[error("invalid password")]
    InvalidPassword,

    /// The request needs a token and none was supplied.
    #[error("authentication required")]
    Unauthenticated,

    /// The token's `exp` is in the past.
    #[error("token expired")]
    TokenExpired,

    /// The token was not signed with this server's secret.
    #[error("token signature mismatch")]
    InvalidSignature,

    /// The token isn't a well-formed HS256 JWT with our claims.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Signing a fresh token failed.
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// bcrypt couldn't produce a hash.
    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// The user store couldn't be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// The message sent to the client in an `error` envelope.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid username or password",
            Self::UserNotFound => "user not found",
            Self::InvalidPassword => "invalid password",
            Self::Unauthenticated => "authentication required",
            Self::TokenExpired => "token expired",
            Self::InvalidSignature | Self::MalformedToken(_) => "invalid token",
            Self::Signing(_) | Self::Hashing(_) => "failed to generate token",
            Self::Store(_) => "store unavailable",
        }
    }

    /// `true` for failures caused by the client's input rather than by
    /// the server.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Signing(_) | Self::Hashing(_) | Self::Store(_))
    }
}
