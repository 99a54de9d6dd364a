//! Authentication for Testpulse.
//!
//! - [`CredentialVerifier`]: bcrypt hash/verify on the blocking pool.
//! - [`TokenIssuer`]: HS256 tokens carrying `{user_id, iat, exp}`.
//! - [`Authenticator`]: the seam the session engine calls, implemented
//!   by [`PasswordAuthenticator`] over any [`UserStore`](testpulse_store::UserStore).
//!
//! Plaintext passwords and tokens never reach a log line.

mod credentials;
mod error;
mod login;
mod token;

use std::future::Future;

pub use credentials::CredentialVerifier;
pub use error::AuthError;
pub use login::PasswordAuthenticator;
pub use testpulse_protocol::UserId;
pub use token::{unix_now, Claims, TokenIssuer, DEFAULT_TOKEN_TTL};

/// A successful login.
#[derive(Clone, PartialEq, Eq)]
pub struct Login {
    pub user_id: UserId,
    pub token: String,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Logs users in and checks their tokens.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// session on the server.
///
/// # Example
///
/// ```rust
/// use testpulse_auth::{AuthError, Authenticator, Login, UserId};
///
/// /// Lets anyone named "dev" in. Local testing only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn login(&self, username: &str, _password: &str) -> Result<Login, AuthError> {
///         if username == "dev" {
///             Ok(Login { user_id: UserId(1), token: "dev".into() })
///         } else {
///             Err(AuthError::InvalidCredentials)
///         }
///     }
///
///     fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
///         if token == "dev" {
///             Ok(UserId(1))
///         } else {
///             Err(AuthError::MalformedToken("not a dev token".into()))
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Checks a username/password pair and issues a token.
    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<Login, AuthError>> + Send;

    /// Validates a previously issued token.
    fn verify_token(&self, token: &str) -> Result<UserId, AuthError>;
}
