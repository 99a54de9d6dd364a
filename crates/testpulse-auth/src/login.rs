//! Username/password login backed by a [`UserStore`].

use std::sync::Arc;

use testpulse_protocol::UserId;
use testpulse_store::UserStore;
use tracing::{debug, info};

use crate::{AuthError, Authenticator, CredentialVerifier, Login, TokenIssuer};

/// Hashed when the authenticator is built and verified against when the
/// username doesn't exist, so unknown users cost one bcrypt round like
/// real ones.
const DUMMY_PASSWORD: &str = "testpulse-dummy-password";

/// The production [`Authenticator`]: looks the user up, checks the bcrypt
/// hash, and signs a token.
pub struct PasswordAuthenticator<U> {
    users: Arc<U>,
    verifier: CredentialVerifier,
    tokens: TokenIssuer,
    distinct_errors: bool,
    dummy_hash: String,
}

impl<U: UserStore> PasswordAuthenticator<U> {
    /// Fails only if the dummy hash for unknown usernames can't be built.
    pub async fn new(
        users: Arc<U>,
        verifier: CredentialVerifier,
        tokens: TokenIssuer,
    ) -> Result<Self, AuthError> {
        let dummy_hash = verifier.hash(DUMMY_PASSWORD).await?;
        Ok(Self {
            users,
            verifier,
            tokens,
            distinct_errors: false,
            dummy_hash,
        })
    }

    /// Report "user not found" and "invalid password" separately instead
    /// of one combined message.
    pub fn with_distinct_errors(mut self, distinct: bool) -> Self {
        self.distinct_errors = distinct;
        self
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    async fn burn_dummy_verify(&self, candidate: &str) {
        let _ = self.verifier.verify(&self.dummy_hash, candidate).await;
    }

    fn reject(&self, distinct: AuthError) -> AuthError {
        if self.distinct_errors {
            distinct
        } else {
            AuthError::InvalidCredentials
        }
    }
}

impl<U: UserStore> Authenticator for PasswordAuthenticator<U> {
    async fn login(&self, username: &str, password: &str) -> Result<Login, AuthError> {
        let Some(user) = self.users.find_by_username(username).await? else {
            self.burn_dummy_verify(password).await;
            debug!(username, "login rejected: unknown user");
            return Err(self.reject(AuthError::UserNotFound));
        };

        if !self.verifier.verify(&user.password_hash, password).await {
            debug!(user_id = %user.id, "login rejected: password mismatch");
            return Err(self.reject(AuthError::InvalidPassword));
        }

        let token = self.tokens.issue(user.id)?;
        info!(user_id = %user.id, "user authenticated");
        Ok(Login {
            user_id: user.id,
            token,
        })
    }

    fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        self.tokens.validate(token)
    }
}
