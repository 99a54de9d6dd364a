//! HS256 identity tokens.
//!
//! A token carries `{user_id, iat, exp}` and nothing else. Nothing is
//! stored server-side; a token is valid exactly while its signature
//! checks out and `now < exp`.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use testpulse_protocol::UserId;

use crate::AuthError;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The claims embedded in every token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    /// Issued at, seconds since the Unix epoch.
    pub iat: u64,
    /// Expires at, seconds since the Unix epoch.
    pub exp: u64,
}

/// Signs and validates tokens with one process-wide secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Current wall-clock time in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand against an explicit clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `user` valid from now for the configured TTL.
    pub fn issue(&self, user: UserId) -> Result<String, AuthError> {
        self.issue_at(user, unix_now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, user: UserId, now: u64) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: user.0,
            iat: now,
            exp: now.saturating_add(self.ttl.as_secs()),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::Signing)
    }

    /// Checks signature and expiry; returns the embedded user id.
    pub fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        self.validate_at(token, unix_now())
    }

    /// Like [`validate`](Self::validate) with an explicit clock.
    ///
    /// Zero leeway: a token stops being valid at the second `exp`.
    pub fn validate_at(&self, token: &str, now: u64) -> Result<UserId, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken(e.to_string()),
            })?;

        if now >= data.claims.exp {
            return Err(AuthError::TokenExpired);
        }
        Ok(UserId(data.claims.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-secret", DEFAULT_TOKEN_TTL)
    }

    #[test]
    fn test_issue_then_validate_returns_user() {
        let tokens = issuer();
        let token = tokens.issue_at(UserId(42), NOW).unwrap();
        assert_eq!(tokens.validate_at(&token, NOW + 60).unwrap(), UserId(42));
    }

    #[test]
    fn test_token_expires_after_ttl() {
        let tokens = issuer();
        let token = tokens.issue_at(UserId(42), NOW).unwrap();
        let day = DEFAULT_TOKEN_TTL.as_secs();

        assert!(tokens.validate_at(&token, NOW + day - 1).is_ok());
        assert!(matches!(
            tokens.validate_at(&token, NOW + day),
            Err(AuthError::TokenExpired)
        ));
        assert!(matches!(
            tokens.validate_at(&token, NOW + day + 1),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let token = issuer().issue_at(UserId(1), NOW).unwrap();
        let other = TokenIssuer::new(b"another-secret", DEFAULT_TOKEN_TTL);
        assert!(matches!(
            other.validate_at(&token, NOW),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            issuer().validate_at("not.a.jwt", NOW),
            Err(AuthError::MalformedToken(_))
        ));
        assert!(matches!(
            issuer().validate_at("", NOW),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_claims_carry_iat_and_exp() {
        let tokens = issuer();
        let token = tokens.issue_at(UserId(9), NOW).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = jsonwebtoken::decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .unwrap();
        assert_eq!(
            data.claims,
            Claims {
                user_id: 9,
                iat: NOW,
                exp: NOW + DEFAULT_TOKEN_TTL.as_secs()
            }
        );
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        assert!(!format!("{:?}", issuer()).contains("test-secret"));
    }
}
