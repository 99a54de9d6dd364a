//! bcrypt hashing and verification.
//!
//! bcrypt is deliberately slow, so both operations run on Tokio's
//! blocking pool instead of stalling a runtime worker.

use tracing::warn;

use crate::AuthError;

/// Hashes and checks passwords with bcrypt at a fixed cost.
#[derive(Debug, Clone, Copy)]
pub struct CredentialVerifier {
    cost: u32,
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl CredentialVerifier {
    /// `cost` is clamped to bcrypt's valid range (4..=31).
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(4, 31),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Produces a salted bcrypt hash of `password`.
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || {
            bcrypt::hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
        })
        .await
        .map_err(|e| AuthError::Hashing(format!("hashing task failed: {e}")))?
    }

    /// Returns `true` iff `candidate` matches `stored_hash`.
    ///
    /// A stored hash bcrypt can't parse counts as a mismatch. It is
    /// logged, but the candidate never is.
    pub async fn verify(&self, stored_hash: &str, candidate: &str) -> bool {
        let stored_hash = stored_hash.to_owned();
        let candidate = candidate.to_owned();
        match tokio::task::spawn_blocking(move || bcrypt::verify(candidate, &stored_hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                warn!(error = %e, "stored password hash is not valid bcrypt");
                false
            }
            Err(e) => {
                warn!(error = %e, "password verification task failed");
                false
            }
        }
    }
}
