//! Per-session settings shared by every connection on a server.

use std::time::Duration;

use serde::Deserialize;

/// Whether analytics require a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// Analytics are served to anyone connected; pushes start at once.
    #[default]
    Advisory,
    /// `request_analytics` must carry a valid `payload.token`, and pushes
    /// wait until the session has authenticated.
    RequireToken,
}

/// Which snapshot the push loop sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushScope {
    /// Counts over every test.
    #[default]
    Global,
    /// Counts over the authenticated user's tests; global until the
    /// session authenticates.
    User,
}

/// Session behavior knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time between unsolicited analytics pushes. Zero disables pushes.
    pub push_interval: Duration,
    /// Upper bound of the random delay before the first push.
    pub push_jitter: Duration,
    pub auth_policy: AuthPolicy,
    pub push_scope: PushScope,
    /// Outbound messages that may queue for the writer before producers
    /// wait.
    pub outbox_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            push_interval: Duration::from_secs(5),
            push_jitter: Duration::from_millis(250),
            auth_policy: AuthPolicy::default(),
            push_scope: PushScope::default(),
            outbox_capacity: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        policy: AuthPolicy,
        scope: PushScope,
    }

    #[test]
    fn test_policy_names_are_snake_case() {
        let w: Wrapper =
            serde_json::from_str(r#"{"policy":"require_token","scope":"user"}"#).unwrap();
        assert_eq!(w.policy, AuthPolicy::RequireToken);
        assert_eq!(w.scope, PushScope::User);
    }

    #[test]
    fn test_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.push_interval, Duration::from_secs(5));
        assert_eq!(cfg.auth_policy, AuthPolicy::Advisory);
        assert_eq!(cfg.push_scope, PushScope::Global);
        assert!(cfg.outbox_capacity > 0);
    }
}
