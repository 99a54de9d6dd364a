//! Server configuration.
//!
//! Loaded in three layers, later ones winning:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file (`--config path/to/testpulse.toml`),
//! 3. `TESTPULSE_*` environment variables.
//!
//! The result is checked with [`ServerConfig::validate`] before anything
//! binds or connects.
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:8080"
//! health_addr = "0.0.0.0:8081"
//!
//! [store]
//! database_url = "mysql://testpulse:secret@db:3306/testpulse"
//!
//! [auth]
//! jwt_secret = "change-me"
//!
//! [session]
//! push_interval_secs = 5
//! auth_policy = "advisory"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use testpulse_session::{AuthPolicy, PushScope, SessionConfig};
use testpulse_store::MySqlStoreOptions;
use testpulse_transport::WebSocketConfig;

use crate::logging::LogFormat;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration, one field per TOML section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub auth: AuthSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

/// `[server]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// WebSocket listener.
    pub bind_addr: String,
    /// Plain-HTTP liveness endpoint listener. Omit to disable.
    pub health_addr: Option<String>,
    /// The only path that accepts WebSocket upgrades.
    pub ws_path: String,
    /// Concurrent sessions; connections beyond this are closed.
    pub max_sessions: usize,
    pub handshake_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            health_addr: Some("0.0.0.0:8081".into()),
            ws_path: "/ws".into(),
            max_sessions: 1024,
            handshake_timeout_secs: 10,
        }
    }
}

/// `[store]`
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Create missing tables at startup.
    pub create_schema: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_url: "mysql://root@localhost:3306/testpulse".into(),
            max_connections: 10,
            acquire_timeout_secs: 5,
            create_schema: true,
        }
    }
}

// The URL may embed a password.
impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("database_url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("create_schema", &self.create_schema)
            .finish()
    }
}

impl StoreSettings {
    pub fn pool_options(&self) -> MySqlStoreOptions {
        MySqlStoreOptions {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }
}

/// `[auth]`
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSettings {
    /// HS256 signing secret. Required.
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub bcrypt_cost: u32,
    /// Tell clients whether the user or the password was wrong.
    pub distinct_errors: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 24 * 60 * 60,
            bcrypt_cost: 12,
            distinct_errors: false,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("distinct_errors", &self.distinct_errors)
            .finish()
    }
}

impl AuthSettings {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

/// `[session]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    pub push_interval_secs: u64,
    pub push_jitter_ms: u64,
    pub auth_policy: AuthPolicy,
    pub push_scope: PushScope,
    pub outbox_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            push_interval_secs: defaults.push_interval.as_secs(),
            push_jitter_ms: defaults.push_jitter.as_millis() as u64,
            auth_policy: defaults.auth_policy,
            push_scope: defaults.push_scope,
            outbox_capacity: defaults.outbox_capacity,
        }
    }
}

impl SessionSettings {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            push_interval: Duration::from_secs(self.push_interval_secs),
            push_jitter: Duration::from_millis(self.push_jitter_ms),
            auth_policy: self.auth_policy,
            push_scope: self.push_scope,
            outbox_capacity: self.outbox_capacity,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive such as `info` or `testpulse=debug,sqlx=warn`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

impl ServerConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `TESTPULSE_*` overrides, reading variables through `lookup`
    /// so tests don't have to touch the real environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TESTPULSE_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("TESTPULSE_HEALTH_ADDR") {
            // An empty value turns the endpoint off.
            self.server.health_addr = (!v.is_empty()).then_some(v);
        }
        if let Some(v) = lookup("TESTPULSE_DATABASE_URL") {
            self.store.database_url = v;
        }
        if let Some(v) = lookup("TESTPULSE_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = lookup("TESTPULSE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("TESTPULSE_LOG_FORMAT") {
            self.logging.format = match v.to_ascii_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                _ => return Err(invalid_env("TESTPULSE_LOG_FORMAT", v)),
            };
        }
        if let Some(v) = lookup("TESTPULSE_PUSH_INTERVAL_SECS") {
            self.session.push_interval_secs = v
                .trim()
                .parse()
                .map_err(|_| invalid_env("TESTPULSE_PUSH_INTERVAL_SECS", v))?;
        }
        if let Some(v) = lookup("TESTPULSE_AUTH_POLICY") {
            self.session.auth_policy = match v.to_ascii_lowercase().as_str() {
                "advisory" => AuthPolicy::Advisory,
                "require_token" => AuthPolicy::RequireToken,
                _ => return Err(invalid_env("TESTPULSE_AUTH_POLICY", v)),
            };
        }
        Ok(())
    }

    /// Rejects configurations the server can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.len() < 16 {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be set and at least 16 bytes long".into(),
            ));
        }
        if self.auth.token_ttl_secs == 0 {
            return Err(ConfigError::Invalid("auth.token_ttl_secs must be > 0".into()));
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(ConfigError::Invalid(format!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            )));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.ws_path must start with '/', got {:?}",
                self.server.ws_path
            )));
        }
        if self.server.max_sessions == 0 {
            return Err(ConfigError::Invalid("server.max_sessions must be > 0".into()));
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::Invalid("store.max_connections must be > 0".into()));
        }
        if self.session.outbox_capacity == 0 {
            return Err(ConfigError::Invalid("session.outbox_capacity must be > 0".into()));
        }
        Ok(())
    }

    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            path: self.server.ws_path.clone(),
            handshake_timeout: Duration::from_secs(self.server.handshake_timeout_secs),
            ..WebSocketConfig::default()
        }
    }
}

fn invalid_env(var: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidEnv { var, value }
}
