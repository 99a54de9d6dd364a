//! `TestpulseServer` builder and accept loop.
//!
//! Ties the layers together: the WebSocket transport accepts connections,
//! each one becomes a [`Session`] on its own task, and every session hangs
//! off the server's shutdown token as a child.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use testpulse_auth::Authenticator;
use testpulse_session::{Session, SessionConfig, SessionError};
use testpulse_store::{AnalyticsReader, UserStore};
use testpulse_transport::{
    Connection, Transport, TransportError, WebSocketConfig, WebSocketConnection,
    WebSocketTransport,
};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::health::HealthServer;
use crate::TestpulseError;

/// Builder for configuring and starting a Testpulse server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use testpulse::prelude::*;
///
/// # async fn run() -> Result<(), TestpulseError> {
/// let store = Arc::new(MemoryStore::new());
/// let auth = PasswordAuthenticator::new(
///     Arc::clone(&store),
///     CredentialVerifier::default(),
///     TokenIssuer::new(b"a-long-enough-signing-secret", Duration::from_secs(3600)),
/// )
/// .await?;
/// let server = TestpulseServerBuilder::new()
///     .bind("127.0.0.1:8080")
///     .build(auth, store)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct TestpulseServerBuilder {
    bind_addr: String,
    health_addr: Option<String>,
    websocket: WebSocketConfig,
    session_config: SessionConfig,
    max_sessions: usize,
}

impl TestpulseServerBuilder {
    /// Creates a new builder with default settings and no health endpoint.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            health_addr: None,
            websocket: WebSocketConfig::default(),
            session_config: SessionConfig::default(),
            max_sessions: 1024,
        }
    }

    /// Takes every server-side setting from a loaded configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            bind_addr: config.server.bind_addr.clone(),
            health_addr: config.server.health_addr.clone(),
            websocket: config.websocket_config(),
            session_config: config.session.to_session_config(),
            max_sessions: config.server.max_sessions,
        }
    }

    /// Sets the address the WebSocket listener binds to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Enables the liveness endpoint on `addr`.
    pub fn health(mut self, addr: &str) -> Self {
        self.health_addr = Some(addr.to_string());
        self
    }

    pub fn websocket_config(mut self, config: WebSocketConfig) -> Self {
        self.websocket = config;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Caps concurrent sessions. Connections over the cap are closed
    /// right after the upgrade.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    /// Binds the listeners. Nothing is served until [`TestpulseServer::run`].
    pub async fn build<A, S>(
        self,
        auth: A,
        store: Arc<S>,
    ) -> Result<TestpulseServer<A, S>, TestpulseError>
    where
        A: Authenticator,
        S: UserStore + AnalyticsReader,
    {
        let transport = WebSocketTransport::bind_with(&self.bind_addr, self.websocket).await?;
        let health = match &self.health_addr {
            Some(addr) => Some(HealthServer::bind(addr).await?),
            None => None,
        };

        Ok(TestpulseServer {
            transport,
            health,
            auth: Arc::new(auth),
            store,
            session_config: self.session_config,
            permits: Arc::new(Semaphore::new(self.max_sessions)),
            shutdown: CancellationToken::new(),
        })
    }
}

impl Default for TestpulseServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Testpulse server.
///
/// Call [`run`](Self::run) or [`run_until`](Self::run_until) to start
/// accepting connections.
pub struct TestpulseServer<A, S> {
    transport: WebSocketTransport,
    health: Option<HealthServer>,
    auth: Arc<A>,
    store: Arc<S>,
    session_config: SessionConfig,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl<A, S> TestpulseServer<A, S>
where
    A: Authenticator,
    S: UserStore + AnalyticsReader,
{
    /// The address the WebSocket listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// The address of the health endpoint, if enabled.
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health.as_ref().map(HealthServer::local_addr)
    }

    /// Cancelling this token stops the server and every open session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs until the shutdown token is cancelled.
    pub async fn run(self) -> Result<(), TestpulseError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs until `signal` completes or the shutdown token is cancelled,
    /// then closes every session and waits for them to finish.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), TestpulseError>
    where
        F: Future<Output = ()>,
    {
        let health = self
            .health
            .take()
            .map(|health| health.spawn(self.shutdown.child_token()));
        info!(local_addr = %self.local_addr(), "testpulse server running");

        let mut sessions = JoinSet::new();
        let result = self.accept_loop(signal, &mut sessions).await;

        self.shutdown.cancel();
        if let Err(e) = self.transport.shutdown().await {
            debug!(error = %e, "transport shutdown failed");
        }
        let open = sessions.len();
        if open > 0 {
            info!(sessions = open, "waiting for sessions to close");
        }
        while let Some(joined) = sessions.join_next().await {
            log_session_end(joined);
        }
        if let Some(health) = health {
            let _ = health.await;
        }
        info!("testpulse server stopped");
        result
    }

    async fn accept_loop<F>(
        &mut self,
        signal: F,
        sessions: &mut JoinSet<Result<(), SessionError>>,
    ) -> Result<(), TestpulseError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = &mut signal => {
                    info!("shutdown requested");
                    return Ok(());
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_session_end(joined);
                    continue;
                }
                accepted = self.transport.accept() => accepted,
            };

            match accepted {
                Ok(conn) => self.start_session(conn, sessions),
                Err(TransportError::Shutdown) => return Err(TransportError::Shutdown.into()),
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }

    fn start_session(
        &self,
        conn: WebSocketConnection,
        sessions: &mut JoinSet<Result<(), SessionError>>,
    ) {
        let conn_id = conn.id();
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            warn!(%conn_id, peer = %conn.peer_addr(), "session limit reached, closing connection");
            tokio::spawn(async move {
                let _ = conn.close().await;
            });
            return;
        };

        debug!(%conn_id, peer = %conn.peer_addr(), "connection accepted");
        let session = Session::new(
            Arc::new(conn),
            Arc::clone(&self.auth),
            Arc::clone(&self.store),
            self.session_config.clone(),
        )
        .with_cancel(self.shutdown.child_token());

        sessions.spawn(async move {
            let result = session.run().await;
            drop(permit);
            result
        });
    }
}

fn log_session_end(
    joined: Result<Result<(), SessionError>, JoinError>,
) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "session ended with error"),
        Err(e) => warn!(error = %e, "session task failed"),
    }
}
