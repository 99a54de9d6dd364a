//! One client session: read loop, push loop, and writer.
//!
//! ```text
//!             ┌────────────┐   ServerMessage   ┌────────┐   frames
//!  frames ──▶ │ read loop  │ ────────────────▶ │        │ ─────────▶ client
//!             └────────────┘                   │ writer │
//!             ┌────────────┐   ServerMessage   │        │
//!  timer  ──▶ │ push loop  │ ────────────────▶ │        │
//!             └────────────┘                   └────────┘
//! ```
//!
//! All three share one [`CancellationToken`]. Whoever sees the connection
//! die cancels it; the session then joins its tasks and closes the
//! connection.

use std::sync::Arc;

use testpulse_auth::Authenticator;
use testpulse_protocol::{
    AnalyticsRequest, AuthRequest, ClientMessage, Codec, JsonCodec, ServerMessage, UserDataRequest,
    UserId,
};
use testpulse_store::{AnalyticsReader, UserStore};
use testpulse_tick::{TickConfig, TickScheduler};
use testpulse_transport::{Connection, ConnectionId};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::outbox::{spawn_writer, Outbox};
use crate::{AuthPolicy, PushScope, RequestError, SessionConfig, SessionError};

/// Server-side state for one open connection.
///
/// Created per accepted connection and consumed by [`Session::run`].
pub struct Session<C, A, S> {
    conn: Arc<C>,
    auth: Arc<A>,
    store: Arc<S>,
    config: SessionConfig,
    codec: JsonCodec,
    cancel: CancellationToken,
    /// Unset until a successful `auth`. The push loop watches it.
    user: watch::Sender<Option<UserId>>,
}

impl<C, A, S> Session<C, A, S>
where
    C: Connection,
    A: Authenticator,
    S: UserStore + AnalyticsReader,
{
    pub fn new(conn: Arc<C>, auth: Arc<A>, store: Arc<S>, config: SessionConfig) -> Self {
        let (user, _) = watch::channel(None);
        Self {
            conn,
            auth,
            store,
            config,
            codec: JsonCodec,
            cancel: CancellationToken::new(),
            user,
        }
    }

    /// Uses `cancel` instead of a fresh token, typically a child of the
    /// server's shutdown token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle that ends the session when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<UserId> {
        *self.user.borrow()
    }

    /// Drives the session until the connection closes, a transport error
    /// occurs, or the cancellation token fires.
    ///
    /// A clean close (by either side) returns `Ok(())`.
    pub async fn run(self) -> Result<(), SessionError> {
        let conn_id = self.conn.id();
        debug!(%conn_id, "session started");

        let (outbox, writer) = spawn_writer(
            Arc::clone(&self.conn),
            self.config.outbox_capacity,
            self.cancel.clone(),
        );
        let pusher = tokio::spawn(push_loop(
            conn_id,
            Arc::clone(&self.store),
            outbox.clone(),
            self.user.subscribe(),
            self.config.clone(),
            self.cancel.clone(),
        ));

        let read_result = self.read_loop(&outbox).await;

        self.cancel.cancel();
        drop(outbox);
        let push_result = pusher.await;
        let write_result = writer.await;

        if let Err(e) = self.conn.close().await {
            debug!(%conn_id, error = %e, "close after session end failed");
        }
        debug!(%conn_id, user = ?self.user(), "session ended");

        read_result?;
        push_result?;
        write_result?
    }

    async fn read_loop(&self, outbox: &Outbox) -> Result<(), SessionError> {
        let conn_id = self.conn.id();
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                frame = self.conn.recv() => frame,
            };

            let data = match frame {
                Ok(Some(data)) => data,
                Ok(None) => {
                    debug!(%conn_id, "connection closed by peer");
                    return Ok(());
                }
                Err(e) => {
                    warn!(%conn_id, error = %e, "connection read failed");
                    return Err(SessionError::Transport(Box::new(e)));
                }
            };

            let reply = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                reply = self.handle_frame(&data) => reply,
            };
            if !outbox.send(reply).await {
                return Ok(());
            }
        }
    }

    /// Turns one inbound frame into exactly one reply.
    async fn handle_frame(&self, data: &[u8]) -> ServerMessage {
        let result = match self.codec.decode_client(data) {
            Ok(msg) => self.dispatch(msg).await,
            Err(e) => Err(RequestError::from(e)),
        };

        result.unwrap_or_else(|e| {
            let conn_id = self.conn.id();
            if e.is_server_fault() {
                warn!(%conn_id, error = %e, "request failed");
            } else {
                debug!(%conn_id, error = %e, "request rejected");
            }
            ServerMessage::error(e.client_message())
        })
    }

    async fn dispatch(&self, msg: ClientMessage) -> Result<ServerMessage, RequestError> {
        match msg {
            ClientMessage::Auth(req) => self.handle_auth(req).await,
            ClientMessage::RequestAnalytics(req) => self.handle_analytics(req).await,
            ClientMessage::RequestUserData(req) => self.handle_user_data(req).await,
        }
    }

    async fn handle_auth(&self, req: AuthRequest) -> Result<ServerMessage, RequestError> {
        let login = self.auth.login(&req.username, &req.password).await?;
        self.user.send_replace(Some(login.user_id));
        debug!(conn_id = %self.conn.id(), user_id = %login.user_id, "session authenticated");
        Ok(ServerMessage::authenticated(login.token))
    }

    async fn handle_analytics(&self, req: AnalyticsRequest) -> Result<ServerMessage, RequestError> {
        if self.config.auth_policy == AuthPolicy::RequireToken {
            let token = req.token.ok_or(testpulse_auth::AuthError::Unauthenticated)?;
            self.auth.verify_token(&token)?;
        }
        let snapshot = self
            .store
            .global_snapshot()
            .await
            .map_err(RequestError::Analytics)?;
        Ok(ServerMessage::Analytics(snapshot))
    }

    async fn handle_user_data(&self, req: UserDataRequest) -> Result<ServerMessage, RequestError> {
        let user_id = match req.token {
            Some(token) => self.auth.verify_token(&token)?,
            None => self.user().ok_or(testpulse_auth::AuthError::Unauthenticated)?,
        };
        let profile = self
            .store
            .profile(user_id)
            .await
            .map_err(RequestError::UserData)?
            .ok_or(RequestError::UserNotFound)?;
        Ok(ServerMessage::UserData(profile.into()))
    }
}

/// Sends an analytics snapshot every push interval until cancelled.
///
/// Under [`AuthPolicy::RequireToken`] the timer stays paused until the
/// session authenticates.
async fn push_loop<S: AnalyticsReader>(
    conn_id: ConnectionId,
    store: Arc<S>,
    outbox: Outbox,
    mut user: watch::Receiver<Option<UserId>>,
    config: SessionConfig,
    cancel: CancellationToken,
) {
    let mut scheduler = TickScheduler::new(TickConfig {
        initial_jitter: config.push_jitter,
        ..TickConfig::every(config.push_interval)
    });
    let gated = config.auth_policy == AuthPolicy::RequireToken;
    if gated && user.borrow().is_none() {
        scheduler.pause();
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = user.changed() => {
                if changed.is_err() {
                    break;
                }
                if user.borrow_and_update().is_some() {
                    scheduler.resume();
                }
            }
            _ = scheduler.wait_for_tick() => {
                let current = *user.borrow();
                let snapshot = match (config.push_scope, current) {
                    (PushScope::User, Some(id)) => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            s = store.user_snapshot(id) => s,
                        }
                    }
                    _ => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            s = store.global_snapshot() => s,
                        }
                    }
                };
                scheduler.record_tick_end();

                let msg = match snapshot {
                    Ok(snapshot) => ServerMessage::Analytics(snapshot),
                    Err(e) => {
                        let e = RequestError::Analytics(e);
                        warn!(%conn_id, error = %e, "analytics push failed");
                        ServerMessage::error(e.client_message())
                    }
                };
                if !outbox.send(msg).await {
                    break;
                }
            }
        }
    }
    debug!(%conn_id, pushes = scheduler.tick_count(), "push loop stopped");
}
