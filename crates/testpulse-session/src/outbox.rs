//! The single writer that owns all outbound traffic of a session.
//!
//! The read loop and the push loop never touch the connection's send
//! side. They enqueue [`ServerMessage`]s into the [`Outbox`]; one writer
//! task drains the queue, encodes each message, and sends it as one
//! frame. Frames therefore can't interleave, and their order matches the
//! order they were enqueued in.

use std::sync::Arc;

use testpulse_protocol::{Codec, JsonCodec, ServerMessage};
use testpulse_transport::{Connection, ConnectionId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace, warn};

use crate::SessionError;

/// Producer handle for the session's writer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<ServerMessage>,
}

impl Outbox {
    /// Queues one message, waiting if the queue is full.
    ///
    /// Returns `false` once the writer has stopped.
    pub async fn send(&self, msg: ServerMessage) -> bool {
        self.tx.send(msg).await.is_ok()
    }
}

/// Starts the writer task for `conn` and returns its outbox.
///
/// The writer runs until every [`Outbox`] is dropped or `cancel` fires.
/// A failed send cancels `cancel`, which stops the rest of the session.
pub fn spawn_writer<C: Connection>(
    conn: Arc<C>,
    capacity: usize,
    cancel: CancellationToken,
) -> (Outbox, JoinHandle<Result<(), SessionError>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run_writer(conn, rx, cancel));
    (Outbox { tx }, handle)
}

async fn run_writer<C: Connection>(
    conn: Arc<C>,
    mut rx: mpsc::Receiver<ServerMessage>,
    cancel: CancellationToken,
) -> Result<(), SessionError> {
    let conn_id: ConnectionId = conn.id();
    let codec = JsonCodec;

    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let bytes = match codec.encode(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(%conn_id, kind = msg.kind(), error = %e, "failed to encode outbound message");
                continue;
            }
        };

        if let Err(e) = conn.send(&bytes).await {
            warn!(%conn_id, error = %e, "send failed, closing session");
            cancel.cancel();
            return Err(SessionError::Transport(Box::new(e)));
        }
        trace!(%conn_id, kind = msg.kind(), "frame sent");
    }
    Ok(())
}
