//! In-process connection backed by Tokio channels.
//!
//! [`pair`] returns the server half (a [`Connection`]) and a
//! [`ChannelPeer`] that plays the client. Used to drive sessions without
//! sockets, including under paused Tokio time.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, Mutex};

use crate::{Connection, ConnectionId, TransportError};

/// Channel connection IDs live in their own range so they never collide
/// with socket IDs in logs.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1 << 48);

/// What the peer pushes toward the server half.
enum Inbound {
    Frame(Vec<u8>),
    Reset(String),
}

/// Creates a connected server/peer pair.
pub fn pair() -> (ChannelConnection, ChannelPeer) {
    let (to_server, from_peer) = mpsc::unbounded_channel();
    let (to_peer, from_server) = mpsc::unbounded_channel();
    let id = ConnectionId::new(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed));

    let conn = ChannelConnection {
        id,
        inbound: Mutex::new(from_peer),
        outbound: Mutex::new(Some(to_peer)),
    };
    let peer = ChannelPeer {
        outbound: Some(to_server),
        inbound: from_server,
    };
    (conn, peer)
}

/// Server half of a channel pair.
pub struct ChannelConnection {
    id: ConnectionId,
    inbound: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl Connection for ChannelConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let outbound = self.outbound.lock().await;
        let Some(tx) = outbound.as_ref() else {
            return Err(TransportError::ConnectionClosed("closed locally".into()));
        };
        tx.send(data.to_vec()).map_err(|_| {
            TransportError::SendFailed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "peer dropped",
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        match self.inbound.lock().await.recv().await {
            Some(Inbound::Frame(data)) => Ok(Some(data)),
            Some(Inbound::Reset(reason)) => Err(TransportError::ReceiveFailed(
                io::Error::new(io::ErrorKind::ConnectionReset, reason),
            )),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.outbound.lock().await.take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Client half of a channel pair.
pub struct ChannelPeer {
    outbound: Option<mpsc::UnboundedSender<Inbound>>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ChannelPeer {
    /// Delivers one frame to the server half.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(Inbound::Frame(data.into())).is_ok(),
            None => false,
        }
    }

    /// Makes the server's next `recv` fail as if the socket was reset.
    pub fn reset(&self, reason: &str) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(Inbound::Reset(reason.to_string())).is_ok(),
            None => false,
        }
    }

    /// Closes the peer's sending side; the server sees a clean close
    /// once queued frames are drained.
    pub fn close(&mut self) {
        self.outbound.take();
    }

    /// Waits for the next frame from the server. `None` once the server
    /// half is closed or dropped.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Returns a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.try_recv().ok()
    }
}
