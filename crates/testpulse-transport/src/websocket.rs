//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! TCP accepts run on a background task; each upgrade is handshaked on its
//! own task so a slow client cannot stall the listener. Upgraded
//! connections are handed to [`WebSocketTransport::accept`] through a
//! bounded channel.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Settings for the WebSocket listener.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Request path clients must upgrade on. Other paths get a 404.
    pub path: String,
    /// Upper bound on the HTTP upgrade exchange.
    pub handshake_timeout: Duration,
    /// Upgraded connections waiting to be claimed by `accept`.
    pub accept_backlog: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            handshake_timeout: Duration::from_secs(10),
            accept_backlog: 64,
        }
    }
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<WebSocketConnection>,
    acceptor: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport with default settings.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with(addr, WebSocketConfig::default()).await
    }

    /// Binds a new WebSocket transport to the given address.
    pub async fn bind_with(
        addr: &str,
        config: WebSocketConfig,
    ) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr).await.map_err(TransportError::BindFailed)?;
        let local_addr =
            listener.local_addr().map_err(TransportError::BindFailed)?;
        tracing::info!(%local_addr, path = %config.path, "WebSocket transport listening");

        let (tx, rx) = mpsc::channel(config.accept_backlog.max(1));
        let acceptor = tokio::spawn(accept_loop(listener, config, tx));

        Ok(Self {
            local_addr,
            ready: rx,
            acceptor,
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.ready.recv().await.ok_or(TransportError::Shutdown)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.acceptor.abort();
        tracing::info!(local_addr = %self.local_addr, "WebSocket transport stopped");
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: WebSocketConfig,
    ready: mpsc::Sender<WebSocketConnection>,
) {
    while !ready.is_closed() {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                // Usually fd exhaustion; back off instead of spinning.
                tracing::warn!(error = %e, "TCP accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let ready = ready.clone();
        let config = config.clone();
        tokio::spawn(async move {
            match upgrade(stream, addr, &config).await {
                Ok(conn) => {
                    if ready.send(conn).await.is_err() {
                        tracing::debug!(%addr, "transport closed before connection was claimed");
                    }
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "WebSocket upgrade failed");
                }
            }
        });
    }
}

async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    config: &WebSocketConfig,
) -> Result<WebSocketConnection, TransportError> {
    let expected = config.path.clone();
    let check_path =
        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            if req.uri().path() == expected {
                Ok(resp)
            } else {
                let mut reject = ErrorResponse::new(Some("not found".to_string()));
                *reject.status_mut() = StatusCode::NOT_FOUND;
                Err(reject)
            }
        };

    let ws = tokio::time::timeout(
        config.handshake_timeout,
        tokio_tungstenite::accept_hdr_async(stream, check_path),
    )
    .await
    .map_err(|_| {
        TransportError::AcceptFailed(io::Error::new(
            io::ErrorKind::TimedOut,
            "WebSocket handshake timed out",
        ))
    })?
    .map_err(|e| {
        TransportError::AcceptFailed(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;

    let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(%id, %addr, "accepted WebSocket connection");

    let (sink, stream) = ws.split();
    Ok(WebSocketConnection {
        id,
        peer_addr: addr,
        sink: Mutex::new(sink),
        stream: Mutex::new(stream),
    })
}

/// A single WebSocket connection.
///
/// The socket is split so a pending `recv` never blocks a `send`.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    /// Remote address of the client.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// UTF-8 payloads go out as text frames, anything else as binary.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(io::Error::new(io::ErrorKind::BrokenPipe, e))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        match self.sink.lock().await.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(TransportError::SendFailed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                e,
            ))),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
