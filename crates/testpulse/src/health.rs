//! Liveness check on its own plain-HTTP listener.
//!
//! `GET /health` answers `200 OK` with body `OK`. Other paths get a 404
//! and other methods on `/health` a 405. The endpoint only proves the process
//! is up and accepting; it doesn't touch the store.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TestpulseError;

/// A bound, not yet running, health listener.
pub struct HealthServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl HealthServer {
    pub async fn bind(addr: &str) -> Result<Self, TestpulseError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "health endpoint listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves health checks on a background task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let local_addr = self.local_addr;
        tokio::spawn(async move {
            let served = axum::serve(self.listener, router())
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await;
            match served {
                Ok(()) => debug!(%local_addr, "health endpoint stopped"),
                Err(e) => warn!(%local_addr, error = %e, "health endpoint failed"),
            }
        })
    }
}

fn router() -> Router {
    Router::new().route("/health", get(|| async { "OK" }))
}
