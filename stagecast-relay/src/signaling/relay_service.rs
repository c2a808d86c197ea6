use crate::config::RelayConfig;
use crate::room::{ConnectionId, RoomManager};
use crate::signaling::ws_handler;
use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use stagecast_core::utils::SIGNAL_PATH;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tracing::info;

/// Shared state handed to every signaling socket.
#[derive(Clone, Default)]
pub struct RelayState {
    pub rooms: RoomManager,
    next_connection: Arc<AtomicU64>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(SIGNAL_PATH, get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// A relay bound to its listening socket but not yet serving.
pub struct RelayServer {
    listener: TcpListener,
    state: RelayState,
}

impl RelayServer {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read relay listen address")
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub async fn run(self) -> Result<()> {
        let app = router(self.state);
        axum::serve(self.listener, app)
            .await
            .context("Relay server stopped")
    }
}

pub async fn bind(config: &RelayConfig) -> Result<RelayServer> {
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind relay to {}", config.bind_addr))?;

    let server = RelayServer {
        listener,
        state: RelayState::new(),
    };
    info!(
        "Signaling relay listening on ws://{}{}",
        server.local_addr()?,
        SIGNAL_PATH
    );
    Ok(server)
}

pub async fn serve(config: &RelayConfig) -> Result<()> {
    bind(config).await?.run().await
}
