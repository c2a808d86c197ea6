use crate::error::SignalingError;
use async_trait::async_trait;
use stagecast_core::SignalMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events a transport channel produces for the coordinator, in arrival order.
///
/// Exactly one terminal event (`Closed` or `Failed`) ends the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw text frame; decoding is left to the coordinator.
    Text(String),
    Closed,
    Failed(String),
}

/// Outbound half of a signaling connection.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Enqueue a message. Fails with `TransportError::NotOpen` once closed.
    async fn send(&self, message: &SignalMessage) -> Result<(), SignalingError>;

    /// Idempotent. No events are produced after this returns.
    async fn close(&self);

    fn is_open(&self) -> bool;
}

pub struct Connection {
    pub channel: Arc<dyn MessageChannel>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens signaling connections to a relay endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<Connection, SignalingError>;
}
