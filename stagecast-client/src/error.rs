use crate::coordinator::SessionState;
use stagecast_core::{MessageKind, Role};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("session is closed")]
    Closed,
}

impl SignalingError {
    /// Whether the error must tear the session down.
    ///
    /// Unknown chatter and role-inappropriate messages are tolerated; a known
    /// message with an inconsistent payload is not.
    pub fn is_fatal(&self) -> bool {
        match self {
            SignalingError::Protocol(ProtocolError::Malformed { .. }) => true,
            SignalingError::Protocol(_) => false,
            SignalingError::Closed => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),

    #[error("room id must not be empty")]
    InvalidRoom,

    #[error("relay unreachable: {0}")]
    Unreachable(String),

    #[error("relay rejected the handshake: {0}")]
    Rejected(String),

    #[error("no handshake within {0:?}")]
    Timeout(Duration),
}

impl ConnectError {
    /// Transient failures; a bad endpoint or room fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectError::Unreachable(_) | ConnectError::Rejected(_) | ConnectError::Timeout(_)
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed `{kind}` message: {reason}")]
    Malformed { kind: MessageKind, reason: String },

    #[error("`{kind}` is not meaningful for a {role}")]
    UnexpectedForRole { kind: MessageKind, role: Role },

    #[error("`{kind}` received while {state:?}")]
    UnexpectedInState { kind: MessageKind, state: SessionState },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("{operation} is not allowed for a {role}")]
    WrongRole { operation: &'static str, role: Role },

    #[error("no local media tracks attached")]
    NoLocalTracks,

    #[error("out of order: {0}")]
    OutOfOrder(String),

    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    #[error("media session error: {0}")]
    Media(String),

    #[error("media path not live within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("channel is not open")]
    NotOpen,

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("connection dropped: {0}")]
    Dropped(String),
}
