mod config;
pub mod coordinator;
mod error;
pub mod negotiator;
pub mod transport;

pub use config::ClientConfig;
pub use coordinator::{
    CloseReason, ConnectOptions, RetryPolicy, SessionEvent, SessionHandle, SessionState,
    SignalingCoordinator, connect, connect_with_retry,
};
pub use error::{ConnectError, NegotiationError, ProtocolError, SignalingError, TransportError};
pub use negotiator::{LocalTrack, MediaKind, RemoteTrack, RtcMediaBackend, SessionNegotiator};
pub use transport::WsConnector;
