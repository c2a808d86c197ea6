use crate::coordinator::SessionState;
use crate::error::SignalingError;
use crate::negotiator::RemoteTrack;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    LocalDisconnect,
    RemoteLeave,
    Failed(SignalingError),
}

/// Events delivered to the owner of a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),

    /// Inbound media is available (viewer side).
    RemoteTrack(RemoteTrack),

    /// Emitted exactly once; nothing follows it.
    Closed(CloseReason),
}
