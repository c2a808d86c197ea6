use stagecast_core::{ParticipantId, SignalMessage};
use tokio::sync::mpsc;

/// Identifies one WebSocket connection, so a reused participant id cannot
/// act on behalf of another socket.
pub type ConnectionId = u64;

/// Outbound queue of one member; the socket's writer task drains it.
pub type MemberSender = mpsc::UnboundedSender<SignalMessage>;

/// Commands a signaling socket sends to its room.
#[derive(Debug)]
pub enum RoomCommand {
    /// The socket sent `join` for this room.
    Join {
        id: ParticipantId,
        conn: ConnectionId,
        outbound: MemberSender,
    },

    /// `offer`, `answer` or `candidate` from a joined member.
    Signal {
        from: ParticipantId,
        conn: ConnectionId,
        message: SignalMessage,
    },

    /// Explicit `leave`, or the socket went away.
    Leave {
        id: ParticipantId,
        conn: ConnectionId,
    },
}
