mod description;
mod participant;
mod role;
mod room;
mod signaling;

pub use description::{SdpKind, SessionDescription};
pub use participant::ParticipantId;
pub use role::{ParseRoleError, Role};
pub use room::RoomId;
pub use signaling::{
    DecodeError, IceCandidate, IceServerConfig, MessageKind, SignalMessage, default_ice_servers,
};
