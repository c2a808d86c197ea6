pub use stagecast_core::{ParticipantId, Role, RoomId, SignalMessage};

pub mod model {
    pub use stagecast_core::model::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use stagecast_client::*;
}

#[cfg(feature = "relay")]
pub mod relay {
    pub use stagecast_relay::*;
}
