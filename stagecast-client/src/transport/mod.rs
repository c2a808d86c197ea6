mod message_channel;
mod ws_channel;

pub use message_channel::{Connection, Connector, MessageChannel, TransportEvent};
pub use ws_channel::{WsChannel, WsConnector};
