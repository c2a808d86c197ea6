/// Relay used when the deployment configuration does not name one.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8080";

/// Fixed path suffix of the relay's signaling endpoint.
pub const SIGNAL_PATH: &str = "/signal";

pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_2: &str = "stun:stun1.l.google.com:19302";
