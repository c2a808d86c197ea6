use serde::{Deserialize, Serialize};
use stagecast_core::IceServerConfig;
use stagecast_core::default_ice_servers;
use stagecast_core::utils::{DEFAULT_RELAY_URL, SIGNAL_PATH};
use std::time::Duration;

/// Client-side signaling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the relay, e.g. `wss://sfu.example.com`.
    pub relay_url: String,
    pub ice_servers: Vec<IceServerConfig>,
    pub connect_timeout_ms: u64,
    /// Upper bound on the time between joining and the media path going live.
    pub negotiation_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_owned(),
            ice_servers: default_ice_servers(),
            connect_timeout_ms: 10_000,
            negotiation_timeout_ms: Some(30_000),
        }
    }
}

impl ClientConfig {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            ..Default::default()
        }
    }

    pub fn endpoint(&self) -> String {
        let base = self.relay_url.trim_end_matches('/');
        if base.ends_with(SIGNAL_PATH) {
            return base.to_owned();
        }
        format!("{}{}", base, SIGNAL_PATH)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout_ms.map(Duration::from_millis)
    }
}
