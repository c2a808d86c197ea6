use crate::config::ClientConfig;
use crate::coordinator::{ConnectOptions, SessionHandle, connect};
use crate::error::SignalingError;
use crate::negotiator::MediaBackend;
use crate::transport::Connector;
use serde::{Deserialize, Serialize};
use stagecast_core::ParticipantId;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff for the connect phase only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::from_secs_f64(scaled.min(self.max_backoff.as_secs_f64()))
    }
}

/// [`connect`], retried on connect-phase failures.
///
/// The participant id is fixed before the first attempt so every attempt
/// joins under the same identity. Errors after the channel is open are
/// never retried.
pub async fn connect_with_retry(
    config: &ClientConfig,
    connector: Arc<dyn Connector>,
    backend: Arc<dyn MediaBackend>,
    options: ConnectOptions,
    policy: RetryPolicy,
) -> Result<SessionHandle, SignalingError> {
    let mut options = options;
    if options.participant_id.is_none() {
        options.participant_id = Some(ParticipantId::generate());
    }

    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match connect(config, connector.clone(), backend.clone(), options.clone()).await {
            Ok(session) => return Ok(session),
            Err(SignalingError::Connect(e)) if e.is_retryable() && attempt < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "Connect attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
