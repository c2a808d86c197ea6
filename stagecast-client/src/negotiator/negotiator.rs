use crate::error::{NegotiationError, SignalingError};
use crate::negotiator::{LocalTrack, MediaSession};
use stagecast_core::{IceCandidate, Role, SdpKind, SessionDescription};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Connection state of one negotiation. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NegotiatorState {
    New,
    Negotiating,
    Connected,
    Closed,
}

struct NegotiatorInner {
    state: NegotiatorState,
    local_description: Option<SessionDescription>,
    remote_applied: bool,
    pending_candidates: Vec<IceCandidate>,
    local_tracks: usize,
}

impl NegotiatorInner {
    fn advance(&mut self, next: NegotiatorState) {
        if next > self.state {
            self.state = next;
        }
    }

    fn ensure_open(&self) -> Result<(), SignalingError> {
        if self.state == NegotiatorState::Closed {
            return Err(SignalingError::Closed);
        }
        Ok(())
    }
}

/// Role-aware wrapper around a [`MediaSession`].
///
/// Negotiation operations are serialized by `op_lock`. `close` does not take
/// it and may run while an operation is waiting on the platform; every
/// operation re-checks for closure after each await and drops late results.
pub struct SessionNegotiator {
    role: Role,
    media: Arc<dyn MediaSession>,
    inner: Mutex<NegotiatorInner>,
    op_lock: Mutex<()>,
}

impl SessionNegotiator {
    pub fn new(role: Role, media: Arc<dyn MediaSession>) -> Self {
        Self {
            role,
            media,
            inner: Mutex::new(NegotiatorInner {
                state: NegotiatorState::New,
                local_description: None,
                remote_applied: false,
                pending_candidates: Vec::new(),
                local_tracks: 0,
            }),
            op_lock: Mutex::new(()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub async fn state(&self) -> NegotiatorState {
        self.inner.lock().await.state
    }

    pub async fn local_description(&self) -> Option<SessionDescription> {
        self.inner.lock().await.local_description.clone()
    }

    pub async fn pending_candidates(&self) -> usize {
        self.inner.lock().await.pending_candidates.len()
    }

    pub async fn attach_track(&self, track: LocalTrack) -> Result<(), SignalingError> {
        let _op = self.op_lock.lock().await;
        {
            let inner = self.inner.lock().await;
            inner.ensure_open()?;
            self.require_role(Role::Broadcaster, "attach_track")?;
            if inner.local_description.is_some() {
                return Err(NegotiationError::OutOfOrder(
                    "tracks must be attached before the offer is created".into(),
                )
                .into());
            }
        }

        debug!("Attaching local {:?} track {}", track.kind, track.id);
        self.media.add_local_track(track).await?;

        let mut inner = self.inner.lock().await;
        inner.ensure_open()?;
        inner.local_tracks += 1;
        Ok(())
    }

    pub async fn create_offer(&self) -> Result<SessionDescription, SignalingError> {
        let _op = self.op_lock.lock().await;
        {
            let inner = self.inner.lock().await;
            inner.ensure_open()?;
            self.require_role(Role::Broadcaster, "create_offer")?;
            if inner.local_tracks == 0 {
                return Err(NegotiationError::NoLocalTracks.into());
            }
            if inner.local_description.is_some() {
                return Err(NegotiationError::OutOfOrder("offer already created".into()).into());
            }
        }

        let offer = self.media.create_offer().await?;

        let mut inner = self.inner.lock().await;
        inner.ensure_open()?;
        inner.local_description = Some(offer.clone());
        inner.advance(NegotiatorState::Negotiating);
        info!("Local offer created");
        Ok(offer)
    }

    pub async fn create_answer(&self) -> Result<SessionDescription, SignalingError> {
        let _op = self.op_lock.lock().await;
        {
            let inner = self.inner.lock().await;
            inner.ensure_open()?;
            self.require_role(Role::Viewer, "create_answer")?;
            if !inner.remote_applied {
                return Err(NegotiationError::OutOfOrder(
                    "answer requested before a remote offer was applied".into(),
                )
                .into());
            }
            if inner.local_description.is_some() {
                return Err(NegotiationError::OutOfOrder("answer already created".into()).into());
            }
        }

        let answer = self.media.create_answer().await?;

        let mut inner = self.inner.lock().await;
        inner.ensure_open()?;
        inner.local_description = Some(answer.clone());
        info!("Local answer created");
        Ok(answer)
    }

    /// Applies the remote offer (viewer) or answer (broadcaster), then flushes
    /// every candidate that arrived early, in arrival order.
    pub async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SignalingError> {
        let _op = self.op_lock.lock().await;
        {
            let inner = self.inner.lock().await;
            inner.ensure_open()?;

            match (self.role, description.kind) {
                (Role::Viewer, SdpKind::Offer) | (Role::Broadcaster, SdpKind::Answer) => {}
                (role, SdpKind::Offer) => {
                    return Err(NegotiationError::WrongRole {
                        operation: "applying a remote offer",
                        role,
                    }
                    .into());
                }
                (role, SdpKind::Answer) => {
                    return Err(NegotiationError::WrongRole {
                        operation: "applying a remote answer",
                        role,
                    }
                    .into());
                }
            }

            description
                .validate()
                .map_err(NegotiationError::InvalidDescription)?;

            if self.role == Role::Broadcaster && inner.local_description.is_none() {
                return Err(NegotiationError::OutOfOrder(
                    "answer applied before a local offer exists".into(),
                )
                .into());
            }
            if inner.remote_applied {
                return Err(NegotiationError::OutOfOrder(
                    "remote description already applied".into(),
                )
                .into());
            }
        }

        self.media.set_remote_description(description).await?;

        let pending = {
            let mut inner = self.inner.lock().await;
            inner.ensure_open()?;
            inner.remote_applied = true;
            inner.advance(NegotiatorState::Negotiating);
            std::mem::take(&mut inner.pending_candidates)
        };

        if !pending.is_empty() {
            debug!("Flushing {} buffered remote candidates", pending.len());
        }
        for candidate in pending {
            self.inner.lock().await.ensure_open()?;
            self.media.add_ice_candidate(candidate).await?;
        }

        Ok(())
    }

    /// Applies a remote candidate, or buffers it until a remote description exists.
    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SignalingError> {
        let _op = self.op_lock.lock().await;
        {
            let mut inner = self.inner.lock().await;
            inner.ensure_open()?;
            if !inner.remote_applied {
                debug!("Buffering remote candidate until a remote description is set");
                inner.pending_candidates.push(candidate);
                return Ok(());
            }
        }

        self.media.add_ice_candidate(candidate).await?;
        Ok(())
    }

    pub async fn mark_connected(&self) {
        self.inner.lock().await.advance(NegotiatorState::Connected);
    }

    pub async fn is_closed(&self) -> bool {
        self.state().await == NegotiatorState::Closed
    }

    /// Idempotent; the platform session is closed exactly once.
    pub async fn close(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == NegotiatorState::Closed {
                return;
            }
            inner.advance(NegotiatorState::Closed);
            inner.pending_candidates.clear();
        }

        self.media.close().await;
        info!("Session negotiator closed");
    }

    fn require_role(&self, role: Role, operation: &'static str) -> Result<(), SignalingError> {
        if self.role != role {
            return Err(NegotiationError::WrongRole {
                operation,
                role: self.role,
            }
            .into());
        }
        Ok(())
    }
}
