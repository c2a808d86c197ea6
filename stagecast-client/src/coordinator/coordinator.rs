use crate::coordinator::{CloseReason, SessionEvent, SessionState};
use crate::error::{NegotiationError, ProtocolError, SignalingError};
use crate::negotiator::{MediaEvent, SessionNegotiator};
use crate::transport::MessageChannel;
use stagecast_core::{
    DecodeError, MessageKind, ParticipantId, Role, RoomId, SessionDescription, SignalMessage,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Signaling state machine for one session.
///
/// Owned by a single task; every inbound message is handled to completion
/// before the next one is looked at.
pub struct SignalingCoordinator {
    room: RoomId,
    role: Role,
    participant: ParticipantId,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    channel: Option<Arc<dyn MessageChannel>>,
    negotiator: Option<Arc<SessionNegotiator>>,
    offer_received: bool,
}

impl SignalingCoordinator {
    pub fn new(
        room: RoomId,
        role: Role,
        participant: ParticipantId,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);

        Self {
            room,
            role,
            participant,
            state: SessionState::Idle,
            state_tx,
            events,
            channel: None,
            negotiator: None,
            offer_received: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// True while a viewer has answered an offer and is waiting for its media.
    ///
    /// A broadcaster completes its exchange when the answer is applied, so
    /// waiting for a first viewer is never counted as negotiating.
    pub fn awaiting_media(&self) -> bool {
        self.role == Role::Viewer && self.offer_received && self.state == SessionState::Negotiating
    }

    /// Takes ownership of an open channel and its negotiator, announces the
    /// participant with `join` and starts negotiating.
    pub async fn begin(
        &mut self,
        channel: Arc<dyn MessageChannel>,
        negotiator: Arc<SessionNegotiator>,
    ) -> Result<(), SignalingError> {
        if self.state != SessionState::Idle {
            return Err(ProtocolError::UnexpectedInState {
                kind: MessageKind::Join,
                state: self.state,
            }
            .into());
        }

        self.channel = Some(channel);
        self.negotiator = Some(negotiator);
        self.transition(SessionState::Joining);

        self.send(SignalMessage::Join {
            room: self.room.clone(),
            id: self.participant.clone(),
        })
        .await?;
        info!(
            "Joined room '{}' as {} {}",
            self.room, self.role, self.participant
        );

        self.transition(SessionState::Negotiating);
        Ok(())
    }

    /// Decodes one inbound frame and dispatches it.
    ///
    /// Undecodable text and unknown kinds are dropped; a recognized kind with
    /// an inconsistent payload is returned as a fatal protocol error.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), SignalingError> {
        match SignalMessage::decode(text) {
            Ok(message) => self.dispatch(message).await,
            Err(DecodeError::Malformed { kind, reason }) => {
                Err(ProtocolError::Malformed { kind, reason }.into())
            }
            Err(DecodeError::UnknownKind(kind)) => {
                debug!("Ignoring relay message of unknown type '{}'", kind);
                Ok(())
            }
            Err(e) => {
                warn!("Ignoring undecodable signaling frame: {}", e);
                Ok(())
            }
        }
    }

    pub async fn dispatch(&mut self, message: SignalMessage) -> Result<(), SignalingError> {
        let kind = message.kind();
        if !matches!(
            self.state,
            SessionState::Negotiating | SessionState::Active
        ) {
            return Err(ProtocolError::UnexpectedInState {
                kind,
                state: self.state,
            }
            .into());
        }
        let negotiator = self.negotiator()?;
        debug!("Dispatching '{}' as {}", kind, self.role);

        match message {
            SignalMessage::Offer { sdp } => {
                self.require_role(Role::Viewer, kind)?;
                self.offer_received = true;
                negotiator
                    .set_remote_description(SessionDescription::offer(sdp))
                    .await?;
                let answer = negotiator.create_answer().await?;
                self.send(SignalMessage::Answer { sdp: answer.sdp }).await?;
                info!("Answer sent for room '{}'", self.room);
            }

            SignalMessage::Answer { sdp } => {
                self.require_role(Role::Broadcaster, kind)?;
                // One viewer per media session; later answers are not applied.
                if self.state == SessionState::Active {
                    return Err(ProtocolError::UnexpectedInState {
                        kind,
                        state: self.state,
                    }
                    .into());
                }
                negotiator
                    .set_remote_description(SessionDescription::answer(sdp))
                    .await?;
                negotiator.mark_connected().await;
                self.transition(SessionState::Active);
            }

            SignalMessage::Candidate { candidate } => {
                negotiator.add_ice_candidate(candidate).await?;
            }

            SignalMessage::Leave => {
                info!("Remote side left room '{}'", self.room);
                self.close(CloseReason::RemoteLeave).await;
            }

            SignalMessage::Join { .. } => {
                return Err(ProtocolError::UnexpectedForRole {
                    kind,
                    role: self.role,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Creates the broadcaster's offer and sends it to the relay.
    pub async fn publish_offer(&mut self) -> Result<SessionDescription, SignalingError> {
        if self.role != Role::Broadcaster {
            return Err(NegotiationError::WrongRole {
                operation: "publishing an offer",
                role: self.role,
            }
            .into());
        }
        if self.state != SessionState::Negotiating {
            return Err(ProtocolError::UnexpectedInState {
                kind: MessageKind::Offer,
                state: self.state,
            }
            .into());
        }

        let offer = self.negotiator()?.create_offer().await?;
        self.send(SignalMessage::Offer {
            sdp: offer.sdp.clone(),
        })
        .await?;
        info!("Offer published to room '{}'", self.room);
        Ok(offer)
    }

    pub async fn handle_media_event(&mut self, event: MediaEvent) -> Result<(), SignalingError> {
        if self.is_closed() {
            return Ok(());
        }

        match event {
            MediaEvent::LocalCandidate(candidate) => {
                if !matches!(
                    self.state,
                    SessionState::Negotiating | SessionState::Active
                ) {
                    debug!("Dropping local candidate produced while {:?}", self.state);
                    return Ok(());
                }
                self.send(SignalMessage::Candidate { candidate }).await?;
            }

            MediaEvent::RemoteTrack(track) => {
                info!("Remote {:?} track {} is live", track.kind, track.id);
                let _ = self.events.send(SessionEvent::RemoteTrack(track));

                if self.role == Role::Viewer && self.state == SessionState::Negotiating {
                    self.negotiator()?.mark_connected().await;
                    self.transition(SessionState::Active);
                }
            }

            MediaEvent::ConnectionFailed(reason) => {
                return Err(NegotiationError::Media(reason).into());
            }
        }

        Ok(())
    }

    /// Tears down the negotiator, then the channel. Idempotent.
    pub async fn close(&mut self, reason: CloseReason) {
        if self.is_closed() {
            return;
        }

        match &reason {
            CloseReason::Failed(e) => error!("Closing session in room '{}': {}", self.room, e),
            _ => info!("Closing session in room '{}': {:?}", self.room, reason),
        }

        let channel = self.channel.take();
        let negotiator = self.negotiator.take();

        if reason == CloseReason::LocalDisconnect {
            if let Some(channel) = channel.as_ref().filter(|c| c.is_open()) {
                if let Err(e) = channel.send(&SignalMessage::Leave).await {
                    debug!("Could not announce leave: {}", e);
                }
            }
        }

        if let Some(negotiator) = negotiator {
            negotiator.close().await;
        }
        if let Some(channel) = channel {
            channel.close().await;
        }

        self.transition(SessionState::Closed);
        let _ = self.events.send(SessionEvent::Closed(reason));
    }

    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        let channel = self.channel.as_ref().ok_or(SignalingError::Closed)?;
        channel.send(&message).await
    }

    fn negotiator(&self) -> Result<Arc<SessionNegotiator>, SignalingError> {
        self.negotiator.clone().ok_or(SignalingError::Closed)
    }

    fn require_role(&self, role: Role, kind: MessageKind) -> Result<(), SignalingError> {
        if self.role != role {
            return Err(ProtocolError::UnexpectedForRole {
                kind,
                role: self.role,
            }
            .into());
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            debug!("Ignoring transition {:?} -> {:?}", self.state, next);
            return;
        }

        debug!("Session state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
        let _ = self.events.send(SessionEvent::StateChanged(next));
    }
}
