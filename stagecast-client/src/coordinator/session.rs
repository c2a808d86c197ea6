use crate::config::ClientConfig;
use crate::coordinator::{CloseReason, SessionEvent, SessionState, SignalingCoordinator};
use crate::error::{ConnectError, NegotiationError, SignalingError, TransportError};
use crate::negotiator::{LocalTrack, MediaBackend, MediaEvent, SessionNegotiator};
use crate::transport::{Connector, TransportEvent};
use stagecast_core::{ParticipantId, Role, RoomId, SessionDescription};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub room: RoomId,
    pub role: Role,
    /// Generated when absent.
    pub participant_id: Option<ParticipantId>,
}

impl ConnectOptions {
    pub fn new(room: impl Into<RoomId>, role: Role) -> Self {
        Self {
            room: room.into(),
            role,
            participant_id: None,
        }
    }

    pub fn with_participant_id(mut self, id: impl Into<ParticipantId>) -> Self {
        self.participant_id = Some(id.into());
        self
    }
}

enum SessionCommand {
    PublishOffer {
        reply: oneshot::Sender<Result<SessionDescription, SignalingError>>,
    },
}

/// Caller-facing handle to a running session. Cheap to clone.
///
/// Dropping every handle disconnects the session.
#[derive(Clone)]
pub struct SessionHandle {
    room: RoomId,
    role: Role,
    participant: ParticipantId,
    negotiator: Arc<SessionNegotiator>,
    commands: mpsc::Sender<SessionCommand>,
    shutdown: mpsc::Sender<oneshot::Sender<()>>,
    state_rx: watch::Receiver<SessionState>,
    events: Arc<Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>>,
}

impl SessionHandle {
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// The session's event stream. Only the first call gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.lock().ok()?.take()
    }

    /// Waits until the session reaches `target` or closes, returning the state reached.
    pub async fn wait_for(&self, target: SessionState) -> SessionState {
        let mut rx = self.state_rx.clone();
        match rx
            .wait_for(|state| *state == target || state.is_terminal())
            .await
        {
            Ok(state) => *state,
            Err(_) => SessionState::Closed,
        }
    }

    /// Attaches a local media source; broadcaster only, before the offer.
    pub async fn attach_track(&self, track: LocalTrack) -> Result<(), SignalingError> {
        self.negotiator.attach_track(track).await
    }

    /// Creates the offer for the attached tracks and sends it to the relay.
    pub async fn publish_offer(&self) -> Result<SessionDescription, SignalingError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::PublishOffer { reply })
            .await
            .map_err(|_| SignalingError::Closed)?;
        rx.await.map_err(|_| SignalingError::Closed)?
    }

    /// Announces `leave`, then closes negotiator and channel. Idempotent.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.shutdown.send(reply).await.is_err() {
            return;
        }
        let _ = rx.await;
    }
}

/// Opens the channel to the relay, creates the media session, joins `options.room`
/// and spawns the task that drives the session.
pub async fn connect(
    config: &ClientConfig,
    connector: Arc<dyn Connector>,
    backend: Arc<dyn MediaBackend>,
    options: ConnectOptions,
) -> Result<SessionHandle, SignalingError> {
    let ConnectOptions {
        room,
        role,
        participant_id,
    } = options;
    if room.is_empty() {
        return Err(ConnectError::InvalidRoom.into());
    }

    let participant = participant_id.unwrap_or_else(ParticipantId::generate);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut coordinator =
        SignalingCoordinator::new(room.clone(), role, participant.clone(), events_tx);

    let endpoint = config.endpoint();
    info!(
        "Connecting to {} as {} {} for room '{}'",
        endpoint, role, participant, room
    );

    let opened = tokio::time::timeout(config.connect_timeout(), connector.open(&endpoint)).await;
    let connection = match opened {
        Ok(Ok(connection)) => connection,
        Ok(Err(e)) => {
            coordinator.close(CloseReason::Failed(e.clone())).await;
            return Err(e);
        }
        Err(_) => {
            let e: SignalingError = ConnectError::Timeout(config.connect_timeout()).into();
            coordinator.close(CloseReason::Failed(e.clone())).await;
            return Err(e);
        }
    };

    let (media_tx, media_rx) = mpsc::unbounded_channel();
    let media = match backend.create_session(&config.ice_servers, media_tx).await {
        Ok(media) => media,
        Err(e) => {
            connection.channel.close().await;
            coordinator.close(CloseReason::Failed(e.clone())).await;
            return Err(e);
        }
    };
    let negotiator = Arc::new(SessionNegotiator::new(role, media));

    if let Err(e) = coordinator
        .begin(connection.channel.clone(), negotiator.clone())
        .await
    {
        coordinator.close(CloseReason::Failed(e.clone())).await;
        return Err(e);
    }

    let (command_tx, command_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
    let state_rx = coordinator.state_changes();

    let driver = SessionDriver {
        coordinator,
        transport: connection.events,
        media: media_rx,
        commands: command_rx,
        shutdown: shutdown_rx,
        negotiation_timeout: config.negotiation_timeout(),
    };
    tokio::spawn(driver.run());

    Ok(SessionHandle {
        room,
        role,
        participant,
        negotiator,
        commands: command_tx,
        shutdown: shutdown_tx,
        state_rx,
        events: Arc::new(Mutex::new(Some(events_rx))),
    })
}

enum Step {
    Shutdown(Option<oneshot::Sender<()>>),
    Command(SessionCommand),
    Transport(Option<TransportEvent>),
    Media(Option<MediaEvent>),
    NegotiationTimeout,
}

/// A disconnect that arrived while a message was being handled.
struct Interrupted(Option<oneshot::Sender<()>>);

struct SessionDriver {
    coordinator: SignalingCoordinator,
    transport: mpsc::UnboundedReceiver<TransportEvent>,
    media: mpsc::UnboundedReceiver<MediaEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    shutdown: mpsc::Receiver<oneshot::Sender<()>>,
    negotiation_timeout: Option<Duration>,
}

impl SessionDriver {
    async fn run(mut self) {
        debug!("Session loop started for room '{}'", self.coordinator.room());

        let mut deadline: Option<Pin<Box<Sleep>>> = None;
        let mut media_open = true;

        while !self.coordinator.is_closed() {
            let awaiting_media = self.coordinator.awaiting_media();
            if !awaiting_media {
                deadline = None;
            } else if deadline.is_none() {
                deadline = self
                    .negotiation_timeout
                    .map(|limit| Box::pin(tokio::time::sleep(limit)));
            }
            let armed = deadline.is_some();

            let step = tokio::select! {
                biased;

                request = self.shutdown.recv() => Step::Shutdown(request),
                Some(command) = self.commands.recv() => Step::Command(command),
                event = self.transport.recv() => Step::Transport(event),
                event = self.media.recv(), if media_open => Step::Media(event),
                _ = expire(&mut deadline), if armed => Step::NegotiationTimeout,
            };

            match step {
                Step::Shutdown(reply) => {
                    self.coordinator.close(CloseReason::LocalDisconnect).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                }

                Step::Command(SessionCommand::PublishOffer { reply }) => {
                    let outcome =
                        interruptible(self.coordinator.publish_offer(), &mut self.shutdown).await;
                    match outcome {
                        Ok(result) => {
                            let fatal = result
                                .as_ref()
                                .err()
                                .filter(|e| e.is_fatal() && !is_misuse(e))
                                .cloned();
                            let _ = reply.send(result);
                            if let Some(e) = fatal {
                                self.coordinator.close(CloseReason::Failed(e)).await;
                            }
                        }
                        Err(interrupted) => {
                            let _ = reply.send(Err(SignalingError::Closed));
                            self.disconnect(interrupted).await;
                        }
                    }
                }

                Step::Transport(Some(TransportEvent::Text(text))) => {
                    let outcome =
                        interruptible(self.coordinator.handle_text(&text), &mut self.shutdown)
                            .await;
                    self.settle(outcome).await;
                }

                Step::Transport(Some(TransportEvent::Failed(reason))) => {
                    let e = TransportError::Dropped(reason).into();
                    self.coordinator.close(CloseReason::Failed(e)).await;
                }

                Step::Transport(Some(TransportEvent::Closed)) | Step::Transport(None) => {
                    let e = TransportError::Dropped("relay closed the connection".into()).into();
                    self.coordinator.close(CloseReason::Failed(e)).await;
                }

                Step::Media(Some(event)) => {
                    let outcome = interruptible(
                        self.coordinator.handle_media_event(event),
                        &mut self.shutdown,
                    )
                    .await;
                    self.settle(outcome).await;
                }

                Step::Media(None) => {
                    debug!("Media session stopped producing events");
                    media_open = false;
                }

                Step::NegotiationTimeout => {
                    let limit = self.negotiation_timeout.unwrap_or_default();
                    let e = NegotiationError::Timeout(limit).into();
                    self.coordinator.close(CloseReason::Failed(e)).await;
                }
            }
        }

        debug!("Session loop finished for room '{}'", self.coordinator.room());
    }

    async fn settle(&mut self, outcome: Result<Result<(), SignalingError>, Interrupted>) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_fatal() => {
                self.coordinator.close(CloseReason::Failed(e)).await;
            }
            Ok(Err(SignalingError::Closed)) => {}
            Ok(Err(e)) => warn!("Ignoring signaling message: {}", e),
            Err(interrupted) => self.disconnect(interrupted).await,
        }
    }

    async fn disconnect(&mut self, interrupted: Interrupted) {
        debug!("In-flight signaling work dropped by disconnect");
        self.coordinator.close(CloseReason::LocalDisconnect).await;
        if let Some(reply) = interrupted.0 {
            let _ = reply.send(());
        }
    }
}

/// Caller mistakes on `publish_offer` are reported without ending the session.
fn is_misuse(e: &SignalingError) -> bool {
    matches!(
        e,
        SignalingError::Negotiation(
            NegotiationError::WrongRole { .. }
                | NegotiationError::NoLocalTracks
                | NegotiationError::OutOfOrder(_)
        )
    )
}

/// Resolves when the armed deadline fires; never resolves when none is armed.
async fn expire(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Runs `work` unless a disconnect arrives first, in which case `work` is
/// dropped before it can send anything.
async fn interruptible<T>(
    work: impl Future<Output = Result<T, SignalingError>>,
    shutdown: &mut mpsc::Receiver<oneshot::Sender<()>>,
) -> Result<Result<T, SignalingError>, Interrupted> {
    tokio::pin!(work);

    tokio::select! {
        biased;

        request = shutdown.recv() => Err(Interrupted(request)),
        result = &mut work => Ok(result),
    }
}
