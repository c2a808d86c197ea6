use crate::error::{NegotiationError, SignalingError};
use async_trait::async_trait;
use stagecast_core::{IceCandidate, IceServerConfig, SessionDescription};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// A caller-supplied media source (camera, display capture) to publish.
#[derive(Clone)]
pub struct LocalTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: MediaKind,
    source: Option<Arc<dyn TrackLocal + Send + Sync>>,
}

impl LocalTrack {
    pub fn new(id: impl Into<String>, stream_id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn TrackLocal + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn source(&self) -> Option<&Arc<dyn TrackLocal + Send + Sync>> {
        self.source.as_ref()
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

/// Inbound media surfaced to the caller once negotiation succeeds.
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: MediaKind,
    handle: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, stream_id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            handle: None,
        }
    }

    pub fn with_handle(mut self, handle: Arc<TrackRemote>) -> Self {
        self.handle = Some(handle);
        self
    }

    /// The platform track to read RTP from, when backed by a real peer connection.
    pub fn handle(&self) -> Option<&Arc<TrackRemote>> {
        self.handle.as_ref()
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Asynchronous notifications from the platform media session.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    ConnectionFailed(String),
}

/// The platform peer connection, reduced to what signaling needs.
#[async_trait]
pub trait MediaSession: Send + Sync {
    async fn add_local_track(&self, track: LocalTrack) -> Result<(), NegotiationError>;

    /// Creates an offer and installs it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;

    /// Creates an answer and installs it as the local description.
    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError>;

    async fn close(&self);
}

/// Creates one media session per signaling session.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn create_session(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Arc<dyn MediaSession>, SignalingError>;
}
