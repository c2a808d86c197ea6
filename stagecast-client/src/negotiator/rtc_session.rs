use crate::error::{NegotiationError, SignalingError};
use crate::negotiator::{LocalTrack, MediaBackend, MediaEvent, MediaKind, MediaSession, RemoteTrack};
use async_trait::async_trait;
use stagecast_core::{IceCandidate, IceServerConfig, SdpKind, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Media backend on top of the `webrtc` crate.
#[derive(Debug, Clone, Default)]
pub struct RtcMediaBackend;

#[async_trait]
impl MediaBackend for RtcMediaBackend {
    async fn create_session(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Arc<dyn MediaSession>, SignalingError> {
        let session = RtcMediaSession::new(ice_servers, events)
            .await
            .map_err(media_error)?;
        Ok(Arc::new(session))
    }
}

pub struct RtcMediaSession {
    peer_connection: Arc<RTCPeerConnection>,
}

impl RtcMediaSession {
    pub async fn new(
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Self, webrtc::Error> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();

                Box::pin(async move {
                    info!("Peer connection state changed: {:?}", s);
                    if s == RTCPeerConnectionState::Failed {
                        let _ = tx.send(MediaEvent::ConnectionFailed(
                            "peer connection failed".to_owned(),
                        ));
                    }
                })
            },
        ));

        let ice_tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx.send(MediaEvent::LocalCandidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                }));
            })
        }));

        let track_tx = events;
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let tx = track_tx.clone();

            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => MediaKind::Audio,
                    _ => MediaKind::Video,
                };
                debug!("Remote {:?} track {} available", kind, track.id());

                let remote = RemoteTrack::new(track.id(), track.stream_id(), kind)
                    .with_handle(track.clone());
                let _ = tx.send(MediaEvent::RemoteTrack(remote));
            })
        }));

        Ok(Self { peer_connection })
    }
}

#[async_trait]
impl MediaSession for RtcMediaSession {
    async fn add_local_track(&self, track: LocalTrack) -> Result<(), NegotiationError> {
        let Some(source) = track.source().cloned() else {
            return Err(NegotiationError::Media(format!(
                "track {} has no media source",
                track.id
            )));
        };

        let sender = self
            .peer_connection
            .add_track(source)
            .await
            .map_err(media_error)?;

        // RTCP has to be drained for the interceptors to work.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(media_error)?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .map_err(media_error)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(media_error)?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await
            .map_err(media_error)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        let desc = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(|e| NegotiationError::InvalidDescription(e.to_string()))?;

        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(media_error)?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(media_error)?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.peer_connection.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
    }
}

fn media_error(e: webrtc::Error) -> NegotiationError {
    NegotiationError::Media(e.to_string())
}
