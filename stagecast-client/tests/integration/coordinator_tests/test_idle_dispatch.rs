use stagecast_client::{
    CloseReason, LocalTrack, MediaKind, NegotiationError, ProtocolError, SessionEvent,
    SessionState, SignalingCoordinator, SignalingError,
};
use stagecast_core::{MessageKind, Role, SessionDescription, SignalMessage};
use tokio::sync::mpsc;

use super::joined;
use crate::integration::init_tracing;
use crate::utils::MediaCall;

#[tokio::test]
async fn test_answer_while_idle_is_a_protocol_error() {
    init_tracing();

    let (events_tx, _events) = mpsc::unbounded_channel();
    let mut coordinator =
        SignalingCoordinator::new("r1".into(), Role::Broadcaster, "b1".into(), events_tx);

    let result = coordinator
        .dispatch(SignalMessage::Answer {
            sdp: "sdp-v1".into(),
        })
        .await;
    assert_eq!(
        result,
        Err(SignalingError::Protocol(ProtocolError::UnexpectedInState {
            kind: MessageKind::Answer,
            state: SessionState::Idle,
        }))
    );

    let from_text = coordinator
        .handle_text(r#"{"type":"answer","sdp":"sdp-v1"}"#)
        .await;
    assert!(matches!(
        from_text,
        Err(SignalingError::Protocol(
            ProtocolError::UnexpectedInState { .. }
        ))
    ));

    assert_eq!(coordinator.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_broadcaster_is_negotiating_before_any_answer() {
    init_tracing();

    let mut session = joined(Role::Broadcaster, "b1").await;
    assert_eq!(session.coordinator.state(), SessionState::Negotiating);
    assert_eq!(
        session.channel.sent().await,
        vec![SignalMessage::Join {
            room: "r1".into(),
            id: "b1".into(),
        }]
    );

    session
        .negotiator
        .attach_track(LocalTrack::new("cam", "stream", MediaKind::Video))
        .await
        .unwrap();
    let offer = session.coordinator.publish_offer().await.unwrap();
    assert_eq!(offer.sdp, "sdp-b1");

    session
        .coordinator
        .dispatch(SignalMessage::Answer {
            sdp: "sdp-v1".into(),
        })
        .await
        .unwrap();

    assert_eq!(session.coordinator.state(), SessionState::Active);
    assert_eq!(
        session.channel.sent_kinds().await,
        vec![MessageKind::Join, MessageKind::Offer]
    );
    assert!(
        session
            .media
            .calls()
            .await
            .contains(&MediaCall::SetRemote(SessionDescription::answer("sdp-v1")))
    );

    let mut states = Vec::new();
    while let Ok(SessionEvent::StateChanged(state)) = session.events.try_recv() {
        states.push(state);
    }
    assert_eq!(
        states,
        vec![
            SessionState::Joining,
            SessionState::Negotiating,
            SessionState::Active
        ]
    );
}

#[tokio::test]
async fn test_viewer_cannot_publish_an_offer() {
    init_tracing();

    let mut session = joined(Role::Viewer, "v1").await;
    assert!(matches!(
        session.coordinator.publish_offer().await,
        Err(SignalingError::Negotiation(NegotiationError::WrongRole { .. }))
    ));
    assert_eq!(session.channel.count(MessageKind::Offer).await, 0);
}

#[tokio::test]
async fn test_close_twice_sends_nothing_more() {
    init_tracing();

    let mut session = joined(Role::Viewer, "v1").await;

    session.coordinator.close(CloseReason::LocalDisconnect).await;
    session.coordinator.close(CloseReason::LocalDisconnect).await;

    assert_eq!(session.coordinator.state(), SessionState::Closed);
    assert_eq!(
        session.channel.sent_kinds().await,
        vec![MessageKind::Join, MessageKind::Leave]
    );
    assert_eq!(session.channel.close_count(), 1);
    assert_eq!(session.media.close_count().await, 1);

    // Late traffic after close is rejected without touching the channel.
    let late = session
        .coordinator
        .dispatch(SignalMessage::Offer {
            sdp: "sdp-b1".into(),
        })
        .await;
    assert!(late.is_err());
    assert_eq!(session.channel.sent().await.len(), 2);
    assert_eq!(session.channel.rejected_sends(), 0);

    let mut closed = 0;
    while let Ok(event) = session.events.try_recv() {
        if matches!(event, SessionEvent::Closed(_)) {
            closed += 1;
        }
    }
    assert_eq!(closed, 1);
}

#[tokio::test]
async fn test_answer_while_active_is_not_applied() {
    init_tracing();

    let mut session = joined(Role::Broadcaster, "b1").await;
    session
        .negotiator
        .attach_track(LocalTrack::new("cam", "stream", MediaKind::Video))
        .await
        .unwrap();
    session.coordinator.publish_offer().await.unwrap();
    session
        .coordinator
        .dispatch(SignalMessage::Answer {
            sdp: "sdp-v1".into(),
        })
        .await
        .unwrap();

    let late = session
        .coordinator
        .dispatch(SignalMessage::Answer {
            sdp: "sdp-v2".into(),
        })
        .await;
    assert_eq!(
        late,
        Err(SignalingError::Protocol(ProtocolError::UnexpectedInState {
            kind: MessageKind::Answer,
            state: SessionState::Active,
        }))
    );
    assert!(!late.unwrap_err().is_fatal());
    assert_eq!(session.coordinator.state(), SessionState::Active);
    assert!(
        !session
            .media
            .calls()
            .await
            .contains(&MediaCall::SetRemote(SessionDescription::answer("sdp-v2")))
    );
}
