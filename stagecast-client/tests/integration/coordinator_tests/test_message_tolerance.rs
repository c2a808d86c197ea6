use stagecast_client::{ProtocolError, SessionState, SignalingError};
use stagecast_core::{MessageKind, Role};

use super::joined;
use crate::integration::init_tracing;
use crate::utils::MediaCall;

#[tokio::test]
async fn test_relay_chatter_is_ignored() {
    init_tracing();

    let mut session = joined(Role::Viewer, "v1").await;

    for text in [
        "not json at all",
        "[1, 2, 3]",
        r#"{"sdp":"v=0"}"#,
        r#"{"type":"viewer-count","count":3}"#,
        r#"{"type":"ping"}"#,
    ] {
        assert_eq!(session.coordinator.handle_text(text).await, Ok(()));
    }

    assert_eq!(session.coordinator.state(), SessionState::Negotiating);
    assert!(session.media.calls().await.is_empty());
}

#[tokio::test]
async fn test_role_inappropriate_messages_are_tolerated() {
    init_tracing();

    let mut viewer = joined(Role::Viewer, "v1").await;
    let err = viewer
        .coordinator
        .handle_text(r#"{"type":"answer","sdp":"sdp-x"}"#)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SignalingError::Protocol(ProtocolError::UnexpectedForRole {
            kind: MessageKind::Answer,
            role: Role::Viewer,
        })
    ));
    assert!(!err.is_fatal());

    let mut broadcaster = joined(Role::Broadcaster, "b1").await;
    let err = broadcaster
        .coordinator
        .handle_text(r#"{"type":"offer","sdp":"sdp-x"}"#)
        .await
        .unwrap_err();
    assert!(!err.is_fatal());

    let echo = broadcaster
        .coordinator
        .handle_text(r#"{"type":"join","room":"r1","id":"v1"}"#)
        .await
        .unwrap_err();
    assert!(!echo.is_fatal());

    assert_eq!(viewer.coordinator.state(), SessionState::Negotiating);
    assert_eq!(broadcaster.coordinator.state(), SessionState::Negotiating);
    assert!(viewer.media.calls().await.is_empty());
}

#[tokio::test]
async fn test_malformed_known_message_is_fatal() {
    init_tracing();

    let mut session = joined(Role::Viewer, "v1").await;

    for text in [
        r#"{"type":"offer"}"#,
        r#"{"type":"offer","sdp":7}"#,
        r#"{"type":"candidate","candidate":"not-an-object"}"#,
        r#"{"type":"offer","sdp":"v=0","room":"r1"}"#,
    ] {
        let err = session.coordinator.handle_text(text).await.unwrap_err();
        assert!(
            matches!(err, SignalingError::Protocol(ProtocolError::Malformed { .. })),
            "{} should be malformed, got {:?}",
            text,
            err
        );
        assert!(err.is_fatal());
    }
}

#[tokio::test]
async fn test_candidates_apply_regardless_of_phase() {
    init_tracing();

    let mut session = joined(Role::Viewer, "v1").await;

    session
        .coordinator
        .handle_text(r#"{"type":"candidate","candidate":{"candidate":"c1","sdpMid":"0","sdpMLineIndex":0}}"#)
        .await
        .unwrap();
    session
        .coordinator
        .handle_text(r#"{"type":"offer","sdp":"sdp-b1"}"#)
        .await
        .unwrap();
    session
        .coordinator
        .handle_text(r#"{"type":"candidate","candidate":{"candidate":"c2"}}"#)
        .await
        .unwrap();

    let calls = session.media.calls().await;
    let set_remote = calls
        .iter()
        .position(|c| matches!(c, MediaCall::SetRemote(_)))
        .expect("offer applied");
    let first_candidate = calls
        .iter()
        .position(|c| matches!(c, MediaCall::AddCandidate(_)))
        .expect("candidate applied");
    assert!(set_remote < first_candidate);
    assert_eq!(session.media.applied_candidates().await, vec!["c1", "c2"]);
    assert_eq!(session.channel.count(MessageKind::Answer).await, 1);
}
