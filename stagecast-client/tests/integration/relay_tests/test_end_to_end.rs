use anyhow::Result;
use stagecast_client::{
    ClientConfig, CloseReason, ConnectOptions, LocalTrack, MediaKind, SessionHandle,
    SessionState, WsConnector, connect,
};
use stagecast_core::{Role, SessionDescription};
use stagecast_relay::{RelayConfig, bind};
use std::sync::Arc;

use crate::integration::init_tracing;
use crate::utils::{FakeMediaBackend, MediaCall, wait_for_close, wait_for_state, wait_until};

/// Runs a relay on an ephemeral port and returns a client config for it.
async fn relay_config() -> Result<ClientConfig> {
    let server = bind(&RelayConfig::new("127.0.0.1:0")).await?;
    let addr = server.local_addr()?;
    tokio::spawn(server.run());

    Ok(ClientConfig {
        ice_servers: Vec::new(),
        ..ClientConfig::new(format!("ws://{}", addr))
    })
}

async fn join(
    config: &ClientConfig,
    backend: &FakeMediaBackend,
    role: Role,
    id: &str,
) -> Result<SessionHandle> {
    let handle = connect(
        config,
        Arc::new(WsConnector),
        Arc::new(backend.clone()),
        ConnectOptions::new("r1", role).with_participant_id(id),
    )
    .await?;
    Ok(handle)
}

#[tokio::test]
async fn test_broadcast_through_relay_until_broadcaster_leaves() {
    init_tracing();

    let config = relay_config().await.expect("relay starts");
    let b_backend = FakeMediaBackend::new("b1");
    let v_backend = FakeMediaBackend::new("v1");

    let broadcaster = join(&config, &b_backend, Role::Broadcaster, "b1")
        .await
        .expect("broadcaster connects");
    let mut b_events = broadcaster.take_events().unwrap();
    assert_eq!(broadcaster.state(), SessionState::Negotiating);

    broadcaster
        .attach_track(LocalTrack::new("cam", "stream-b1", MediaKind::Video))
        .await
        .unwrap();
    broadcaster.publish_offer().await.unwrap();

    let viewer = join(&config, &v_backend, Role::Viewer, "v1")
        .await
        .expect("viewer connects");
    let mut v_events = viewer.take_events().unwrap();

    wait_for_state(&viewer, SessionState::Active).await.unwrap();
    wait_for_state(&broadcaster, SessionState::Active)
        .await
        .unwrap();

    let b_media = b_backend.session().await.unwrap();
    let v_media = v_backend.session().await.unwrap();
    assert!(
        v_media
            .calls()
            .await
            .contains(&MediaCall::SetRemote(SessionDescription::offer("sdp-b1")))
    );
    assert!(
        b_media
            .calls()
            .await
            .contains(&MediaCall::SetRemote(SessionDescription::answer("sdp-v1")))
    );

    b_media.emit_local_candidate("cand-b1");
    v_media.emit_local_candidate("cand-v1");
    wait_until("broadcaster candidate at viewer", || {
        let media = v_media.clone();
        async move { media.applied_candidates().await.contains(&"cand-b1".to_owned()) }
    })
    .await
    .unwrap();
    wait_until("viewer candidate at broadcaster", || {
        let media = b_media.clone();
        async move { media.applied_candidates().await.contains(&"cand-v1".to_owned()) }
    })
    .await
    .unwrap();

    broadcaster.disconnect().await;

    assert_eq!(
        wait_for_close(&mut b_events).await.unwrap(),
        CloseReason::LocalDisconnect
    );
    assert_eq!(
        wait_for_close(&mut v_events).await.unwrap(),
        CloseReason::RemoteLeave
    );
    assert_eq!(broadcaster.state(), SessionState::Closed);
    assert_eq!(viewer.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_viewer_leave_closes_both_sides() {
    init_tracing();

    let config = relay_config().await.unwrap();
    let b_backend = FakeMediaBackend::new("b1");
    let v_backend = FakeMediaBackend::new("v1");

    let viewer = join(&config, &v_backend, Role::Viewer, "v1").await.unwrap();
    let mut v_events = viewer.take_events().unwrap();

    let broadcaster = join(&config, &b_backend, Role::Broadcaster, "b1")
        .await
        .unwrap();
    let mut b_events = broadcaster.take_events().unwrap();
    broadcaster
        .attach_track(LocalTrack::new("cam", "stream-b1", MediaKind::Video))
        .await
        .unwrap();
    broadcaster.publish_offer().await.unwrap();

    wait_for_state(&viewer, SessionState::Active).await.unwrap();
    wait_for_state(&broadcaster, SessionState::Active)
        .await
        .unwrap();

    viewer.disconnect().await;

    assert_eq!(
        wait_for_close(&mut v_events).await.unwrap(),
        CloseReason::LocalDisconnect
    );
    assert_eq!(
        wait_for_close(&mut b_events).await.unwrap(),
        CloseReason::RemoteLeave
    );
}

#[tokio::test]
async fn test_second_viewer_does_not_end_the_broadcast() {
    init_tracing();

    let config = relay_config().await.unwrap();
    let b_backend = FakeMediaBackend::new("b1");
    let first_backend = FakeMediaBackend::new("v1");
    let second_backend = FakeMediaBackend::new("v2");

    let broadcaster = join(&config, &b_backend, Role::Broadcaster, "b1")
        .await
        .unwrap();
    let mut b_events = broadcaster.take_events().unwrap();
    broadcaster
        .attach_track(LocalTrack::new("cam", "stream-b1", MediaKind::Video))
        .await
        .unwrap();
    broadcaster.publish_offer().await.unwrap();

    let first = join(&config, &first_backend, Role::Viewer, "v1").await.unwrap();
    wait_for_state(&broadcaster, SessionState::Active)
        .await
        .unwrap();

    let second = join(&config, &second_backend, Role::Viewer, "v2")
        .await
        .unwrap();
    wait_until("second viewer answered", || {
        let backend = second_backend.clone();
        async move {
            match backend.session().await {
                Some(media) => media.calls().await.contains(&MediaCall::CreateAnswer),
                None => false,
            }
        }
    })
    .await
    .unwrap();

    // Give the relay time to route anything the second viewer sent.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(broadcaster.state(), SessionState::Active);

    let b_media = b_backend.session().await.unwrap();
    assert!(
        !b_media
            .calls()
            .await
            .contains(&MediaCall::SetRemote(SessionDescription::answer("sdp-v2")))
    );

    second.disconnect().await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(broadcaster.state(), SessionState::Active);

    first.disconnect().await;
    assert_eq!(
        wait_for_close(&mut b_events).await.unwrap(),
        CloseReason::RemoteLeave
    );
}
