use stagecast_core::SignalMessage;

use crate::integration::init_tracing;
use crate::utils::{TestPeer, start_relay};

#[tokio::test]
async fn test_noise_is_dropped_and_socket_survives() {
    init_tracing();

    let (url, _state) = start_relay().await.unwrap();

    let mut stranger = TestPeer::connect(&url, "stranger").await.unwrap();
    stranger.offer("sdp-x").await.unwrap();
    stranger.send_raw("definitely not json").await.unwrap();

    let mut broadcaster = TestPeer::joined(&url, "r1", "b1").await.unwrap();
    let mut viewer = TestPeer::joined(&url, "r1", "v1").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    broadcaster.send_raw("{\"type\":\"viewer-count\",\"count\":1}").await.unwrap();
    broadcaster.send_raw("{\"type\":\"offer\"}").await.unwrap();
    broadcaster.send_raw("[]").await.unwrap();
    viewer.expect_silence().await.unwrap();
    stranger.expect_silence().await.unwrap();

    broadcaster.offer("sdp-b").await.unwrap();
    assert_eq!(
        viewer.recv().await.unwrap(),
        SignalMessage::Offer {
            sdp: "sdp-b".into()
        }
    );
}
