//! Integration tests for the NATS signaling channel
//!
//! These tests require a running NATS server on localhost:4222.

use futures::StreamExt;
use peerlink_types::{RemoveInboundController, SignalingMessage};
use signaling_client::{NatsSignalingChannel, SignalingChannel};
use std::time::Duration;

#[tokio::test]
#[ignore] // Requires NATS server
async fn test_nats_signal_round_trip() {
    let alice = NatsSignalingChannel::new("nats://localhost:4222", "alice", None)
        .await
        .expect("Failed to connect");
    let bob = NatsSignalingChannel::new("nats://localhost:4222", "bob", None)
        .await
        .expect("Failed to connect");

    let mut inbox = bob.subscribe().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let message = SignalingMessage::RemoveInboundController(RemoveInboundController {
        controller_id: "c1".to_string(),
    });
    alice.send("bob", message.clone()).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), inbox.next())
        .await
        .expect("Timed out waiting for signal")
        .expect("Stream ended")
        .expect("Decode failed");

    assert_eq!(received.from, "alice");
    assert_eq!(received.message, message);
}
