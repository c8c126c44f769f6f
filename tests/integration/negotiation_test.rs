//! Offer collisions between two peers sharing at the same time

mod common;

use anyhow::Result;
use common::{endpoint, eventually};
use peerlink_types::ControllerState;
use session_engine::ConnectionState;
use signaling_client::MemorySignalingHub;

#[tokio::test]
async fn test_simultaneous_sharing_converges() -> Result<()> {
    let hub = MemorySignalingHub::new();
    let alice = endpoint(&hub, "alice").await?;
    let bob = endpoint(&hub, "bob").await?;
    assert!(bob.session.transmissions().is_polite("alice"));
    assert!(!alice.session.transmissions().is_polite("bob"));

    let from_alice = alice.share_camera("Alice camera", "bob").await?;
    let from_bob = bob.share_camera("Bob camera", "alice").await?;

    eventually("both cameras to arrive", || {
        bob.inbound_state("alice", &from_alice) == Some(ControllerState::Ready)
            && alice.inbound_state("bob", &from_bob) == Some(ControllerState::Ready)
    })
    .await?;

    assert_eq!(alice.factory.created("bob"), 1);
    assert_eq!(bob.factory.created("alice"), 1);
    eventually("both connections to report connected", || {
        alice.session.transmissions().connection_state("bob") == Some(ConnectionState::Connected)
            && bob.session.transmissions().connection_state("alice")
                == Some(ConnectionState::Connected)
    })
    .await?;

    alice.handle.shutdown().await;
    bob.handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_sessions_are_isolated_per_peer() -> Result<()> {
    let hub = MemorySignalingHub::new();
    let alice = endpoint(&hub, "alice").await?;
    let bob = endpoint(&hub, "bob").await?;
    let carol = endpoint(&hub, "carol").await?;

    let id = alice.share_camera("Camera", "bob").await?;
    eventually("bob to load the camera", || {
        bob.inbound_state("alice", &id) == Some(ControllerState::Ready)
    })
    .await?;

    assert!(carol.session.controllers().inbound_controllers("alice").is_empty());
    assert!(!carol.session.transmissions().has_connection("alice"));
    assert!(!alice.session.transmissions().has_connection("carol"));

    for peer in [alice, bob, carol] {
        peer.handle.shutdown().await;
    }
    Ok(())
}
