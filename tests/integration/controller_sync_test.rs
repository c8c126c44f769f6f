//! Controller mirroring between full peer sessions over the in-process hub

mod common;

use anyhow::Result;
use common::{endpoint, eventually};
use peerlink_types::{ControllerState, TransmissionState};
use signaling_client::MemorySignalingHub;

#[tokio::test]
async fn test_shared_camera_reaches_remote_peer() -> Result<()> {
    let hub = MemorySignalingHub::new();
    let alice = endpoint(&hub, "alice").await?;
    let bob = endpoint(&hub, "bob").await?;

    let id = alice.share_camera("Front camera", "bob").await?;

    eventually("bob to load the camera", || {
        bob.inbound_state("alice", &id) == Some(ControllerState::Ready)
    })
    .await?;

    let transmission_id = alice
        .outbound_transmission_id("bob", &id)
        .expect("outbound transmission");
    assert_eq!(bob.inbound_media("alice", &id), Some(transmission_id.clone()));

    let object = bob
        .session
        .registry()
        .media_object(&transmission_id)
        .expect("remote media object");
    assert!(object.has_audio);
    assert!(object.has_video);

    let inbound = bob
        .session
        .transmissions()
        .inbound_transmission("alice", &transmission_id)
        .expect("inbound transmission");
    assert_eq!(inbound.label, "Front camera");
    assert_eq!(inbound.state, TransmissionState::Connected);

    eventually("alice to see the remote inbound ready", || {
        alice
            .session
            .controllers()
            .outbound_controller("bob", &id)
            .and_then(|controller| controller.remote().and_then(|remote| remote.remote_state()))
            == Some(ControllerState::Ready)
    })
    .await?;
    eventually("the outbound transmission to connect", || {
        alice
            .session
            .transmissions()
            .outbound_transmission("bob", &transmission_id)
            .map(|transmission| transmission.state)
            == Some(TransmissionState::Connected)
    })
    .await?;

    alice.handle.shutdown().await;
    bob.handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_removing_controller_tears_down_peer() -> Result<()> {
    let hub = MemorySignalingHub::new();
    let alice = endpoint(&hub, "alice").await?;
    let bob = endpoint(&hub, "bob").await?;

    let id = alice.share_camera("Camera", "bob").await?;
    eventually("bob to load the camera", || {
        bob.inbound_state("alice", &id) == Some(ControllerState::Ready)
    })
    .await?;
    let transmission_id = alice
        .outbound_transmission_id("bob", &id)
        .expect("outbound transmission");

    alice.session.controllers().remove_local_controller(&id).await?;

    assert!(!alice.session.transmissions().has_connection("bob"));
    eventually("bob to drop the inbound controller", || {
        bob.inbound_state("alice", &id).is_none()
    })
    .await?;
    eventually("bob to disconnect", || {
        !bob.session.transmissions().has_connection("alice")
    })
    .await?;
    assert!(!bob.session.registry().has_media_object(&transmission_id));
    assert!(alice.factory.connection("bob").expect("connection").is_closed());

    alice.handle.shutdown().await;
    bob.handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unsharing_one_peer_keeps_the_other() -> Result<()> {
    let hub = MemorySignalingHub::new();
    let alice = endpoint(&hub, "alice").await?;
    let bob = endpoint(&hub, "bob").await?;
    let carol = endpoint(&hub, "carol").await?;

    let id = alice.share_camera("Camera", "bob").await?;
    alice
        .session
        .controllers()
        .share_local_controller(&id, "carol")
        .await?;
    eventually("both peers to load the camera", || {
        bob.inbound_state("alice", &id) == Some(ControllerState::Ready)
            && carol.inbound_state("alice", &id) == Some(ControllerState::Ready)
    })
    .await?;

    alice.session.controllers().unshare("bob", &id).await;

    eventually("bob to clean up", || {
        bob.inbound_state("alice", &id).is_none()
            && !bob.session.transmissions().has_connection("alice")
    })
    .await?;
    assert!(!alice.session.transmissions().has_connection("bob"));
    assert!(alice.session.transmissions().has_connection("carol"));
    assert_eq!(carol.inbound_state("alice", &id), Some(ControllerState::Ready));
    assert!(carol.session.transmissions().has_connection("alice"));

    for peer in [alice, bob, carol] {
        peer.handle.shutdown().await;
    }
    Ok(())
}

#[tokio::test]
async fn test_stop_and_restart_propagate() -> Result<()> {
    let hub = MemorySignalingHub::new();
    let alice = endpoint(&hub, "alice").await?;
    let bob = endpoint(&hub, "bob").await?;

    let id = alice.share_camera("Camera", "bob").await?;
    eventually("bob to load the camera", || {
        bob.inbound_state("alice", &id) == Some(ControllerState::Ready)
    })
    .await?;
    let first = bob.inbound_media("alice", &id);

    alice.session.controllers().stop_local_controller(&id)?;
    eventually("bob to see the camera stop", || {
        bob.inbound_state("alice", &id) == Some(ControllerState::Stopped)
    })
    .await?;

    alice.session.controllers().restart_local_controller(&id).await?;
    eventually("bob to load the restarted camera", || {
        bob.inbound_state("alice", &id) == Some(ControllerState::Ready)
            && bob.inbound_media("alice", &id).is_some()
            && bob.inbound_media("alice", &id) != first
    })
    .await?;
    assert!(bob.session.transmissions().has_connection("alice"));

    alice.handle.shutdown().await;
    bob.handle.shutdown().await;
    Ok(())
}
