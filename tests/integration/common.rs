//! Shared setup for multi-peer scenarios

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use peerlink_config::SessionConfig;
use peerlink_types::ControllerState;
use session_engine::testing::{MockCapture, MockPeerConnectionFactory};
use session_engine::{CameraConstraints, PeerSession, SessionHandle};
use signaling_client::MemorySignalingHub;
use std::sync::Arc;
use std::time::Duration;

pub struct Endpoint {
    pub session: PeerSession,
    pub handle: SessionHandle,
    pub factory: Arc<MockPeerConnectionFactory>,
}

/// Start a session attached to `hub`
pub async fn endpoint(hub: &MemorySignalingHub, endpoint_id: &str) -> Result<Endpoint> {
    peerlink_logging::init_test_logging();

    let factory = Arc::new(MockPeerConnectionFactory::new(endpoint_id));
    let session = PeerSession::new(
        &SessionConfig::new(endpoint_id),
        Arc::new(hub.connect(endpoint_id)),
        factory.clone(),
        Arc::new(MockCapture::new()),
    );
    let handle = session.run().await?;
    Ok(Endpoint {
        session,
        handle,
        factory,
    })
}

impl Endpoint {
    pub async fn share_camera(&self, label: &str, remote_endpoint_id: &str) -> Result<String> {
        let controllers = self.session.controllers();
        let id = controllers
            .add_local_camera_controller(label, CameraConstraints::default())
            .await?;
        controllers.share_local_controller(&id, remote_endpoint_id).await?;
        Ok(id)
    }

    pub fn inbound_state(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
    ) -> Option<ControllerState> {
        self.session
            .controllers()
            .inbound_controller(remote_endpoint_id, controller_id)
            .map(|controller| controller.state)
    }

    /// Media object id the remote owner announced for an inbound controller
    pub fn inbound_media(&self, remote_endpoint_id: &str, controller_id: &str) -> Option<String> {
        self.session
            .controllers()
            .inbound_controller(remote_endpoint_id, controller_id)
            .and_then(|controller| controller.media_object_id)
    }

    pub fn outbound_transmission_id(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
    ) -> Option<String> {
        self.session
            .controllers()
            .outbound_controller(remote_endpoint_id, controller_id)
            .and_then(|controller| controller.as_outbound()?.transmission_id.clone())
    }
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually<F>(what: &str, check: F) -> Result<()>
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for {what}"))
}
