//! Peer session facade
//!
//! Wires one media registry, transmission manager and controller manager to
//! a shared signaling channel and runs their background loops.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use futures::StreamExt;
use peerlink_config::SessionConfig;
use peerlink_types::SignalingMessage;
use signaling_client::SignalingChannel;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::controller_manager::ControllerManager;
use crate::error::SessionResult;
use crate::media_capture::MediaCapture;
use crate::media_registry::MediaRegistry;
use crate::transmission_manager::TransmissionManager;
use crate::transport::{PeerConnectionFactory, TransportConfig};

/// Everything one endpoint needs to take part in peer sessions
#[derive(Clone)]
pub struct PeerSession {
    signaling: Arc<dyn SignalingChannel>,
    registry: Arc<MediaRegistry>,
    transmissions: Arc<TransmissionManager>,
    controllers: Arc<ControllerManager>,
}

impl PeerSession {
    pub fn new(
        config: &SessionConfig,
        signaling: Arc<dyn SignalingChannel>,
        factory: Arc<dyn PeerConnectionFactory>,
        capture: Arc<dyn MediaCapture>,
    ) -> Self {
        let registry = MediaRegistry::new(capture);
        let transmissions = Arc::new(TransmissionManager::new(
            &config.endpoint_id,
            TransportConfig::from(config),
            factory,
            Arc::clone(&signaling),
            Arc::clone(&registry),
        ));
        let controllers = Arc::new(ControllerManager::new(
            Arc::clone(&registry),
            Arc::clone(&transmissions),
            Arc::clone(&signaling),
        ));

        info!(
            endpoint_id = %config.endpoint_id,
            signaling = %signaling.client_type(),
            "Peer session created"
        );

        Self {
            signaling,
            registry,
            transmissions,
            controllers,
        }
    }

    pub fn endpoint_id(&self) -> String {
        self.transmissions.local_endpoint_id()
    }

    pub fn registry(&self) -> &Arc<MediaRegistry> {
        &self.registry
    }

    pub fn transmissions(&self) -> &Arc<TransmissionManager> {
        &self.transmissions
    }

    pub fn controllers(&self) -> &Arc<ControllerManager> {
        &self.controllers
    }

    /// Route one inbound message to the manager that owns its kind
    pub async fn handle_signal(&self, from: &str, message: SignalingMessage) -> SessionResult<()> {
        debug!(from = %from, kind = %message.kind(), "Signal received");
        if message.kind().is_transmission() {
            self.transmissions.handle_signal(from, message).await
        } else {
            self.controllers.handle_signal(from, message).await
        }
    }

    /// Start the signal loop, the transport event loop and the controller
    /// pump
    pub async fn run(&self) -> SessionResult<SessionHandle> {
        let mut signals = self.signaling.subscribe().await?;
        let transport_loop = self.transmissions.spawn_event_loop().await?;
        let controller_pump = self.controllers.spawn();

        let session = self.clone();
        let signal_loop = tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                match signal {
                    Ok(signal) => {
                        let kind = signal.message.kind();
                        if let Err(e) = session.handle_signal(&signal.from, signal.message).await {
                            warn!(
                                from = %signal.from,
                                kind = %kind,
                                error = %e,
                                "Failed to handle signal"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping undecodable signal"),
                }
            }
            debug!("Signal stream ended");
        });

        info!(endpoint_id = %self.endpoint_id(), "Peer session running");
        Ok(SessionHandle {
            session: self.clone(),
            tasks: vec![signal_loop, transport_loop, controller_pump],
        })
    }
}

/// Background loops of a running session
pub struct SessionHandle {
    session: PeerSession,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    /// Abort the loops and tear down every controller, connection and media
    /// object
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            // aborted tasks resolve with a cancellation error
            let _ = task.await;
        }

        self.session.controllers.destroy().await;
        self.session.transmissions.destroy();
        self.session.registry.destroy();
        info!(endpoint_id = %self.session.endpoint_id(), "Peer session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_capture::CameraConstraints;
    use crate::testing::{MockCapture, MockPeerConnectionFactory, RecordingSignaling};
    use peerlink_types::{
        AddInboundController, AddInboundTransmission, ControllerKind, ControllerState, MediaKind,
    };

    fn session(endpoint_id: &str) -> (PeerSession, Arc<RecordingSignaling>) {
        let signaling = Arc::new(RecordingSignaling::new(endpoint_id));
        let session = PeerSession::new(
            &SessionConfig::new(endpoint_id),
            signaling.clone(),
            Arc::new(MockPeerConnectionFactory::new(endpoint_id)),
            Arc::new(MockCapture::new()),
        );
        (session, signaling)
    }

    #[tokio::test]
    async fn test_routes_controller_messages() {
        let (session, _) = session("alice");
        let message = SignalingMessage::AddInboundController(AddInboundController {
            controller_id: "c1".to_string(),
            label: "Camera".to_string(),
            state: ControllerState::Starting,
            kind: ControllerKind::Camera,
        });

        session.handle_signal("bob", message).await.unwrap();

        assert!(session.controllers().inbound_controller("bob", "c1").is_some());
        assert!(!session.transmissions().has_connection("bob"));
    }

    #[tokio::test]
    async fn test_routes_transmission_messages() {
        let (session, _) = session("alice");
        let message = SignalingMessage::AddInboundTransmission(AddInboundTransmission {
            transmission_id: "t1".to_string(),
            label: "Camera".to_string(),
            kind: MediaKind::Stream,
        });

        session.handle_signal("bob", message).await.unwrap();

        assert!(session.transmissions().has_connection("bob"));
        assert!(session.transmissions().inbound_transmission("bob", "t1").is_some());
        assert!(session.controllers().inbound_controllers("bob").is_empty());
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let (session, _) = session("alice");
        let handle = session.run().await.unwrap();
        assert!(session.run().await.is_err());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let (session, signaling) = session("alice");
        let handle = session.run().await.unwrap();

        let id = session
            .controllers()
            .add_local_camera_controller("Camera", CameraConstraints::default())
            .await
            .unwrap();
        session
            .controllers()
            .share_local_controller(&id, "bob")
            .await
            .unwrap();
        assert!(session.registry().has_media_object(&id));

        handle.shutdown().await;

        assert!(session.controllers().local_controllers().is_empty());
        assert!(session.registry().media_object_ids().is_empty());
        assert!(!session.transmissions().has_connection("bob"));
        assert!(!signaling.sent_to("bob").is_empty());
    }
}
