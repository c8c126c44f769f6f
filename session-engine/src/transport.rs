//! Peer connection seam
//!
//! The native transport (ICE, DTLS, RTP) is an external collaborator. A
//! [`PeerConnectionFactory`] creates one [`PeerConnection`] per remote
//! endpoint; the connection reports asynchronous happenings through a
//! [`TransportEventSink`] that feeds the transmission manager's event loop.
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


use async_trait::async_trait;
use peerlink_config::{IceServerConfig, SessionConfig};
use peerlink_types::{IceCandidateInit, SessionDescriptionInit};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::SessionResult;
use crate::media_stream::{MediaStream, MediaTrack};

/// Offer/answer state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Connection state as reported by the native transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Connection state exposed to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<NativeConnectionState> for ConnectionState {
    fn from(state: NativeConnectionState) -> Self {
        match state {
            NativeConnectionState::New | NativeConnectionState::Connecting => {
                ConnectionState::Connecting
            }
            NativeConnectionState::Connected => ConnectionState::Connected,
            NativeConnectionState::Disconnected => ConnectionState::Disconnected,
            NativeConnectionState::Failed => ConnectionState::Failed,
            NativeConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Failed => "FAILED",
            ConnectionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// A remote track arrived on a connection
#[derive(Debug, Clone)]
pub struct TrackEvent {
    /// Mid of the transceiver that received the track
    pub mid: Option<String>,
    pub track: Arc<dyn MediaTrack>,
    /// Remote streams the track belongs to
    pub streams: Vec<Arc<dyn MediaStream>>,
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    NegotiationNeeded,
    /// `None` marks the end of candidate gathering
    IceCandidate(Option<IceCandidateInit>),
    Track(TrackEvent),
    ConnectionStateChanged(NativeConnectionState),
}

/// Tagged sender handed to each connection at creation
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    remote_endpoint_id: String,
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedTransportEvent>,
}

/// Transport event together with the connection that raised it
#[derive(Debug, Clone)]
pub struct TaggedTransportEvent {
    pub remote_endpoint_id: String,
    /// Distinguishes a replaced connection from its successor
    pub generation: u64,
    pub event: TransportEvent,
}

impl TransportEventSink {
    pub(crate) fn new(
        remote_endpoint_id: &str,
        generation: u64,
        tx: mpsc::UnboundedSender<TaggedTransportEvent>,
    ) -> Self {
        Self {
            remote_endpoint_id: remote_endpoint_id.to_string(),
            generation,
            tx,
        }
    }

    pub fn remote_endpoint_id(&self) -> &str {
        &self.remote_endpoint_id
    }

    /// Queue an event; events raised after the manager is gone are dropped
    pub fn emit(&self, event: TransportEvent) {
        trace!(remote = %self.remote_endpoint_id, event = ?event, "Transport event");
        let _ = self.tx.send(TaggedTransportEvent {
            remote_endpoint_id: self.remote_endpoint_id.clone(),
            generation: self.generation,
            event,
        });
    }
}

/// Sender attached to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpSenderInfo {
    pub sender_id: String,
    pub track_id: Option<String>,
}

/// Parameters for new connections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl From<&SessionConfig> for TransportConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
        }
    }
}

/// One native connection to a remote endpoint
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn signaling_state(&self) -> SignalingState;

    fn local_description(&self) -> Option<SessionDescriptionInit>;

    fn remote_description(&self) -> Option<SessionDescriptionInit>;

    /// Create and apply the implicit offer or answer for the current state
    async fn set_local_description(&self) -> SessionResult<SessionDescriptionInit>;

    /// Apply a remote description. A remote offer while a local offer is
    /// pending rolls the local offer back.
    async fn set_remote_description(
        &self,
        description: SessionDescriptionInit,
    ) -> SessionResult<()>;

    async fn add_ice_candidate(&self, candidate: Option<IceCandidateInit>) -> SessionResult<()>;

    /// Attach a track and return the id of its sender
    fn add_track(
        &self,
        track: Arc<dyn MediaTrack>,
        stream: &Arc<dyn MediaStream>,
    ) -> SessionResult<String>;

    fn remove_track(&self, sender_id: &str) -> SessionResult<()>;

    fn senders(&self) -> Vec<RtpSenderInfo>;

    fn close(&self);
}

/// Creates connections for the transmission manager
pub trait PeerConnectionFactory: Send + Sync {
    fn create(
        &self,
        remote_endpoint_id: &str,
        config: &TransportConfig,
        events: TransportEventSink,
    ) -> SessionResult<Arc<dyn PeerConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_state_mapping() {
        assert_eq!(
            ConnectionState::from(NativeConnectionState::New),
            ConnectionState::Connecting
        );
        assert_eq!(
            ConnectionState::from(NativeConnectionState::Connecting),
            ConnectionState::Connecting
        );
        assert_eq!(
            ConnectionState::from(NativeConnectionState::Failed),
            ConnectionState::Failed
        );
        assert_eq!(ConnectionState::Disconnected.to_string(), "DISCONNECTED");
    }

    #[tokio::test]
    async fn test_sink_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = TransportEventSink::new("bob", 3, tx);

        sink.emit(TransportEvent::NegotiationNeeded);

        let tagged = rx.recv().await.unwrap();
        assert_eq!(tagged.remote_endpoint_id, "bob");
        assert_eq!(tagged.generation, 3);
        assert!(matches!(tagged.event, TransportEvent::NegotiationNeeded));
    }

    #[test]
    fn test_transport_config_from_session() {
        let config = SessionConfig::new("alice");
        let transport = TransportConfig::from(&config);
        assert_eq!(transport.ice_servers, config.ice_servers);
    }
}
