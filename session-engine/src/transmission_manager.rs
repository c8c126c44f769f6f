//! Transmission manager
//!
//! Owns one peer connection per remote endpoint and negotiates it with the
//! perfect negotiation pattern: both sides renegotiate freely and a
//! deterministic polite/impolite tie-break resolves colliding offers. On top
//! of each connection it keeps registries of outbound and inbound
//! transmissions, and correlates inbound tracks to the transmission ids
//! announced in the remote session description.
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


use peerlink_types::{
    AddInboundTransmission, IceCandidateInit, MediaKind, OutboundTransmissionStateChange,
    RemoveInboundTransmission, SessionDescriptionInit, SignalingMessage, TransmissionState,
};
use signaling_client::SignalingChannel;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::listeners::{IdListeners, ListenerEvent, Subscription};
use crate::media_registry::MediaRegistry;
use crate::media_stream::MediaStream;
use crate::sdp::SessionDescription;
use crate::transport::{
    ConnectionState, NativeConnectionState, PeerConnection, PeerConnectionFactory,
    SignalingState, TaggedTransportEvent, TrackEvent, TransportConfig, TransportEvent,
    TransportEventSink,
};

/// Key of a transmission listener: remote endpoint id and transmission id
pub type TransmissionKey = (String, String);

/// One logical media flow on a peer connection
#[derive(Debug, Clone)]
pub struct Transmission {
    pub transmission_id: String,
    pub remote_endpoint_id: String,
    pub kind: MediaKind,
    pub label: String,
    pub state: TransmissionState,
    /// Local stream for outbound, correlated remote stream for inbound
    pub stream: Option<Arc<dyn MediaStream>>,
}

#[derive(Debug)]
struct OutboundRecord {
    transmission: Transmission,
    sender_ids: Vec<String>,
}

struct PeerConnectionEntry {
    pc: Arc<dyn PeerConnection>,
    generation: u64,
    making_offer: bool,
    ignore_offer: bool,
    answer_pending: bool,
    connection_state: ConnectionState,
    outbound: HashMap<String, OutboundRecord>,
    inbound: HashMap<String, Transmission>,
}

/// Clears `making_offer` on every exit path of offer generation
struct MakingOfferGuard<'a> {
    manager: &'a TransmissionManager,
    remote_endpoint_id: &'a str,
    generation: u64,
}

impl<'a> MakingOfferGuard<'a> {
    fn engage(
        manager: &'a TransmissionManager,
        remote_endpoint_id: &'a str,
        generation: u64,
    ) -> Self {
        manager.with_entry(remote_endpoint_id, generation, |entry| entry.making_offer = true);
        Self {
            manager,
            remote_endpoint_id,
            generation,
        }
    }
}

impl Drop for MakingOfferGuard<'_> {
    fn drop(&mut self) {
        self.manager
            .with_entry(self.remote_endpoint_id, self.generation, |entry| {
                entry.making_offer = false
            });
    }
}

pub struct TransmissionManager {
    local_endpoint_id: RwLock<String>,
    transport_config: TransportConfig,
    factory: Arc<dyn PeerConnectionFactory>,
    signaling: Arc<dyn SignalingChannel>,
    registry: Arc<MediaRegistry>,
    connections: Mutex<HashMap<String, PeerConnectionEntry>>,
    /// Peers disconnected locally; their offers cannot reopen a connection
    closed_peers: Mutex<HashSet<String>>,
    next_generation: AtomicU64,
    outbound_listeners: IdListeners<TransmissionKey, Transmission>,
    inbound_listeners: IdListeners<TransmissionKey, Transmission>,
    connection_listeners: IdListeners<String, ConnectionState>,
    events_tx: mpsc::UnboundedSender<TaggedTransportEvent>,
    events_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<TaggedTransportEvent>>>,
}

impl TransmissionManager {
    pub fn new(
        local_endpoint_id: &str,
        transport_config: TransportConfig,
        factory: Arc<dyn PeerConnectionFactory>,
        signaling: Arc<dyn SignalingChannel>,
        registry: Arc<MediaRegistry>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            local_endpoint_id: RwLock::new(local_endpoint_id.to_string()),
            transport_config,
            factory,
            signaling,
            registry,
            connections: Mutex::new(HashMap::new()),
            closed_peers: Mutex::new(HashSet::new()),
            next_generation: AtomicU64::new(1),
            outbound_listeners: IdListeners::new(),
            inbound_listeners: IdListeners::new(),
            connection_listeners: IdListeners::new(),
            events_tx,
            events_rx: tokio::sync::Mutex::new(Some(events_rx)),
        }
    }

    pub fn local_endpoint_id(&self) -> String {
        self.local_endpoint_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_local_endpoint_id(&self, endpoint_id: &str) {
        info!(endpoint_id = %endpoint_id, "Local endpoint id changed");
        *self
            .local_endpoint_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = endpoint_id.to_string();
    }

    /// The side with the greater id is polite and yields on collision
    pub fn is_polite(&self, remote_endpoint_id: &str) -> bool {
        self.local_endpoint_id().as_str() > remote_endpoint_id
    }

    /// Create the connection to a remote endpoint if it does not exist yet
    pub fn connect(&self, remote_endpoint_id: &str) -> SessionResult<()> {
        self.ensure_connection(remote_endpoint_id).map(|_| ())
    }

    /// Let a peer disconnected earlier open a connection again
    pub fn allow_reconnect(&self, remote_endpoint_id: &str) {
        if self.lock_closed_peers().remove(remote_endpoint_id) {
            debug!(remote_endpoint_id = %remote_endpoint_id, "Peer may reconnect");
        }
    }

    fn ensure_connection(
        &self,
        remote_endpoint_id: &str,
    ) -> SessionResult<(Arc<dyn PeerConnection>, u64)> {
        self.allow_reconnect(remote_endpoint_id);
        let mut connections = self.lock();
        if let Some(entry) = connections.get(remote_endpoint_id) {
            return Ok((Arc::clone(&entry.pc), entry.generation));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let sink = TransportEventSink::new(remote_endpoint_id, generation, self.events_tx.clone());
        let pc = self
            .factory
            .create(remote_endpoint_id, &self.transport_config, sink)?;

        connections.insert(
            remote_endpoint_id.to_string(),
            PeerConnectionEntry {
                pc: Arc::clone(&pc),
                generation,
                making_offer: false,
                ignore_offer: false,
                answer_pending: false,
                connection_state: ConnectionState::Connecting,
                outbound: HashMap::new(),
                inbound: HashMap::new(),
            },
        );
        drop(connections);

        info!(
            remote_endpoint_id = %remote_endpoint_id,
            polite = self.is_polite(remote_endpoint_id),
            "Peer connection created"
        );
        self.connection_listeners.notify(
            &remote_endpoint_id.to_string(),
            ListenerEvent::Added(ConnectionState::Connecting),
        );

        Ok((pc, generation))
    }

    /// Close the connection and drop every transmission on it
    pub fn disconnect(&self, remote_endpoint_id: &str) {
        let Some(entry) = self.lock().remove(remote_endpoint_id) else {
            return;
        };
        self.lock_closed_peers().insert(remote_endpoint_id.to_string());

        entry.pc.close();
        info!(remote_endpoint_id = %remote_endpoint_id, "Peer connection closed");

        for (transmission_id, record) in entry.outbound {
            self.outbound_listeners.notify(
                &(remote_endpoint_id.to_string(), transmission_id),
                ListenerEvent::Removed(record.transmission),
            );
        }
        for (transmission_id, transmission) in entry.inbound {
            self.registry.remove_media_object(&transmission_id);
            self.inbound_listeners.notify(
                &(remote_endpoint_id.to_string(), transmission_id),
                ListenerEvent::Removed(transmission),
            );
        }
        self.connection_listeners.notify(
            &remote_endpoint_id.to_string(),
            ListenerEvent::Removed(ConnectionState::Closed),
        );
    }

    /// Disconnect every remote endpoint
    pub fn destroy(&self) {
        let remotes: Vec<String> = self.lock().keys().cloned().collect();
        for remote_endpoint_id in remotes {
            self.disconnect(&remote_endpoint_id);
        }
    }

    /// Route a transmission-level signaling message
    pub async fn handle_signal(&self, from: &str, message: SignalingMessage) -> SessionResult<()> {
        match message {
            SignalingMessage::SessionDescription(description) => {
                self.handle_session_description(from, description).await
            }
            SignalingMessage::IceCandidate(candidate) => {
                self.handle_ice_candidate(from, candidate).await
            }
            SignalingMessage::AddInboundTransmission(payload) => {
                self.handle_add_inbound_transmission(from, payload)
            }
            SignalingMessage::RemoveInboundTransmission(payload) => {
                self.handle_remove_inbound_transmission(from, payload);
                Ok(())
            }
            SignalingMessage::OutboundTransmissionStateChange(payload) => {
                self.handle_outbound_state_change(from, payload);
                Ok(())
            }
            other => {
                debug!(kind = %other.kind(), "Not a transmission message");
                Ok(())
            }
        }
    }

    /// Apply a remote offer or answer, ignoring colliding offers when impolite
    pub async fn handle_session_description(
        &self,
        remote_endpoint_id: &str,
        description: SessionDescriptionInit,
    ) -> SessionResult<()> {
        if !self.has_connection(remote_endpoint_id) {
            if !description.is_offer() {
                debug!(
                    remote_endpoint_id = %remote_endpoint_id,
                    "Dropping answer for closed connection"
                );
                return Ok(());
            }
            if self.lock_closed_peers().contains(remote_endpoint_id) {
                debug!(
                    remote_endpoint_id = %remote_endpoint_id,
                    "Dropping offer from disconnected peer"
                );
                return Ok(());
            }
        }
        let (pc, generation) = self.ensure_connection(remote_endpoint_id)?;
        let polite = self.is_polite(remote_endpoint_id);
        let is_offer = description.is_offer();
        let stable = pc.signaling_state() == SignalingState::Stable;

        let ignore_offer = self
            .with_entry(remote_endpoint_id, generation, |entry| {
                let ready_for_offer = !entry.making_offer && (stable || entry.answer_pending);
                let offer_collision = is_offer && !ready_for_offer;
                entry.ignore_offer = !polite && offer_collision;
                entry.ignore_offer
            })
            .unwrap_or(true);

        if ignore_offer {
            debug!(remote_endpoint_id = %remote_endpoint_id, "Ignoring colliding offer");
            return Ok(());
        }

        debug!(
            remote_endpoint_id = %remote_endpoint_id,
            sdp_type = ?description.sdp_type,
            "Applying remote description"
        );

        if !is_offer {
            self.with_entry(remote_endpoint_id, generation, |entry| entry.answer_pending = true);
        }
        let applied = pc.set_remote_description(description).await;
        self.with_entry(remote_endpoint_id, generation, |entry| entry.answer_pending = false);
        applied?;

        if is_offer {
            if !self.is_current(remote_endpoint_id, generation) {
                return Ok(());
            }
            let answer = pc.set_local_description().await?;
            self.send(remote_endpoint_id, SignalingMessage::SessionDescription(answer))
                .await?;
        }

        Ok(())
    }

    /// Apply a remote candidate; failures for an ignored offer are expected.
    /// Candidates for a peer without a connection are stale and dropped.
    pub async fn handle_ice_candidate(
        &self,
        remote_endpoint_id: &str,
        candidate: Option<IceCandidateInit>,
    ) -> SessionResult<()> {
        let Some((pc, generation)) = self
            .lock()
            .get(remote_endpoint_id)
            .map(|entry| (Arc::clone(&entry.pc), entry.generation))
        else {
            debug!(
                remote_endpoint_id = %remote_endpoint_id,
                "Dropping candidate for closed connection"
            );
            return Ok(());
        };

        match pc.add_ice_candidate(candidate).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let ignoring = self
                    .with_entry(remote_endpoint_id, generation, |entry| entry.ignore_offer)
                    .unwrap_or(false);
                if ignoring {
                    debug!(
                        remote_endpoint_id = %remote_endpoint_id,
                        "Dropping candidate of ignored offer"
                    );
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn handle_negotiation_needed(&self, remote_endpoint_id: &str, generation: u64) {
        let Some(pc) = self.connection_for(remote_endpoint_id, generation) else {
            return;
        };
        if pc.signaling_state() != SignalingState::Stable {
            debug!(remote_endpoint_id = %remote_endpoint_id, "Negotiation deferred, not stable");
            return;
        }

        let _making_offer = MakingOfferGuard::engage(self, remote_endpoint_id, generation);

        let offer = match pc.set_local_description().await {
            Ok(offer) => offer,
            Err(e) => {
                error!(
                    remote_endpoint_id = %remote_endpoint_id,
                    error = %e,
                    "Failed to create offer"
                );
                return;
            }
        };

        if !self.is_current(remote_endpoint_id, generation) {
            return;
        }
        debug!(remote_endpoint_id = %remote_endpoint_id, "Sending offer");
        if let Err(e) = self
            .send(remote_endpoint_id, SignalingMessage::SessionDescription(offer))
            .await
        {
            error!(remote_endpoint_id = %remote_endpoint_id, error = %e, "Failed to send offer");
        }
    }

    /// Resolve the mid of an inbound track to the transmissions it carries
    async fn handle_track(
        &self,
        remote_endpoint_id: &str,
        generation: u64,
        event: TrackEvent,
    ) -> SessionResult<()> {
        let Some(mid) = event.mid.as_deref() else {
            warn!(remote_endpoint_id = %remote_endpoint_id, "Track event without mid");
            return Ok(());
        };
        let Some(pc) = self.connection_for(remote_endpoint_id, generation) else {
            return Ok(());
        };
        let Some(remote_description) = pc.remote_description() else {
            warn!(
                remote_endpoint_id = %remote_endpoint_id,
                mid = %mid,
                "Track event before remote description"
            );
            return Ok(());
        };

        let sdp = SessionDescription::parse(&remote_description.sdp);
        let Some(section) = sdp.section_with_mid(mid) else {
            warn!(remote_endpoint_id = %remote_endpoint_id, mid = %mid, "No section for mid");
            return Ok(());
        };

        let mut correlated = Vec::new();
        for transmission_id in section.media_stream_ids() {
            let stream = event
                .streams
                .iter()
                .find(|stream| stream.id() == transmission_id)
                .cloned()
                .ok_or_else(|| SessionError::StreamNotFound {
                    transmission_id: transmission_id.clone(),
                })?;
            correlated.push((transmission_id.clone(), stream));
        }

        for (transmission_id, stream) in correlated {
            self.registry
                .add_remote_media_stream(&transmission_id, Arc::clone(&stream));

            let notification = self.with_entry(remote_endpoint_id, generation, |entry| {
                match entry.inbound.get_mut(&transmission_id) {
                    Some(existing) => {
                        existing.state = TransmissionState::Connected;
                        existing.stream = Some(Arc::clone(&stream));
                        ListenerEvent::Modified(existing.clone())
                    }
                    None => {
                        let transmission = Transmission {
                            transmission_id: transmission_id.clone(),
                            remote_endpoint_id: remote_endpoint_id.to_string(),
                            kind: MediaKind::Stream,
                            label: String::new(),
                            state: TransmissionState::Connected,
                            stream: Some(Arc::clone(&stream)),
                        };
                        entry.inbound.insert(transmission_id.clone(), transmission.clone());
                        ListenerEvent::Added(transmission)
                    }
                }
            });
            let Some(notification) = notification else {
                return Ok(());
            };

            debug!(
                remote_endpoint_id = %remote_endpoint_id,
                transmission_id = %transmission_id,
                mid = %mid,
                "Inbound transmission connected"
            );
            self.inbound_listeners.notify(
                &(remote_endpoint_id.to_string(), transmission_id.clone()),
                notification,
            );
            self.send(
                remote_endpoint_id,
                SignalingMessage::OutboundTransmissionStateChange(OutboundTransmissionStateChange {
                    transmission_id,
                    state: TransmissionState::Connected,
                }),
            )
            .await?;
        }

        Ok(())
    }

    fn handle_connection_state(
        &self,
        remote_endpoint_id: &str,
        generation: u64,
        native: NativeConnectionState,
    ) {
        let state = ConnectionState::from(native);
        let failed = self.with_entry(remote_endpoint_id, generation, |entry| {
            entry.connection_state = state;
            if state != ConnectionState::Failed {
                return (Vec::new(), Vec::new());
            }
            let outbound: Vec<Transmission> = entry
                .outbound
                .values_mut()
                .map(|record| {
                    record.transmission.state = TransmissionState::Failed;
                    record.transmission.clone()
                })
                .collect();
            let inbound: Vec<Transmission> = entry
                .inbound
                .values_mut()
                .map(|transmission| {
                    transmission.state = TransmissionState::Failed;
                    transmission.clone()
                })
                .collect();
            (outbound, inbound)
        });
        let Some((outbound, inbound)) = failed else {
            return;
        };

        info!(remote_endpoint_id = %remote_endpoint_id, state = %state, "Connection state changed");
        self.connection_listeners
            .notify(&remote_endpoint_id.to_string(), ListenerEvent::Modified(state));

        for transmission in outbound {
            let key = (remote_endpoint_id.to_string(), transmission.transmission_id.clone());
            self.outbound_listeners.notify(&key, ListenerEvent::Modified(transmission));
        }
        for transmission in inbound {
            let key = (remote_endpoint_id.to_string(), transmission.transmission_id.clone());
            self.inbound_listeners.notify(&key, ListenerEvent::Modified(transmission));
        }
    }

    /// Send a local stream to a remote endpoint. The stream id becomes the
    /// transmission id.
    pub async fn add_stream_transmission(
        &self,
        remote_endpoint_id: &str,
        stream: Arc<dyn MediaStream>,
        label: &str,
    ) -> SessionResult<String> {
        let (pc, generation) = self.ensure_connection(remote_endpoint_id)?;
        let transmission_id = stream.id().to_string();

        let attached: HashSet<String> = pc
            .senders()
            .into_iter()
            .filter_map(|sender| sender.track_id)
            .collect();
        let mut sender_ids = Vec::new();
        for track in stream.tracks() {
            if attached.contains(track.id()) {
                continue;
            }
            sender_ids.push(pc.add_track(track, &stream)?);
        }

        let notification = self
            .with_entry(remote_endpoint_id, generation, |entry| {
                match entry.outbound.get_mut(&transmission_id) {
                    Some(record) => {
                        record.sender_ids.extend(sender_ids);
                        ListenerEvent::Modified(record.transmission.clone())
                    }
                    None => {
                        let transmission = Transmission {
                            transmission_id: transmission_id.clone(),
                            remote_endpoint_id: remote_endpoint_id.to_string(),
                            kind: MediaKind::Stream,
                            label: label.to_string(),
                            state: TransmissionState::Connecting,
                            stream: Some(Arc::clone(&stream)),
                        };
                        entry.outbound.insert(
                            transmission_id.clone(),
                            OutboundRecord {
                                transmission: transmission.clone(),
                                sender_ids,
                            },
                        );
                        ListenerEvent::Added(transmission)
                    }
                }
            })
            .ok_or_else(|| SessionError::ConnectionNotFound {
                remote_endpoint_id: remote_endpoint_id.to_string(),
            })?;

        info!(
            remote_endpoint_id = %remote_endpoint_id,
            transmission_id = %transmission_id,
            label = %label,
            "Outbound transmission added"
        );
        self.outbound_listeners.notify(
            &(remote_endpoint_id.to_string(), transmission_id.clone()),
            notification,
        );

        self.send(
            remote_endpoint_id,
            SignalingMessage::AddInboundTransmission(AddInboundTransmission {
                transmission_id: transmission_id.clone(),
                label: label.to_string(),
                kind: MediaKind::Stream,
            }),
        )
        .await?;

        Ok(transmission_id)
    }

    /// Stop sending a transmission; unknown ids are ignored
    pub async fn remove_outbound_transmission(
        &self,
        remote_endpoint_id: &str,
        transmission_id: &str,
    ) -> SessionResult<()> {
        let removed = {
            let mut connections = self.lock();
            connections.get_mut(remote_endpoint_id).and_then(|entry| {
                entry
                    .outbound
                    .remove(transmission_id)
                    .map(|record| (Arc::clone(&entry.pc), record))
            })
        };
        let Some((pc, record)) = removed else {
            return Ok(());
        };

        for sender_id in &record.sender_ids {
            if let Err(e) = pc.remove_track(sender_id) {
                warn!(sender_id = %sender_id, error = %e, "Failed to remove track");
            }
        }

        info!(
            remote_endpoint_id = %remote_endpoint_id,
            transmission_id = %transmission_id,
            "Outbound transmission removed"
        );
        self.outbound_listeners.notify(
            &(remote_endpoint_id.to_string(), transmission_id.to_string()),
            ListenerEvent::Removed(record.transmission),
        );

        self.send(
            remote_endpoint_id,
            SignalingMessage::RemoveInboundTransmission(RemoveInboundTransmission {
                transmission_id: transmission_id.to_string(),
            }),
        )
        .await
    }

    fn handle_add_inbound_transmission(
        &self,
        remote_endpoint_id: &str,
        payload: AddInboundTransmission,
    ) -> SessionResult<()> {
        let (_, generation) = self.ensure_connection(remote_endpoint_id)?;

        let notification = self.with_entry(remote_endpoint_id, generation, |entry| {
            match entry.inbound.get_mut(&payload.transmission_id) {
                Some(existing) => {
                    existing.label = payload.label.clone();
                    existing.kind = payload.kind;
                    ListenerEvent::Modified(existing.clone())
                }
                None => {
                    let transmission = Transmission {
                        transmission_id: payload.transmission_id.clone(),
                        remote_endpoint_id: remote_endpoint_id.to_string(),
                        kind: payload.kind,
                        label: payload.label.clone(),
                        state: TransmissionState::Connecting,
                        stream: None,
                    };
                    entry
                        .inbound
                        .insert(payload.transmission_id.clone(), transmission.clone());
                    ListenerEvent::Added(transmission)
                }
            }
        });

        if let Some(notification) = notification {
            debug!(
                remote_endpoint_id = %remote_endpoint_id,
                transmission_id = %payload.transmission_id,
                "Inbound transmission announced"
            );
            self.inbound_listeners.notify(
                &(remote_endpoint_id.to_string(), payload.transmission_id),
                notification,
            );
        }
        Ok(())
    }

    fn handle_remove_inbound_transmission(
        &self,
        remote_endpoint_id: &str,
        payload: RemoveInboundTransmission,
    ) {
        let removed = self
            .lock()
            .get_mut(remote_endpoint_id)
            .and_then(|entry| entry.inbound.remove(&payload.transmission_id));
        let Some(transmission) = removed else {
            debug!(transmission_id = %payload.transmission_id, "Unknown inbound transmission");
            return;
        };

        self.registry.remove_media_object(&payload.transmission_id);
        debug!(
            remote_endpoint_id = %remote_endpoint_id,
            transmission_id = %payload.transmission_id,
            "Inbound transmission removed"
        );
        self.inbound_listeners.notify(
            &(remote_endpoint_id.to_string(), payload.transmission_id),
            ListenerEvent::Removed(transmission),
        );
    }

    fn handle_outbound_state_change(
        &self,
        remote_endpoint_id: &str,
        payload: OutboundTransmissionStateChange,
    ) {
        let updated = self.lock().get_mut(remote_endpoint_id).and_then(|entry| {
            entry.outbound.get_mut(&payload.transmission_id).map(|record| {
                record.transmission.state = payload.state;
                record.transmission.clone()
            })
        });
        let Some(transmission) = updated else {
            debug!(transmission_id = %payload.transmission_id, "Unknown outbound transmission");
            return;
        };

        debug!(
            remote_endpoint_id = %remote_endpoint_id,
            transmission_id = %payload.transmission_id,
            state = %payload.state,
            "Outbound transmission state changed"
        );
        self.outbound_listeners.notify(
            &(remote_endpoint_id.to_string(), payload.transmission_id),
            ListenerEvent::Modified(transmission),
        );
    }

    /// Handle one event raised by a connection. Events of replaced or closed
    /// connections are dropped.
    pub async fn handle_transport_event(&self, tagged: TaggedTransportEvent) {
        let TaggedTransportEvent {
            remote_endpoint_id: remote,
            generation,
            event,
        } = tagged;
        if !self.is_current(&remote, generation) {
            debug!(remote_endpoint_id = %remote, "Dropping event of stale connection");
            return;
        }

        match event {
            TransportEvent::NegotiationNeeded => {
                self.handle_negotiation_needed(&remote, generation).await
            }
            TransportEvent::IceCandidate(candidate) => {
                if let Err(e) = self
                    .send(&remote, SignalingMessage::IceCandidate(candidate))
                    .await
                {
                    warn!(remote_endpoint_id = %remote, error = %e, "Failed to send candidate");
                }
            }
            TransportEvent::Track(track) => {
                if let Err(e) = self.handle_track(&remote, generation, track).await {
                    error!(remote_endpoint_id = %remote, error = %e, "Failed to correlate track");
                }
            }
            TransportEvent::ConnectionStateChanged(state) => {
                self.handle_connection_state(&remote, generation, state)
            }
        }
    }

    /// Handle every transport event queued so far and return how many ran
    pub async fn process_transport_events(&self) -> usize {
        let mut processed = 0;
        loop {
            let next = {
                let mut rx = self.events_rx.lock().await;
                match rx.as_mut() {
                    Some(rx) => rx.try_recv().ok(),
                    None => None,
                }
            };
            let Some(event) = next else {
                return processed;
            };
            self.handle_transport_event(event).await;
            processed += 1;
        }
    }

    /// Drain transport events in the background, one at a time
    pub async fn spawn_event_loop(self: &Arc<Self>) -> SessionResult<JoinHandle<()>> {
        let mut rx = self
            .events_rx
            .lock()
            .await
            .take()
            .ok_or(SessionError::AlreadyRunning("transport event loop"))?;

        let manager = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                manager.handle_transport_event(event).await;
            }
            debug!("Transport event loop finished");
        }))
    }

    pub fn has_connection(&self, remote_endpoint_id: &str) -> bool {
        self.lock().contains_key(remote_endpoint_id)
    }

    pub fn connection_state(&self, remote_endpoint_id: &str) -> Option<ConnectionState> {
        self.lock()
            .get(remote_endpoint_id)
            .map(|entry| entry.connection_state)
    }

    pub fn remote_endpoint_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn outbound_transmission(
        &self,
        remote_endpoint_id: &str,
        transmission_id: &str,
    ) -> Option<Transmission> {
        self.lock().get(remote_endpoint_id).and_then(|entry| {
            entry
                .outbound
                .get(transmission_id)
                .map(|record| record.transmission.clone())
        })
    }

    pub fn inbound_transmission(
        &self,
        remote_endpoint_id: &str,
        transmission_id: &str,
    ) -> Option<Transmission> {
        self.lock()
            .get(remote_endpoint_id)
            .and_then(|entry| entry.inbound.get(transmission_id).cloned())
    }

    pub fn outbound_transmissions(&self, remote_endpoint_id: &str) -> Vec<Transmission> {
        self.lock()
            .get(remote_endpoint_id)
            .map(|entry| {
                entry
                    .outbound
                    .values()
                    .map(|record| record.transmission.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn inbound_transmissions(&self, remote_endpoint_id: &str) -> Vec<Transmission> {
        self.lock()
            .get(remote_endpoint_id)
            .map(|entry| entry.inbound.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscribe_outbound<F>(
        &self,
        remote_endpoint_id: &str,
        transmission_id: &str,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&ListenerEvent<Transmission>) + Send + Sync + 'static,
    {
        self.outbound_listeners.subscribe(
            (remote_endpoint_id.to_string(), transmission_id.to_string()),
            callback,
        )
    }

    pub fn subscribe_inbound<F>(
        &self,
        remote_endpoint_id: &str,
        transmission_id: &str,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&ListenerEvent<Transmission>) + Send + Sync + 'static,
    {
        self.inbound_listeners.subscribe(
            (remote_endpoint_id.to_string(), transmission_id.to_string()),
            callback,
        )
    }

    pub fn subscribe_all_outbound<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TransmissionKey, &ListenerEvent<Transmission>) + Send + Sync + 'static,
    {
        self.outbound_listeners.subscribe_all(callback)
    }

    pub fn subscribe_all_inbound<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TransmissionKey, &ListenerEvent<Transmission>) + Send + Sync + 'static,
    {
        self.inbound_listeners.subscribe_all(callback)
    }

    /// Listen for connection creation, state changes and removal
    pub fn subscribe_connections<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&String, &ListenerEvent<ConnectionState>) + Send + Sync + 'static,
    {
        self.connection_listeners.subscribe_all(callback)
    }

    async fn send(&self, remote_endpoint_id: &str, message: SignalingMessage) -> SessionResult<()> {
        self.signaling.send(remote_endpoint_id, message).await?;
        Ok(())
    }

    /// Run `f` on the entry if it still belongs to `generation`
    fn with_entry<R>(
        &self,
        remote_endpoint_id: &str,
        generation: u64,
        f: impl FnOnce(&mut PeerConnectionEntry) -> R,
    ) -> Option<R> {
        self.lock()
            .get_mut(remote_endpoint_id)
            .filter(|entry| entry.generation == generation)
            .map(f)
    }

    fn connection_for(
        &self,
        remote_endpoint_id: &str,
        generation: u64,
    ) -> Option<Arc<dyn PeerConnection>> {
        self.with_entry(remote_endpoint_id, generation, |entry| Arc::clone(&entry.pc))
    }

    fn is_current(&self, remote_endpoint_id: &str, generation: u64) -> bool {
        self.with_entry(remote_endpoint_id, generation, |_| ()).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PeerConnectionEntry>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_closed_peers(&self) -> MutexGuard<'_, HashSet<String>> {
        self.closed_peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStream, MockCapture, MockPeerConnectionFactory, RecordingSignaling};
    use peerlink_types::SdpType;

    struct Fixture {
        manager: Arc<TransmissionManager>,
        factory: Arc<MockPeerConnectionFactory>,
        signaling: Arc<RecordingSignaling>,
        registry: Arc<MediaRegistry>,
    }

    fn fixture(local_endpoint_id: &str) -> Fixture {
        let factory = Arc::new(MockPeerConnectionFactory::new(local_endpoint_id));
        let signaling = Arc::new(RecordingSignaling::new(local_endpoint_id));
        let registry = MediaRegistry::new(Arc::new(MockCapture::new()));
        let manager = Arc::new(TransmissionManager::new(
            local_endpoint_id,
            TransportConfig::default(),
            factory.clone(),
            signaling.clone(),
            Arc::clone(&registry),
        ));
        Fixture {
            manager,
            factory,
            signaling,
            registry,
        }
    }

    const TWO_STREAM_OFFER: &str = "v=0\r\n\
o=- 1 1 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=mid:0\r\n\
a=msid:s1 track-1\r\n\
a=msid:s2 track-1\r\n";

    fn offer_from_remote() -> SessionDescriptionInit {
        SessionDescriptionInit::offer(TWO_STREAM_OFFER)
    }

    #[test]
    fn test_is_polite_is_antisymmetric() {
        let ids = ["alice", "bob", "carol", "a", "b", "Z"];
        for local in ids {
            let manager = fixture(local).manager;
            for remote in ids.iter().filter(|remote| **remote != local) {
                let reverse = fixture(remote).manager;
                assert_ne!(manager.is_polite(remote), reverse.is_polite(local));
            }
        }
    }

    #[tokio::test]
    async fn test_impolite_side_ignores_colliding_offer() {
        let f = fixture("alice");
        f.manager.connect("bob").unwrap();
        let pc = f.factory.connection("bob").unwrap();
        let release = pc.hold_next_offer();

        f.manager
            .add_stream_transmission("bob", MemoryStream::camera("cam", 640, 480), "camera")
            .await
            .unwrap();

        let manager = Arc::clone(&f.manager);
        let negotiating = tokio::spawn(async move { manager.process_transport_events().await });
        pc.offer_started().await;

        f.manager
            .handle_session_description("bob", offer_from_remote())
            .await
            .unwrap();
        assert_eq!(pc.remote_description_count(), 0);

        // candidates of the ignored offer fail silently
        f.manager
            .handle_ice_candidate("bob", None)
            .await
            .unwrap();

        release.send(()).unwrap();
        negotiating.await.unwrap();

        assert_eq!(pc.signaling_state(), SignalingState::HaveLocalOffer);
        let offers = f.signaling.session_descriptions_to("bob");
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].sdp_type, SdpType::Offer);
    }

    #[tokio::test]
    async fn test_polite_side_accepts_colliding_offer() {
        let f = fixture("bob");
        f.manager.connect("alice").unwrap();
        let pc = f.factory.connection("alice").unwrap();
        let release = pc.hold_next_offer();

        f.manager
            .add_stream_transmission("alice", MemoryStream::camera("cam", 640, 480), "camera")
            .await
            .unwrap();

        let manager = Arc::clone(&f.manager);
        let negotiating = tokio::spawn(async move { manager.process_transport_events().await });
        pc.offer_started().await;

        f.manager
            .handle_session_description("alice", offer_from_remote())
            .await
            .unwrap();

        release.send(()).unwrap();
        negotiating.await.unwrap();

        // the competing offer was discarded and the remote offer answered
        let sent = f.signaling.session_descriptions_to("alice");
        assert_eq!(sent[0].sdp_type, SdpType::Answer);
        assert_eq!(pc.remote_description_count(), 1);
        assert!(!f.manager.lock()["alice"].making_offer);
    }

    #[tokio::test]
    async fn test_candidate_failure_propagates_when_not_ignoring() {
        let f = fixture("alice");
        f.manager.connect("bob").unwrap();
        let result = f.manager.handle_ice_candidate("bob", None).await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }

    #[tokio::test]
    async fn test_stale_candidates_do_not_reopen_connection() {
        let f = fixture("alice");
        f.manager.handle_ice_candidate("bob", None).await.unwrap();
        f.manager
            .handle_session_description("bob", SessionDescriptionInit::answer("v=0\r\n"))
            .await
            .unwrap();

        assert!(!f.manager.has_connection("bob"));
        assert_eq!(f.factory.created("bob"), 0);
    }

    #[tokio::test]
    async fn test_offer_from_disconnected_peer_is_dropped() {
        let f = fixture("alice");
        f.manager
            .handle_session_description("carol", offer_from_remote())
            .await
            .unwrap();
        assert!(f.manager.has_connection("carol"));

        f.manager.connect("bob").unwrap();
        f.manager.disconnect("bob");
        f.manager
            .handle_session_description("bob", offer_from_remote())
            .await
            .unwrap();
        assert!(!f.manager.has_connection("bob"));
        assert_eq!(f.factory.created("bob"), 1);

        // a new announcement lets the peer negotiate again
        f.manager
            .handle_signal(
                "bob",
                SignalingMessage::AddInboundTransmission(AddInboundTransmission {
                    transmission_id: "s1".to_string(),
                    label: "camera".to_string(),
                    kind: MediaKind::Stream,
                }),
            )
            .await
            .unwrap();
        f.manager
            .handle_session_description("bob", offer_from_remote())
            .await
            .unwrap();
        assert_eq!(f.factory.created("bob"), 2);
        assert_eq!(f.factory.connection("bob").unwrap().remote_description_count(), 1);
    }

    #[tokio::test]
    async fn test_track_correlates_every_stream_of_section() {
        let f = fixture("alice");
        f.manager
            .handle_session_description("bob", offer_from_remote())
            .await
            .unwrap();
        f.manager.process_transport_events().await;

        let inbound = f.manager.inbound_transmissions("bob");
        assert_eq!(inbound.len(), 2);
        assert!(inbound
            .iter()
            .all(|transmission| transmission.state == TransmissionState::Connected));
        assert!(f.registry.has_media_object("s1"));
        assert!(f.registry.has_media_object("s2"));

        let acknowledged: Vec<_> = f
            .signaling
            .sent_to("bob")
            .into_iter()
            .filter(|message| {
                matches!(message, SignalingMessage::OutboundTransmissionStateChange(_))
            })
            .collect();
        assert_eq!(acknowledged.len(), 2);
    }

    #[tokio::test]
    async fn test_track_with_missing_stream_is_an_error() {
        let f = fixture("alice");
        f.manager
            .handle_session_description("bob", offer_from_remote())
            .await
            .unwrap();
        let pc = f.factory.connection("bob").unwrap();

        let stream = MemoryStream::camera("s1", 320, 240);
        let track = stream.tracks()[1].clone();
        let event = TrackEvent {
            mid: Some("0".to_string()),
            track,
            streams: vec![stream as Arc<dyn MediaStream>],
        };

        let generation = f.manager.lock()["bob"].generation;
        let result = f.manager.handle_track("bob", generation, event).await;
        assert!(matches!(
            result,
            Err(SessionError::StreamNotFound { ref transmission_id }) if transmission_id == "s2"
        ));
        assert!(pc.remote_description().is_some());
    }

    #[tokio::test]
    async fn test_announced_label_survives_track_correlation() {
        let f = fixture("alice");
        f.manager
            .handle_signal(
                "bob",
                SignalingMessage::AddInboundTransmission(AddInboundTransmission {
                    transmission_id: "s1".to_string(),
                    label: "Camera".to_string(),
                    kind: MediaKind::Stream,
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            f.manager.inbound_transmission("bob", "s1").unwrap().state,
            TransmissionState::Connecting
        );

        f.manager
            .handle_session_description("bob", offer_from_remote())
            .await
            .unwrap();
        f.manager.process_transport_events().await;

        let transmission = f.manager.inbound_transmission("bob", "s1").unwrap();
        assert_eq!(transmission.state, TransmissionState::Connected);
        assert_eq!(transmission.label, "Camera");
    }

    #[tokio::test]
    async fn test_remove_outbound_transmission_detaches_senders() {
        let f = fixture("alice");
        let stream = MemoryStream::camera("cam", 640, 480);
        let transmission_id = f
            .manager
            .add_stream_transmission("bob", stream.clone(), "camera")
            .await
            .unwrap();
        assert_eq!(transmission_id, "cam");

        // re-adding does not attach duplicate senders
        f.manager
            .add_stream_transmission("bob", stream, "camera")
            .await
            .unwrap();
        let pc = f.factory.connection("bob").unwrap();
        assert_eq!(pc.senders().len(), 2);

        f.manager
            .remove_outbound_transmission("bob", "cam")
            .await
            .unwrap();
        assert!(pc.senders().is_empty());
        assert!(f.manager.outbound_transmission("bob", "cam").is_none());
        assert!(matches!(
            f.signaling.sent_to("bob").last(),
            Some(SignalingMessage::RemoveInboundTransmission(_))
        ));

        // removing again is a no-op
        f.manager
            .remove_outbound_transmission("bob", "cam")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_state_change_updates_outbound_and_ignores_unknown() {
        let f = fixture("alice");
        f.manager
            .add_stream_transmission("bob", MemoryStream::camera("cam", 640, 480), "camera")
            .await
            .unwrap();

        for transmission_id in ["cam", "unknown"] {
            let change = OutboundTransmissionStateChange {
                transmission_id: transmission_id.to_string(),
                state: TransmissionState::Connected,
            };
            f.manager
                .handle_signal("bob", SignalingMessage::OutboundTransmissionStateChange(change))
                .await
                .unwrap();
        }

        assert_eq!(
            f.manager.outbound_transmission("bob", "cam").unwrap().state,
            TransmissionState::Connected
        );
        assert!(f.manager.outbound_transmission("bob", "unknown").is_none());
    }

    #[tokio::test]
    async fn test_failed_connection_marks_transmissions_failed() {
        let f = fixture("alice");
        f.manager
            .add_stream_transmission("bob", MemoryStream::camera("cam", 640, 480), "camera")
            .await
            .unwrap();
        f.manager.process_transport_events().await;

        let pc = f.factory.connection("bob").unwrap();
        pc.emit_connection_state(NativeConnectionState::Failed);
        f.manager.process_transport_events().await;

        assert_eq!(f.manager.connection_state("bob"), Some(ConnectionState::Failed));
        assert_eq!(
            f.manager.outbound_transmission("bob", "cam").unwrap().state,
            TransmissionState::Failed
        );
    }

    #[tokio::test]
    async fn test_disconnect_discards_entry_and_media() {
        let f = fixture("alice");
        f.manager
            .handle_session_description("bob", offer_from_remote())
            .await
            .unwrap();
        f.manager.process_transport_events().await;
        let pc = f.factory.connection("bob").unwrap();

        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&removed);
        let _subscription = f.manager.subscribe_all_inbound(move |key, event| {
            if event.is_removed() {
                sink.lock().unwrap().push(key.1.clone());
            }
        });

        f.manager.disconnect("bob");
        f.manager.disconnect("bob");

        assert!(pc.is_closed());
        assert!(!f.manager.has_connection("bob"));
        assert!(!f.registry.has_media_object("s1"));
        assert_eq!(removed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_event_loop_starts_once() {
        let f = fixture("alice");
        let handle = f.manager.spawn_event_loop().await.unwrap();
        assert!(matches!(
            f.manager.spawn_event_loop().await,
            Err(SessionError::AlreadyRunning(_))
        ));
        handle.abort();
    }
}
