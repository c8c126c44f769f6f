//! In-memory doubles for the media, capture, signaling and transport seams
//!
//! Enabled for unit tests and, through the `test-util` feature, for the
//! integration tests of the workspace. [`MockPeerConnection`] writes real
//! session description text: every offer lists the local senders with their
//! mids and `a=msid:` lines, and applying a remote offer synthesizes remote
//! tracks and streams for the sections it has not seen before.

use async_trait::async_trait;
use peerlink_types::{IceCandidateInit, SdpType, SessionDescriptionInit, SignalingMessage};
use signaling_client::{InboundSignal, SignalStream, SignalingChannel, SignalingError};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Notify};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};
use crate::media_capture::{CameraConstraints, CaptureError, MediaCapture};
use crate::media_stream::{
    MediaStream, MediaTrack, StreamEvent, StreamEventHandler, TrackKind, TrackSettings,
};
use crate::sdp::{SectionKind, SessionDescription};
use crate::transport::{
    NativeConnectionState, PeerConnection, PeerConnectionFactory, RtpSenderInfo, SignalingState,
    TrackEvent, TransportConfig, TransportEvent, TransportEventSink,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct MemoryTrack {
    id: String,
    kind: TrackKind,
    settings: TrackSettings,
    ended: AtomicBool,
    stopped: AtomicBool,
}

impl MemoryTrack {
    pub fn audio(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind: TrackKind::Audio,
            settings: TrackSettings::default(),
            ended: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn video(id: &str, width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind: TrackKind::Video,
            settings: TrackSettings {
                width: Some(width),
                height: Some(height),
            },
            ended: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaTrack for MemoryTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn settings(&self) -> TrackSettings {
        self.settings
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.ended.store(true, Ordering::SeqCst);
    }
}

/// Stream whose track set can be changed from tests
pub struct MemoryStream {
    id: String,
    tracks: Mutex<Vec<Arc<MemoryTrack>>>,
    handler: Mutex<Option<StreamEventHandler>>,
}

impl fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStream")
            .field("id", &self.id)
            .field("tracks", &self.track_ids())
            .finish()
    }
}

impl MemoryStream {
    pub fn new(id: &str) -> Arc<Self> {
        Self::with_tracks(id, Vec::new())
    }

    pub fn with_tracks(id: &str, tracks: Vec<Arc<MemoryTrack>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            tracks: Mutex::new(tracks),
            handler: Mutex::new(None),
        })
    }

    /// Audio track followed by a video track
    pub fn camera(id: &str, width: u32, height: u32) -> Arc<Self> {
        Self::with_tracks(
            id,
            vec![
                MemoryTrack::audio(&format!("{id}-audio")),
                MemoryTrack::video(&format!("{id}-video"), width, height),
            ],
        )
    }

    pub fn audio_only(id: &str) -> Arc<Self> {
        Self::with_tracks(id, vec![MemoryTrack::audio(&format!("{id}-audio"))])
    }

    pub fn add_track(&self, track: Arc<MemoryTrack>) {
        lock(&self.tracks).push(Arc::clone(&track));
        self.emit(StreamEvent::TrackAdded { track });
    }

    pub fn add_video_track(&self, track_id: &str, width: u32, height: u32) {
        self.add_track(MemoryTrack::video(track_id, width, height));
    }

    pub fn remove_track(&self, track_id: &str) {
        let removed = {
            let mut tracks = lock(&self.tracks);
            let before = tracks.len();
            tracks.retain(|track| track.id != track_id);
            tracks.len() != before
        };
        if removed {
            self.emit(StreamEvent::TrackRemoved {
                track_id: track_id.to_string(),
            });
        }
    }

    /// End a track the way a remote hang-up or unplugged device would
    pub fn end_track(&self, track_id: &str) {
        let ended = lock(&self.tracks)
            .iter()
            .find(|track| track.id == track_id)
            .map(|track| !track.ended.swap(true, Ordering::SeqCst))
            .unwrap_or(false);
        if ended {
            self.emit(StreamEvent::TrackEnded {
                track_id: track_id.to_string(),
            });
        }
    }

    pub fn track_ids(&self) -> Vec<String> {
        lock(&self.tracks).iter().map(|track| track.id.clone()).collect()
    }

    pub fn all_stopped(&self) -> bool {
        lock(&self.tracks).iter().all(|track| track.is_stopped())
    }

    pub fn has_handler(&self) -> bool {
        lock(&self.handler).is_some()
    }

    fn emit(&self, event: StreamEvent) {
        let handler = lock(&self.handler).clone();
        if let Some(handler) = handler {
            handler(&event);
        }
    }
}

impl MediaStream for MemoryStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        lock(&self.tracks)
            .iter()
            .map(|track| Arc::clone(track) as Arc<dyn MediaTrack>)
            .collect()
    }

    fn set_event_handler(&self, handler: Option<StreamEventHandler>) {
        *lock(&self.handler) = handler;
    }
}

/// Capture backend with scriptable outcomes and call counters
pub struct MockCapture {
    probe_result: Mutex<Result<(), CaptureError>>,
    acquisition_error: Mutex<Option<CaptureError>>,
    probes: AtomicUsize,
    acquisitions: AtomicUsize,
    streams: Mutex<Vec<Arc<MemoryStream>>>,
}

impl Default for MockCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCapture {
    pub fn new() -> Self {
        Self::with_probe_result(Ok(()))
    }

    pub fn with_probe_result(result: Result<(), CaptureError>) -> Self {
        Self {
            probe_result: Mutex::new(result),
            acquisition_error: Mutex::new(None),
            probes: AtomicUsize::new(0),
            acquisitions: AtomicUsize::new(0),
            streams: Mutex::new(Vec::new()),
        }
    }

    /// Make every later acquisition fail with `error`
    pub fn fail_acquisition(&self, error: CaptureError) {
        *lock(&self.acquisition_error) = Some(error);
    }

    pub fn succeed_acquisition(&self) {
        *lock(&self.acquisition_error) = None;
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Most recently acquired stream
    pub fn last_stream(&self) -> Option<Arc<MemoryStream>> {
        lock(&self.streams).last().cloned()
    }

    fn acquire(&self, prefix: &str) -> Result<Arc<dyn MediaStream>, CaptureError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.acquisition_error).clone() {
            return Err(error);
        }
        let stream = MemoryStream::camera(&format!("{prefix}-{}", Uuid::new_v4()), 1280, 720);
        lock(&self.streams).push(Arc::clone(&stream));
        Ok(stream)
    }
}

#[async_trait]
impl MediaCapture for MockCapture {
    async fn probe_permissions(&self) -> Result<(), CaptureError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        lock(&self.probe_result).clone()
    }

    async fn camera_stream(
        &self,
        _constraints: &CameraConstraints,
    ) -> Result<Arc<dyn MediaStream>, CaptureError> {
        self.acquire("camera")
    }

    async fn screen_stream(&self) -> Result<Arc<dyn MediaStream>, CaptureError> {
        self.acquire("screen")
    }
}

/// Signaling channel that records every message it is asked to send
pub struct RecordingSignaling {
    endpoint_id: String,
    sent: Mutex<Vec<(String, SignalingMessage)>>,
}

impl RecordingSignaling {
    pub fn new(endpoint_id: &str) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, SignalingMessage)> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, remote_endpoint_id: &str) -> Vec<SignalingMessage> {
        lock(&self.sent)
            .iter()
            .filter(|(to, _)| to == remote_endpoint_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn session_descriptions_to(&self, remote_endpoint_id: &str) -> Vec<SessionDescriptionInit> {
        self.sent_to(remote_endpoint_id)
            .into_iter()
            .filter_map(|message| match message {
                SignalingMessage::SessionDescription(description) => Some(description),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.sent).clear();
    }
}

#[async_trait]
impl SignalingChannel for RecordingSignaling {
    fn local_endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    async fn send(&self, to: &str, message: SignalingMessage) -> Result<(), SignalingError> {
        lock(&self.sent).push((to.to_string(), message));
        Ok(())
    }

    async fn subscribe(&self) -> Result<SignalStream, SignalingError> {
        Ok(Box::pin(futures::stream::pending::<Result<InboundSignal, SignalingError>>()))
    }

    fn client_type(&self) -> &str {
        "recording"
    }
}

struct LocalSender {
    sender_id: String,
    track: Arc<dyn MediaTrack>,
    stream_id: String,
    mid: Option<String>,
}

struct RemoteSection {
    track_id: String,
    stream_ids: Vec<String>,
}

struct NewRemoteTrack {
    mid: String,
    kind: SectionKind,
    track_id: String,
    stream_ids: Vec<String>,
}

struct PcState {
    signaling_state: SignalingState,
    local_description: Option<SessionDescriptionInit>,
    remote_description: Option<SessionDescriptionInit>,
    remote_description_count: usize,
    senders: Vec<LocalSender>,
    next_sender: u64,
    next_mid: u64,
    /// Remote sections already turned into tracks, by mid
    remote_sections: HashMap<String, RemoteSection>,
    needs_negotiation: bool,
    /// Bumped whenever a pending local offer is invalidated
    epoch: u64,
    connected: bool,
    closed: bool,
}

/// Loopback connection that produces and consumes real description text
pub struct MockPeerConnection {
    local_endpoint_id: String,
    remote_endpoint_id: String,
    events: TransportEventSink,
    state: Mutex<PcState>,
    remote_streams: Mutex<HashMap<String, Arc<MemoryStream>>>,
    offer_gate: Mutex<Option<oneshot::Receiver<()>>>,
    offer_started: Notify,
    candidates: AtomicUsize,
}

impl MockPeerConnection {
    fn new(local_endpoint_id: &str, remote_endpoint_id: &str, events: TransportEventSink) -> Self {
        Self {
            local_endpoint_id: local_endpoint_id.to_string(),
            remote_endpoint_id: remote_endpoint_id.to_string(),
            events,
            state: Mutex::new(PcState {
                signaling_state: SignalingState::Stable,
                local_description: None,
                remote_description: None,
                remote_description_count: 0,
                senders: Vec::new(),
                next_sender: 0,
                next_mid: 0,
                remote_sections: HashMap::new(),
                needs_negotiation: false,
                epoch: 0,
                connected: false,
                closed: false,
            }),
            remote_streams: Mutex::new(HashMap::new()),
            offer_gate: Mutex::new(None),
            offer_started: Notify::new(),
            candidates: AtomicUsize::new(0),
        }
    }

    pub fn remote_endpoint_id(&self) -> &str {
        &self.remote_endpoint_id
    }

    /// Suspend the next offer until the returned sender fires
    pub fn hold_next_offer(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.offer_gate) = Some(rx);
        tx
    }

    /// Resolves once offer generation has begun
    pub async fn offer_started(&self) {
        self.offer_started.notified().await;
    }

    pub fn remote_description_count(&self) -> usize {
        lock(&self.state).remote_description_count
    }

    pub fn applied_candidates(&self) -> usize {
        self.candidates.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn emit_connection_state(&self, state: NativeConnectionState) {
        self.events.emit(TransportEvent::ConnectionStateChanged(state));
    }

    fn build_description(&self, state: &PcState, sdp_type: SdpType) -> SessionDescriptionInit {
        let mut sdp = format!(
            "v=0\r\no=- {} {} IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
            self.local_endpoint_id, state.epoch
        );
        if sdp_type == SdpType::Offer {
            for sender in &state.senders {
                let Some(mid) = &sender.mid else { continue };
                let (media, payload) = match sender.track.kind() {
                    TrackKind::Audio => ("audio", "111"),
                    TrackKind::Video => ("video", "96"),
                };
                sdp.push_str(&format!(
                    "m={media} 9 UDP/TLS/RTP/SAVPF {payload}\r\nc=IN IP4 0.0.0.0\r\n"
                ));
                sdp.push_str(&format!(
                    "a=mid:{mid}\r\na=sendonly\r\na=msid:{} {}\r\n",
                    sender.stream_id,
                    sender.track.id()
                ));
            }
        }
        SessionDescriptionInit { sdp_type, sdp }
    }

    /// Compare a remote offer with the sections seen so far
    fn diff_remote_sections(
        state: &mut PcState,
        sdp: &str,
    ) -> (Vec<NewRemoteTrack>, Vec<RemoteSection>) {
        let description = SessionDescription::parse(sdp);
        let mut added = Vec::new();
        let mut present = Vec::new();

        for section in description.sections() {
            let Some(mid) = section.mid() else { continue };
            if section.media_stream_ids().is_empty() {
                continue;
            }
            present.push(mid.to_string());
            if state.remote_sections.contains_key(mid) {
                continue;
            }
            let track_id = section.track_id().unwrap_or(mid).to_string();
            state.remote_sections.insert(
                mid.to_string(),
                RemoteSection {
                    track_id: track_id.clone(),
                    stream_ids: section.media_stream_ids().to_vec(),
                },
            );
            added.push(NewRemoteTrack {
                mid: mid.to_string(),
                kind: section.kind(),
                track_id,
                stream_ids: section.media_stream_ids().to_vec(),
            });
        }

        let gone: Vec<String> = state
            .remote_sections
            .keys()
            .filter(|mid| !present.contains(*mid))
            .cloned()
            .collect();
        let removed = gone
            .iter()
            .filter_map(|mid| state.remote_sections.remove(mid))
            .collect();

        (added, removed)
    }

    fn apply_remote_tracks(&self, added: Vec<NewRemoteTrack>, removed: Vec<RemoteSection>) {
        for section in removed {
            for stream_id in &section.stream_ids {
                let stream = lock(&self.remote_streams).get(stream_id).cloned();
                if let Some(stream) = stream {
                    stream.end_track(&section.track_id);
                }
            }
        }

        for new_track in added {
            let track = match new_track.kind {
                SectionKind::Audio => MemoryTrack::audio(&new_track.track_id),
                _ => MemoryTrack::video(&new_track.track_id, 640, 480),
            };
            let mut streams: Vec<Arc<dyn MediaStream>> = Vec::new();
            for stream_id in &new_track.stream_ids {
                let stream = Arc::clone(
                    lock(&self.remote_streams)
                        .entry(stream_id.clone())
                        .or_insert_with(|| MemoryStream::new(stream_id)),
                );
                stream.add_track(Arc::clone(&track));
                streams.push(stream);
            }
            self.events.emit(TransportEvent::Track(TrackEvent {
                mid: Some(new_track.mid),
                track,
                streams,
            }));
        }
    }

    /// Raise the events that follow a completed offer/answer exchange
    fn after_exchange(&self, state: &mut PcState) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if !state.connected
            && state.local_description.is_some()
            && state.remote_description.is_some()
        {
            state.connected = true;
            events.push(TransportEvent::IceCandidate(Some(IceCandidateInit {
                candidate: format!(
                    "candidate:1 1 udp 2122260223 127.0.0.1 9 typ host ufrag {}",
                    self.local_endpoint_id
                ),
                sdp_mid: None,
                sdp_m_line_index: Some(0),
                username_fragment: None,
            })));
            events.push(TransportEvent::IceCandidate(None));
            events.push(TransportEvent::ConnectionStateChanged(NativeConnectionState::Connected));
        }
        if state.signaling_state == SignalingState::Stable && state.needs_negotiation {
            events.push(TransportEvent::NegotiationNeeded);
        }
        events
    }

    fn mark_needs_negotiation(&self, state: &mut PcState) -> bool {
        let raise = !state.needs_negotiation && state.signaling_state == SignalingState::Stable;
        state.needs_negotiation = true;
        raise
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    fn signaling_state(&self) -> SignalingState {
        lock(&self.state).signaling_state
    }

    fn local_description(&self) -> Option<SessionDescriptionInit> {
        lock(&self.state).local_description.clone()
    }

    fn remote_description(&self) -> Option<SessionDescriptionInit> {
        lock(&self.state).remote_description.clone()
    }

    async fn set_local_description(&self) -> SessionResult<SessionDescriptionInit> {
        let (epoch, signaling_state) = {
            let state = lock(&self.state);
            if state.closed {
                return Err(SessionError::Transport("connection is closed".to_string()));
            }
            (state.epoch, state.signaling_state)
        };

        match signaling_state {
            SignalingState::Stable => {
                self.offer_started.notify_one();
                let gate = lock(&self.offer_gate).take();
                if let Some(gate) = gate {
                    let _ = gate.await;
                }

                let mut guard = lock(&self.state);
                let state = &mut *guard;
                if state.closed
                    || state.epoch != epoch
                    || state.signaling_state != SignalingState::Stable
                {
                    return Err(SessionError::Transport("offer was rolled back".to_string()));
                }
                for sender in state.senders.iter_mut().filter(|sender| sender.mid.is_none()) {
                    sender.mid = Some(format!("{}-{}", self.local_endpoint_id, state.next_mid));
                    state.next_mid += 1;
                }
                let offer = self.build_description(state, SdpType::Offer);
                state.local_description = Some(offer.clone());
                state.signaling_state = SignalingState::HaveLocalOffer;
                state.needs_negotiation = false;
                Ok(offer)
            }
            SignalingState::HaveRemoteOffer => {
                let (answer, events) = {
                    let mut state = lock(&self.state);
                    let answer = self.build_description(&state, SdpType::Answer);
                    state.local_description = Some(answer.clone());
                    state.signaling_state = SignalingState::Stable;
                    let events = self.after_exchange(&mut state);
                    (answer, events)
                };
                for event in events {
                    self.events.emit(event);
                }
                Ok(answer)
            }
            other => Err(SessionError::Transport(format!(
                "cannot create a description in state {:?}",
                other
            ))),
        }
    }

    async fn set_remote_description(
        &self,
        description: SessionDescriptionInit,
    ) -> SessionResult<()> {
        let (tracks, events) = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(SessionError::Transport("connection is closed".to_string()));
            }

            match description.sdp_type {
                SdpType::Offer => {
                    if state.signaling_state == SignalingState::HaveLocalOffer {
                        // implicit rollback; the local changes still need an offer
                        state.needs_negotiation = true;
                    }
                    state.epoch += 1;
                    state.signaling_state = SignalingState::HaveRemoteOffer;
                }
                SdpType::Answer | SdpType::Pranswer => {
                    if state.signaling_state != SignalingState::HaveLocalOffer {
                        return Err(SessionError::Transport(format!(
                            "unexpected answer in state {:?}",
                            state.signaling_state
                        )));
                    }
                    state.signaling_state = SignalingState::Stable;
                }
                SdpType::Rollback => {
                    if state.signaling_state == SignalingState::HaveLocalOffer {
                        state.needs_negotiation = true;
                    }
                    state.epoch += 1;
                    state.signaling_state = SignalingState::Stable;
                }
            }

            state.remote_description_count += 1;
            let tracks = if description.is_offer() {
                Some(Self::diff_remote_sections(&mut state, &description.sdp))
            } else {
                None
            };
            state.remote_description = Some(description);
            let events = self.after_exchange(&mut state);
            (tracks, events)
        };

        if let Some((added, removed)) = tracks {
            self.apply_remote_tracks(added, removed);
        }
        for event in events {
            self.events.emit(event);
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: Option<IceCandidateInit>) -> SessionResult<()> {
        let state = lock(&self.state);
        if state.closed || state.remote_description.is_none() {
            return Err(SessionError::Transport(
                "candidate without remote description".to_string(),
            ));
        }
        self.candidates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn add_track(
        &self,
        track: Arc<dyn MediaTrack>,
        stream: &Arc<dyn MediaStream>,
    ) -> SessionResult<String> {
        let (sender_id, raise) = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(SessionError::Transport("connection is closed".to_string()));
            }
            let sender_id = format!("sender-{}", state.next_sender);
            state.next_sender += 1;
            state.senders.push(LocalSender {
                sender_id: sender_id.clone(),
                track,
                stream_id: stream.id().to_string(),
                mid: None,
            });
            let raise = self.mark_needs_negotiation(&mut state);
            (sender_id, raise)
        };
        if raise {
            self.events.emit(TransportEvent::NegotiationNeeded);
        }
        Ok(sender_id)
    }

    fn remove_track(&self, sender_id: &str) -> SessionResult<()> {
        let raise = {
            let mut state = lock(&self.state);
            let before = state.senders.len();
            state.senders.retain(|sender| sender.sender_id != sender_id);
            if state.senders.len() == before {
                return Err(SessionError::Transport(format!("unknown sender {sender_id}")));
            }
            self.mark_needs_negotiation(&mut state)
        };
        if raise {
            self.events.emit(TransportEvent::NegotiationNeeded);
        }
        Ok(())
    }

    fn senders(&self) -> Vec<RtpSenderInfo> {
        lock(&self.state)
            .senders
            .iter()
            .map(|sender| RtpSenderInfo {
                sender_id: sender.sender_id.clone(),
                track_id: Some(sender.track.id().to_string()),
            })
            .collect()
    }

    fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.signaling_state = SignalingState::Closed;
    }
}

/// Creates [`MockPeerConnection`]s and keeps them for inspection
pub struct MockPeerConnectionFactory {
    local_endpoint_id: String,
    connections: Mutex<Vec<Arc<MockPeerConnection>>>,
}

impl MockPeerConnectionFactory {
    pub fn new(local_endpoint_id: &str) -> Self {
        Self {
            local_endpoint_id: local_endpoint_id.to_string(),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Latest connection created for a remote endpoint
    pub fn connection(&self, remote_endpoint_id: &str) -> Option<Arc<MockPeerConnection>> {
        lock(&self.connections)
            .iter()
            .rev()
            .find(|pc| pc.remote_endpoint_id == remote_endpoint_id)
            .cloned()
    }

    pub fn created(&self, remote_endpoint_id: &str) -> usize {
        lock(&self.connections)
            .iter()
            .filter(|pc| pc.remote_endpoint_id == remote_endpoint_id)
            .count()
    }
}

impl PeerConnectionFactory for MockPeerConnectionFactory {
    fn create(
        &self,
        remote_endpoint_id: &str,
        _config: &TransportConfig,
        events: TransportEventSink,
    ) -> SessionResult<Arc<dyn PeerConnection>> {
        let pc = Arc::new(MockPeerConnection::new(
            &self.local_endpoint_id,
            remote_endpoint_id,
            events,
        ));
        lock(&self.connections).push(Arc::clone(&pc));
        Ok(pc)
    }
}
