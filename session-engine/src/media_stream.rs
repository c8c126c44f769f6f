//! Media stream and track abstractions
//!
//! The native media layer is an external collaborator. These traits describe
//! the minimal surface the registry and the transport need from it.
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


use std::fmt;
use std::sync::Arc;

/// Track media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Negotiated settings of a track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A single audio or video track
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    fn settings(&self) -> TrackSettings;

    /// Whether the track has ended
    fn is_ended(&self) -> bool;

    /// Release the underlying source. Does not raise a track-ended event.
    fn stop(&self);
}

/// Change in a stream's track set
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TrackEnded { track_id: String },
    TrackAdded { track: Arc<dyn MediaTrack> },
    TrackRemoved { track_id: String },
}

/// Callback installed on a stream by its owner
pub type StreamEventHandler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// A set of tracks sharing one stream id
pub trait MediaStream: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Tracks currently in the stream, ended ones included
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    /// Install or clear the handler for track-level events. Implementations
    /// must not hold internal locks while invoking the handler.
    fn set_event_handler(&self, handler: Option<StreamEventHandler>);
}

/// Width and height of the first video track, if it reports them
pub fn stream_dimensions(tracks: &[Arc<dyn MediaTrack>]) -> (Option<u32>, Option<u32>) {
    tracks
        .iter()
        .find(|track| track.kind() == TrackKind::Video)
        .map(|track| {
            let settings = track.settings();
            (settings.width, settings.height)
        })
        .unwrap_or((None, None))
}

pub fn has_kind(tracks: &[Arc<dyn MediaTrack>], kind: TrackKind) -> bool {
    tracks.iter().any(|track| track.kind() == kind)
}
