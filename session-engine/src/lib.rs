//! Session Engine
//!
//! Coordinates peer-to-peer media sessions between the local endpoint and
//! any number of remote endpoints:
//! - SDP parsing to correlate inbound tracks with transmissions
//! - A media registry of local captures and remote streams
//! - One peer connection per remote endpoint, negotiated with perfect
//!   negotiation
//! - Local, outbound and inbound controllers mirrored across peers
//!
//! [`PeerSession`] wires everything to one signaling channel.
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


pub mod controller;
pub mod controller_manager;
pub mod error;
pub mod listeners;
pub mod media_capture;
pub mod media_registry;
pub mod media_stream;
pub mod sdp;
pub mod session;
pub mod transmission_manager;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use controller::{CaptureSource, Controller, ControllerRole, RemoteMirrored, Stateful};
pub use controller_manager::{ControllerKey, ControllerManager};
pub use error::{SessionError, SessionResult};
pub use listeners::{ListenerEvent, Subscription};
pub use media_capture::{CameraConstraints, CaptureError, MediaCapture, MediaPermissions};
pub use media_registry::{MediaObject, MediaRegistry, RenderTarget, StreamSubKind};
pub use media_stream::{MediaStream, MediaTrack, StreamEvent, TrackKind};
pub use sdp::SessionDescription;
pub use session::{PeerSession, SessionHandle};
pub use transmission_manager::{Transmission, TransmissionKey, TransmissionManager};
pub use transport::{
    ConnectionState, PeerConnection, PeerConnectionFactory, TransportConfig, TransportEvent,
    TransportEventSink,
};
