//! Error types for the session engine
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


use signaling_client::SignalingError;
use thiserror::Error;

use crate::media_capture::MediaPermissions;

/// Result type for session engine operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur in the session engine
#[derive(Error, Debug)]
pub enum SessionError {
    /// Native transport rejected an operation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Signaling channel failure
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Media permissions were not granted
    #[error("Media permissions not granted: {0:?}")]
    Permissions(MediaPermissions),

    /// Capture could not produce a stream
    #[error("stream is unavailable")]
    StreamUnavailable,

    /// A track event referenced a stream that was not delivered with it
    #[error("No stream with transmission id {transmission_id} found")]
    StreamNotFound { transmission_id: String },

    /// Media object not registered
    #[error("Media object not found: {obj_id}")]
    MediaObjectNotFound { obj_id: String },

    /// Render target not registered
    #[error("Render target not found: {target_id}")]
    RenderTargetNotFound { target_id: String },

    /// Controller not registered
    #[error("Controller not found: {controller_id}")]
    ControllerNotFound { controller_id: String },

    /// No connection exists for the remote endpoint
    #[error("No connection to {remote_endpoint_id}")]
    ConnectionNotFound { remote_endpoint_id: String },

    /// Background loop was already started
    #[error("Already running: {0}")]
    AlreadyRunning(&'static str),
}
