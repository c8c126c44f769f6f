//! State and kind enums shared by both peers
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


use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerState {
    /// Resource is being acquired or negotiated
    Starting,
    /// Resource is available
    Ready,
    /// Resource could not be acquired
    Failed,
    /// Resource was released; may be restarted
    Stopped,
    /// Terminal, reached only by destroying the controller
    Closed,
}

impl ControllerState {
    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, ControllerState::Closed)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Starting => "STARTING",
            ControllerState::Ready => "READY",
            ControllerState::Failed => "FAILED",
            ControllerState::Stopped => "STOPPED",
            ControllerState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// State of a single transmission on a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionState {
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for TransmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransmissionState::Connecting => "CONNECTING",
            TransmissionState::Connected => "CONNECTED",
            TransmissionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Kind of media carried by a transmission or media object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Stream,
    Data,
}

/// Kind of resource a controller represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerKind {
    Camera,
    Screen,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerKind::Camera => f.write_str("CAMERA"),
            ControllerKind::Screen => f.write_str("SCREEN"),
        }
    }
}
