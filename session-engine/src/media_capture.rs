//! Media capture seam
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
use std::sync::Arc;
use thiserror::Error;

use crate::media_stream::MediaStream;

/// Outcome of the media permission probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaPermissions {
    Success,
    Disallowed,
    Fail,
}

/// Failure reported by the capture backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("access to media devices was denied")]
    NotAllowed,

    #[error("no matching media device")]
    NotFound,

    #[error("constraints cannot be satisfied")]
    Overconstrained,

    #[error("capture failed: {0}")]
    Other(String),
}

impl MediaPermissions {
    /// Classify a probe result. Missing devices and unsatisfiable
    /// constraints still mean access itself was granted.
    pub fn from_probe(result: &Result<(), CaptureError>) -> Self {
        match result {
            Ok(()) => MediaPermissions::Success,
            Err(CaptureError::NotAllowed) => MediaPermissions::Disallowed,
            Err(CaptureError::NotFound) | Err(CaptureError::Overconstrained) => {
                MediaPermissions::Success
            }
            Err(CaptureError::Other(_)) => MediaPermissions::Fail,
        }
    }
}

/// Device selection for camera capture; `None` picks the default device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraConstraints {
    pub camera_device_id: Option<String>,
    pub audio_device_id: Option<String>,
}

/// Backend that acquires local media
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Request audio and video access once, releasing anything acquired
    async fn probe_permissions(&self) -> Result<(), CaptureError>;

    async fn camera_stream(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Arc<dyn MediaStream>, CaptureError>;

    async fn screen_stream(&self) -> Result<Arc<dyn MediaStream>, CaptureError>;
}
