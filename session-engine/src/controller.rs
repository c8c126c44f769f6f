//! Controller state machines
//!
//! A controller tracks the lifecycle of one media resource. Local
//! controllers own a capture, outbound controllers mirror a local one towards
//! a single remote endpoint, and inbound controllers mirror a remote
//! endpoint's outbound controller. All three share one [`Controller`] record
//! and differ only in their [`ControllerRole`].
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


use peerlink_types::{AddInboundController, ControllerKind, ControllerState};
use std::collections::BTreeSet;

use crate::media_capture::CameraConstraints;

/// How a local controller (re)acquires its resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    Camera(CameraConstraints),
    Screen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRole {
    /// Remote endpoints this controller is shared with
    pub shared_with: BTreeSet<String>,
    pub source: CaptureSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRole {
    pub remote_endpoint_id: String,
    pub local_controller_id: String,
    /// Set while the resource is being transmitted
    pub transmission_id: Option<String>,
    /// Last state reported by the paired inbound controller
    pub remote_state: Option<ControllerState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRole {
    pub remote_endpoint_id: String,
    /// Last state reported by the paired outbound controller
    pub remote_state: ControllerState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerRole {
    Local(LocalRole),
    Outbound(OutboundRole),
    Inbound(InboundRole),
}

/// Snapshot of a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    pub controller_id: String,
    pub label: String,
    pub kind: ControllerKind,
    pub state: ControllerState,
    pub media_object_id: Option<String>,
    pub role: ControllerRole,
    /// Bumped on every change
    pub version: u64,
}

/// Lifecycle transitions shared by every controller
pub trait Stateful {
    fn state(&self) -> ControllerState;

    /// Move to `next`. Returns false when nothing changed: `next` is the
    /// current state, `next` is CLOSED, or the controller is already closed.
    fn transition(&mut self, next: ControllerState) -> bool;

    /// Enter the terminal state
    fn close(&mut self) -> bool;
}

/// State reported by the paired controller on the remote endpoint
pub trait RemoteMirrored {
    fn remote_endpoint_id(&self) -> &str;

    fn remote_state(&self) -> Option<ControllerState>;

    /// Record the remote state; returns false when unchanged
    fn mirror_remote_state(&mut self, state: ControllerState) -> bool;
}

impl Controller {
    pub fn local(
        controller_id: &str,
        label: &str,
        kind: ControllerKind,
        source: CaptureSource,
    ) -> Self {
        Self {
            controller_id: controller_id.to_string(),
            label: label.to_string(),
            kind,
            state: ControllerState::Starting,
            media_object_id: Some(controller_id.to_string()),
            role: ControllerRole::Local(LocalRole {
                shared_with: BTreeSet::new(),
                source,
            }),
            version: 0,
        }
    }

    /// Outbound counterpart of a local controller; shares its id
    pub fn outbound(local: &Controller, remote_endpoint_id: &str) -> Self {
        Self {
            controller_id: local.controller_id.clone(),
            label: local.label.clone(),
            kind: local.kind,
            state: ControllerState::Starting,
            media_object_id: None,
            role: ControllerRole::Outbound(OutboundRole {
                remote_endpoint_id: remote_endpoint_id.to_string(),
                local_controller_id: local.controller_id.clone(),
                transmission_id: None,
                remote_state: None,
            }),
            version: 0,
        }
    }

    pub fn inbound(remote_endpoint_id: &str, announcement: &AddInboundController) -> Self {
        Self {
            controller_id: announcement.controller_id.clone(),
            label: announcement.label.clone(),
            kind: announcement.kind,
            state: ControllerState::Starting,
            media_object_id: None,
            role: ControllerRole::Inbound(InboundRole {
                remote_endpoint_id: remote_endpoint_id.to_string(),
                remote_state: announcement.state,
            }),
            version: 0,
        }
    }

    pub fn as_local(&self) -> Option<&LocalRole> {
        match &self.role {
            ControllerRole::Local(role) => Some(role),
            _ => None,
        }
    }

    pub fn as_local_mut(&mut self) -> Option<&mut LocalRole> {
        match &mut self.role {
            ControllerRole::Local(role) => Some(role),
            _ => None,
        }
    }

    pub fn as_outbound(&self) -> Option<&OutboundRole> {
        match &self.role {
            ControllerRole::Outbound(role) => Some(role),
            _ => None,
        }
    }

    pub fn as_outbound_mut(&mut self) -> Option<&mut OutboundRole> {
        match &mut self.role {
            ControllerRole::Outbound(role) => Some(role),
            _ => None,
        }
    }

    pub fn as_inbound(&self) -> Option<&InboundRole> {
        match &self.role {
            ControllerRole::Inbound(role) => Some(role),
            _ => None,
        }
    }

    /// Remote half of an outbound or inbound controller
    pub fn remote(&self) -> Option<&dyn RemoteMirrored> {
        match &self.role {
            ControllerRole::Local(_) => None,
            ControllerRole::Outbound(role) => Some(role),
            ControllerRole::Inbound(role) => Some(role),
        }
    }

    pub fn remote_mut(&mut self) -> Option<&mut dyn RemoteMirrored> {
        match &mut self.role {
            ControllerRole::Local(_) => None,
            ControllerRole::Outbound(role) => Some(role),
            ControllerRole::Inbound(role) => Some(role),
        }
    }

    /// Record a change that is not a state transition
    pub fn touch(&mut self) {
        self.version += 1;
    }
}

impl Stateful for Controller {
    fn state(&self) -> ControllerState {
        self.state
    }

    fn transition(&mut self, next: ControllerState) -> bool {
        if next == self.state || next.is_terminal() || self.state.is_terminal() {
            return false;
        }
        self.state = next;
        self.version += 1;
        true
    }

    fn close(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = ControllerState::Closed;
        self.version += 1;
        true
    }
}

impl RemoteMirrored for OutboundRole {
    fn remote_endpoint_id(&self) -> &str {
        &self.remote_endpoint_id
    }

    fn remote_state(&self) -> Option<ControllerState> {
        self.remote_state
    }

    fn mirror_remote_state(&mut self, state: ControllerState) -> bool {
        if self.remote_state == Some(state) {
            return false;
        }
        self.remote_state = Some(state);
        true
    }
}

impl RemoteMirrored for InboundRole {
    fn remote_endpoint_id(&self) -> &str {
        &self.remote_endpoint_id
    }

    fn remote_state(&self) -> Option<ControllerState> {
        Some(self.remote_state)
    }

    fn mirror_remote_state(&mut self, state: ControllerState) -> bool {
        if self.remote_state == state {
            return false;
        }
        self.remote_state = state;
        true
    }
}
