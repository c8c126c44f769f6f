//! Signaling message definitions
//!
//! Every message exchanged between two endpoints is one variant of
//! [`SignalingMessage`]. On the wire a message is an object with a `kind`
//! discriminator and a `payload`:
//!
//! ```json
//! {"kind": "MODIFY_INBOUND_CONTROLLER",
//!  "payload": {"controllerId": "c1", "mediaObjectId": null, "state": "STOPPED"}}
//! ```
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

use crate::states::{ControllerKind, ControllerState, MediaKind, TransmissionState};

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// A session description as produced or consumed by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptionInit {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescriptionInit {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

/// A trickled ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddInboundTransmission {
    pub transmission_id: String,
    pub label: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveInboundTransmission {
    pub transmission_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundTransmissionStateChange {
    pub transmission_id: String,
    pub state: TransmissionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddInboundController {
    pub controller_id: String,
    pub label: String,
    pub state: ControllerState,
    pub kind: ControllerKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveInboundController {
    pub controller_id: String,
}

/// Sent by the owner of an outbound controller on every transition.
/// `media_object_id` carries the transmission id while the controller is
/// ready and is null otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyInboundController {
    pub controller_id: String,
    pub media_object_id: Option<String>,
    pub state: ControllerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyOutboundController {
    pub controller_id: String,
    pub state: ControllerState,
}

/// Message kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    IceCandidate,
    SessionDescription,
    AddInboundTransmission,
    RemoveInboundTransmission,
    OutboundTransmissionStateChange,
    AddInboundController,
    RemoveInboundController,
    ModifyInboundController,
    ModifyOutboundController,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::IceCandidate => "ICE_CANDIDATE",
            MessageKind::SessionDescription => "SESSION_DESCRIPTION",
            MessageKind::AddInboundTransmission => "ADD_INBOUND_TRANSMISSION",
            MessageKind::RemoveInboundTransmission => "REMOVE_INBOUND_TRANSMISSION",
            MessageKind::OutboundTransmissionStateChange => "OUTBOUND_TRANSMISSION_STATE_CHANGE",
            MessageKind::AddInboundController => "ADD_INBOUND_CONTROLLER",
            MessageKind::RemoveInboundController => "REMOVE_INBOUND_CONTROLLER",
            MessageKind::ModifyInboundController => "MODIFY_INBOUND_CONTROLLER",
            MessageKind::ModifyOutboundController => "MODIFY_OUTBOUND_CONTROLLER",
        }
    }

    /// Whether messages of this kind are consumed by the transmission layer
    pub fn is_transmission(&self) -> bool {
        matches!(
            self,
            MessageKind::IceCandidate
                | MessageKind::SessionDescription
                | MessageKind::AddInboundTransmission
                | MessageKind::RemoveInboundTransmission
                | MessageKind::OutboundTransmissionStateChange
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-level signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalingMessage {
    /// `None` marks the end of candidate gathering
    IceCandidate(Option<IceCandidateInit>),
    SessionDescription(SessionDescriptionInit),
    AddInboundTransmission(AddInboundTransmission),
    RemoveInboundTransmission(RemoveInboundTransmission),
    OutboundTransmissionStateChange(OutboundTransmissionStateChange),
    AddInboundController(AddInboundController),
    RemoveInboundController(RemoveInboundController),
    ModifyInboundController(ModifyInboundController),
    ModifyOutboundController(ModifyOutboundController),
}

impl SignalingMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SignalingMessage::IceCandidate(_) => MessageKind::IceCandidate,
            SignalingMessage::SessionDescription(_) => MessageKind::SessionDescription,
            SignalingMessage::AddInboundTransmission(_) => MessageKind::AddInboundTransmission,
            SignalingMessage::RemoveInboundTransmission(_) => {
                MessageKind::RemoveInboundTransmission
            }
            SignalingMessage::OutboundTransmissionStateChange(_) => {
                MessageKind::OutboundTransmissionStateChange
            }
            SignalingMessage::AddInboundController(_) => MessageKind::AddInboundController,
            SignalingMessage::RemoveInboundController(_) => MessageKind::RemoveInboundController,
            SignalingMessage::ModifyInboundController(_) => MessageKind::ModifyInboundController,
            SignalingMessage::ModifyOutboundController(_) => MessageKind::ModifyOutboundController,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_modify_inbound_controller_wire_shape() {
        let message = SignalingMessage::ModifyInboundController(ModifyInboundController {
            controller_id: "c1".to_string(),
            media_object_id: None,
            state: ControllerState::Stopped,
        });

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "MODIFY_INBOUND_CONTROLLER",
                "payload": {"controllerId": "c1", "mediaObjectId": null, "state": "STOPPED"}
            })
        );
    }

    #[test]
    fn test_end_of_candidates_is_null_payload() {
        let message = SignalingMessage::IceCandidate(None);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, json!({"kind": "ICE_CANDIDATE", "payload": null}));

        let decoded: SignalingMessage = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, SignalingMessage::IceCandidate(None));
    }

    #[test]
    fn test_session_description_uses_type_field() {
        let value = json!({
            "kind": "SESSION_DESCRIPTION",
            "payload": {"type": "offer", "sdp": "v=0"}
        });
        let decoded: SignalingMessage = serde_json::from_value(value).unwrap();
        match decoded {
            SignalingMessage::SessionDescription(desc) => {
                assert!(desc.is_offer());
                assert_eq!(desc.sdp, "v=0");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_candidate_field_names() {
        let candidate = IceCandidateInit {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.1 54400 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        };
        let value = serde_json::to_value(&candidate).unwrap();
        assert_eq!(value["sdpMid"], "0");
        assert_eq!(value["sdpMLineIndex"], 0);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let value = json!({"kind": "RTC_SOMETHING_NEW", "payload": {}});
        assert!(serde_json::from_value::<SignalingMessage>(value).is_err());
    }

    #[test]
    fn test_kind_matches_wire_name() {
        let message = SignalingMessage::RemoveInboundController(RemoveInboundController {
            controller_id: "c1".to_string(),
        });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["kind"], message.kind().as_str());
        assert!(!message.kind().is_transmission());
        assert!(MessageKind::IceCandidate.is_transmission());
    }
}
