//! Envelope carrying one signaling message between two endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TypesError};
use crate::messages::SignalingMessage;

/// Addressed signaling message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    /// Unique message identifier
    pub message_id: Uuid,

    /// Sending endpoint
    pub from: String,

    /// Receiving endpoint
    pub to: String,

    /// Time the message was handed to the channel
    pub sent_at: DateTime<Utc>,

    pub message: SignalingMessage,
}

impl SignalEnvelope {
    /// Wrap a message for delivery
    pub fn new(from: impl Into<String>, to: impl Into<String>, message: SignalingMessage) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            sent_at: Utc::now(),
            message,
        }
    }

    pub fn encode(&self) -> Result<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate an envelope received from the wire
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let envelope: SignalEnvelope = serde_json::from_slice(raw)?;
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            return Err(TypesError::MissingField("from".to_string()));
        }
        if self.to.is_empty() {
            return Err(TypesError::MissingField("to".to_string()));
        }
        if self.from == self.to {
            return Err(TypesError::InvalidEnvelope(format!(
                "endpoint {} cannot signal itself",
                self.from
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::RemoveInboundTransmission;

    fn sample_message() -> SignalingMessage {
        SignalingMessage::RemoveInboundTransmission(RemoveInboundTransmission {
            transmission_id: "stream-1".to_string(),
        })
    }

    #[test]
    fn test_envelope_encode_decode() {
        let envelope = SignalEnvelope::new("alice", "bob", sample_message());
        let raw = envelope.encode().unwrap();
        let decoded = SignalEnvelope::decode(raw.as_bytes()).unwrap();

        assert_eq!(decoded.message_id, envelope.message_id);
        assert_eq!(decoded.from, "alice");
        assert_eq!(decoded.message, envelope.message);
    }

    #[test]
    fn test_envelope_requires_addresses() {
        let envelope = SignalEnvelope::new("", "bob", sample_message());
        assert!(matches!(envelope.encode(), Err(TypesError::MissingField(_))));

        let envelope = SignalEnvelope::new("bob", "bob", sample_message());
        assert!(matches!(envelope.validate(), Err(TypesError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_malformed_envelope_is_an_error() {
        assert!(matches!(
            SignalEnvelope::decode(b"{\"from\": \"a\"}"),
            Err(TypesError::Serialization(_))
        ));
    }
}
