//! Traits for signaling channels

use async_trait::async_trait;
use futures::Stream;
use peerlink_types::SignalingMessage;
use std::pin::Pin;

use crate::error::SignalingError;

/// A message received from a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSignal {
    pub from: String,
    pub message: SignalingMessage,
}

/// Stream of inbound messages, in per-sender delivery order
pub type SignalStream =
    Pin<Box<dyn Stream<Item = std::result::Result<InboundSignal, SignalingError>> + Send>>;

/// Trait for signaling channels
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Identifier of the endpoint this channel speaks for
    fn local_endpoint_id(&self) -> &str;

    /// Send a message to a remote endpoint
    async fn send(
        &self,
        to: &str,
        message: SignalingMessage,
    ) -> std::result::Result<(), SignalingError>;

    /// Subscribe to messages addressed to this endpoint
    async fn subscribe(&self) -> std::result::Result<SignalStream, SignalingError>;

    /// Get the channel type name
    fn client_type(&self) -> &str;
}
