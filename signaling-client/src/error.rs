//! Error types for signaling operations

use thiserror::Error;

/// Errors that can occur while sending or receiving signaling messages
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] peerlink_types::TypesError),

    #[error("Channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SignalingError>;
