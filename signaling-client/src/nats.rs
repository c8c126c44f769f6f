//! NATS implementation of the signaling channel
//!
//! Each endpoint listens on `<prefix>.signal.<endpoint_id>`; sending to a
//! remote endpoint publishes an encoded envelope to that endpoint's subject.
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
use peerlink_config::SignalingConfig;
use peerlink_types::{SignalEnvelope, SignalingMessage};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SignalingError};
use crate::traits::{InboundSignal, SignalStream, SignalingChannel};

/// NATS-backed signaling channel
pub struct NatsSignalingChannel {
    client: async_nats::Client,
    endpoint_id: String,
    subject_prefix: String,
}

impl NatsSignalingChannel {
    /// Connect to a NATS server on behalf of `endpoint_id`
    pub async fn new(
        url: &str,
        endpoint_id: impl Into<String>,
        subject_prefix: Option<String>,
    ) -> Result<Self> {
        let endpoint_id = endpoint_id.into();
        info!(url = url, endpoint_id = %endpoint_id, "Connecting to NATS server");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| SignalingError::Connection(e.to_string()))?;

        let subject_prefix = subject_prefix.unwrap_or_else(|| "peerlink".to_string());

        info!(
            endpoint_id = %endpoint_id,
            subject_prefix = %subject_prefix,
            "NATS signaling channel initialized"
        );

        Ok(Self {
            client,
            endpoint_id,
            subject_prefix,
        })
    }

    pub async fn from_config(
        config: &SignalingConfig,
        endpoint_id: impl Into<String>,
    ) -> Result<Self> {
        Self::new(&config.url, endpoint_id, Some(config.subject_prefix.clone())).await
    }

    /// Get the subject an endpoint listens on
    pub fn subject_for_endpoint(&self, endpoint_id: &str) -> String {
        signal_subject(&self.subject_prefix, endpoint_id)
    }
}

/// Subject for an endpoint; NATS token separators in the id are replaced
pub fn signal_subject(prefix: &str, endpoint_id: &str) -> String {
    let token: String = endpoint_id
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' => '_',
            c => c,
        })
        .collect();
    format!("{}.signal.{}", prefix, token)
}

#[async_trait]
impl SignalingChannel for NatsSignalingChannel {
    fn local_endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    async fn send(&self, to: &str, message: SignalingMessage) -> Result<()> {
        let kind = message.kind();
        let envelope = SignalEnvelope::new(self.endpoint_id.as_str(), to, message);
        let payload = envelope.encode()?.into_bytes();
        let subject = self.subject_for_endpoint(to);

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| SignalingError::Publish(e.to_string()))?;

        debug!(
            kind = %kind,
            message_id = %envelope.message_id,
            subject = subject,
            "Signal published"
        );

        Ok(())
    }

    async fn subscribe(&self) -> Result<SignalStream> {
        let subject = self.subject_for_endpoint(&self.endpoint_id);

        info!(subject = subject, "Subscribing to signals");

        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| SignalingError::Subscribe(e.to_string()))?;

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<InboundSignal>>(100);
        let endpoint_id = self.endpoint_id.clone();

        // Spawn a task to forward decoded envelopes
        tokio::spawn(async move {
            while let Some(nats_msg) = subscriber.next().await {
                let item = match SignalEnvelope::decode(&nats_msg.payload) {
                    Ok(envelope) if envelope.to == endpoint_id => Ok(InboundSignal {
                        from: envelope.from,
                        message: envelope.message,
                    }),
                    Ok(envelope) => {
                        warn!(
                            to = %envelope.to,
                            "Envelope addressed to another endpoint, skipping"
                        );
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to decode signal envelope");
                        Err(SignalingError::Protocol(e))
                    }
                };

                if tx.send(item).await.is_err() {
                    debug!(subject = subject, "Receiver dropped, stopping subscription");
                    break;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn client_type(&self) -> &str {
        "nats"
    }
}
