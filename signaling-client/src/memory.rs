//! In-process signaling hub
//!
//! Routes encoded envelopes between channels created from the same hub.
//! Used for local loopback sessions and integration tests.
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
use peerlink_types::{SignalEnvelope, SignalingMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use tracing::{debug, warn};

use crate::error::{Result, SignalingError};
use crate::traits::{InboundSignal, SignalStream, SignalingChannel};

type Route = mpsc::UnboundedSender<String>;

/// Process-local router shared by every connected endpoint
#[derive(Clone, Default)]
pub struct MemorySignalingHub {
    routes: Arc<Mutex<HashMap<String, Route>>>,
}

impl MemorySignalingHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint; replaces any previous channel for the same id
    pub fn connect(&self, endpoint_id: impl Into<String>) -> MemorySignalingChannel {
        let endpoint_id = endpoint_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint_id.clone(), tx.clone());

        debug!(endpoint_id = %endpoint_id, "Endpoint attached to signaling hub");

        MemorySignalingChannel {
            endpoint_id,
            hub: self.clone(),
            route: tx,
            inbox: Mutex::new(Some(rx)),
        }
    }

    /// Detach an endpoint; later messages to it are dropped
    pub fn disconnect(&self, endpoint_id: &str) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(endpoint_id);
    }

    fn detach(&self, endpoint_id: &str, route: &Route) {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        if routes.get(endpoint_id).is_some_and(|current| current.same_channel(route)) {
            routes.remove(endpoint_id);
        }
    }

    pub fn is_connected(&self, endpoint_id: &str) -> bool {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(endpoint_id)
    }

    fn route(&self, to: &str) -> Option<Route> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(to)
            .cloned()
    }
}

/// Channel for a single endpoint attached to a [`MemorySignalingHub`]
pub struct MemorySignalingChannel {
    endpoint_id: String,
    hub: MemorySignalingHub,
    route: Route,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

#[async_trait]
impl SignalingChannel for MemorySignalingChannel {
    fn local_endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    async fn send(&self, to: &str, message: SignalingMessage) -> Result<()> {
        let kind = message.kind();
        let raw = SignalEnvelope::new(self.endpoint_id.as_str(), to, message).encode()?;

        let Some(route) = self.hub.route(to) else {
            warn!(
                from = %self.endpoint_id,
                to = %to,
                kind = %kind,
                "No route to endpoint, dropping message"
            );
            return Ok(());
        };

        if route.send(raw).is_err() {
            warn!(
                from = %self.endpoint_id,
                to = %to,
                kind = %kind,
                "Endpoint inbox closed, dropping message"
            );
            self.hub.detach(to, &route);
            return Ok(());
        }

        debug!(from = %self.endpoint_id, to = %to, kind = %kind, "Signal routed");
        Ok(())
    }

    async fn subscribe(&self) -> Result<SignalStream> {
        let inbox = self
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| SignalingError::Subscribe("inbox already taken".to_string()))?;

        let stream = UnboundedReceiverStream::new(inbox).map(|raw| -> Result<InboundSignal> {
            let envelope = SignalEnvelope::decode(raw.as_bytes())?;
            Ok(InboundSignal {
                from: envelope.from,
                message: envelope.message,
            })
        });

        Ok(Box::pin(stream))
    }

    fn client_type(&self) -> &str {
        "memory"
    }
}

impl Drop for MemorySignalingChannel {
    fn drop(&mut self) {
        self.hub.detach(&self.endpoint_id, &self.route);
    }
}
