//! Controller manager
//!
//! Owns the local, outbound and inbound controller collections, keeps each
//! outbound controller in step with its local controller, routes controller
//! signaling, and closes a peer connection once neither side has a
//! controller left for that peer.
//!
//! Registry and controller listeners never act directly. They queue a
//! [`Command`] that [`ControllerManager::process_pending`] runs in order, and
//! every command re-reads current state before it touches anything.
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


use peerlink_types::{
    AddInboundController, ControllerKind, ControllerState, ModifyInboundController,
    ModifyOutboundController, RemoveInboundController, SignalingMessage,
};
use signaling_client::SignalingChannel;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::controller::{CaptureSource, Controller, Stateful};
use crate::error::{SessionError, SessionResult};
use crate::listeners::{IdListeners, ListenerEvent, Subscription};
use crate::media_capture::CameraConstraints;
use crate::media_registry::MediaRegistry;
use crate::transmission_manager::TransmissionManager;

/// Key of a remote controller: remote endpoint id and controller id
pub type ControllerKey = (String, String);

/// Deferred reaction to a listener notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// The media object of a local controller changed
    LocalMediaChanged { controller_id: String },
    /// The media object loaded by an inbound controller changed
    InboundMediaChanged {
        remote_endpoint_id: String,
        controller_id: String,
    },
    /// Bring an outbound controller in line with its local controller
    SyncOutbound {
        remote_endpoint_id: String,
        controller_id: String,
    },
}

#[derive(Default)]
struct CommandQueue {
    pending: Mutex<VecDeque<Command>>,
    notify: Notify,
}

impl CommandQueue {
    fn push(&self, command: Command) {
        self.lock().push_back(command);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Command> {
        self.lock().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Command>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Owner {
    Local(String),
    Outbound(String, String),
    Inbound(String, String),
}

#[derive(Default)]
struct ControllerStore {
    local: HashMap<String, Controller>,
    outbound: HashMap<String, HashMap<String, Controller>>,
    inbound: HashMap<String, HashMap<String, Controller>>,
}

impl ControllerStore {
    fn outbound_mut(
        &mut self,
        remote_endpoint_id: &str,
        controller_id: &str,
    ) -> Option<&mut Controller> {
        self.outbound
            .get_mut(remote_endpoint_id)
            .and_then(|controllers| controllers.get_mut(controller_id))
    }

    fn inbound_mut(
        &mut self,
        remote_endpoint_id: &str,
        controller_id: &str,
    ) -> Option<&mut Controller> {
        self.inbound
            .get_mut(remote_endpoint_id)
            .and_then(|controllers| controllers.get_mut(controller_id))
    }

    fn is_idle(&self, remote_endpoint_id: &str) -> bool {
        self.outbound
            .get(remote_endpoint_id)
            .map_or(true, HashMap::is_empty)
            && self
                .inbound
                .get(remote_endpoint_id)
                .map_or(true, HashMap::is_empty)
    }
}

pub struct ControllerManager {
    registry: Arc<MediaRegistry>,
    transmissions: Arc<TransmissionManager>,
    signaling: Arc<dyn SignalingChannel>,
    store: Mutex<ControllerStore>,
    subscriptions: Mutex<HashMap<Owner, Subscription>>,
    local_listeners: IdListeners<String, Controller>,
    outbound_listeners: IdListeners<ControllerKey, Controller>,
    inbound_listeners: IdListeners<ControllerKey, Controller>,
    queue: Arc<CommandQueue>,
    draining: AtomicBool,
}

impl ControllerManager {
    pub fn new(
        registry: Arc<MediaRegistry>,
        transmissions: Arc<TransmissionManager>,
        signaling: Arc<dyn SignalingChannel>,
    ) -> Self {
        Self {
            registry,
            transmissions,
            signaling,
            store: Mutex::new(ControllerStore::default()),
            subscriptions: Mutex::new(HashMap::new()),
            local_listeners: IdListeners::new(),
            outbound_listeners: IdListeners::new(),
            inbound_listeners: IdListeners::new(),
            queue: Arc::new(CommandQueue::default()),
            draining: AtomicBool::new(false),
        }
    }

    // Local controllers

    /// Create a camera controller and acquire its stream. Acquisition
    /// failure leaves the controller in FAILED.
    pub async fn add_local_camera_controller(
        &self,
        label: &str,
        constraints: CameraConstraints,
    ) -> SessionResult<String> {
        let source = CaptureSource::Camera(constraints);
        self.add_local_controller(label, ControllerKind::Camera, source).await
    }

    pub async fn add_local_screen_controller(&self, label: &str) -> SessionResult<String> {
        self.add_local_controller(label, ControllerKind::Screen, CaptureSource::Screen)
            .await
    }

    async fn add_local_controller(
        &self,
        label: &str,
        kind: ControllerKind,
        source: CaptureSource,
    ) -> SessionResult<String> {
        let controller_id = Uuid::new_v4().to_string();
        let controller = Controller::local(&controller_id, label, kind, source.clone());

        let queue = Arc::clone(&self.queue);
        let watched_id = controller_id.clone();
        let subscription = self.registry.subscribe(&controller_id, move |_| {
            queue.push(Command::LocalMediaChanged {
                controller_id: watched_id.clone(),
            });
        });
        self.own(Owner::Local(controller_id.clone()), subscription);

        self.lock_store()
            .local
            .insert(controller_id.clone(), controller.clone());
        info!(
            controller_id = %controller_id,
            kind = %kind,
            label = %label,
            "Local controller added"
        );
        self.local_listeners
            .notify(&controller_id, ListenerEvent::Added(controller));

        if let Err(e) = self.acquire(&controller_id, &source).await {
            warn!(controller_id = %controller_id, error = %e, "Capture failed");
            self.transition_local(&controller_id, ControllerState::Failed);
            return Err(e);
        }
        Ok(controller_id)
    }

    async fn acquire(&self, controller_id: &str, source: &CaptureSource) -> SessionResult<()> {
        match source {
            CaptureSource::Camera(constraints) => {
                self.registry.get_camera_stream(controller_id, constraints).await?;
            }
            CaptureSource::Screen => {
                self.registry.get_screen_stream(controller_id).await?;
            }
        }
        Ok(())
    }

    /// Re-acquire the resource of a local controller
    pub async fn restart_local_controller(&self, controller_id: &str) -> SessionResult<()> {
        let source = self
            .local_controller(controller_id)
            .and_then(|controller| controller.as_local().map(|role| role.source.clone()))
            .ok_or_else(|| not_found(controller_id))?;

        info!(controller_id = %controller_id, "Restarting local controller");
        self.transition_local(controller_id, ControllerState::Starting);

        if let Err(e) = self.acquire(controller_id, &source).await {
            warn!(controller_id = %controller_id, error = %e, "Capture failed on restart");
            self.transition_local(controller_id, ControllerState::Failed);
            return Err(e);
        }
        Ok(())
    }

    pub fn fail_local_controller(&self, controller_id: &str) -> SessionResult<()> {
        if !self.transition_local_checked(controller_id, ControllerState::Failed)? {
            debug!(controller_id = %controller_id, "Already failed");
        }
        Ok(())
    }

    /// Release the capture; the controller can be restarted later
    pub fn stop_local_controller(&self, controller_id: &str) -> SessionResult<()> {
        self.transition_local_checked(controller_id, ControllerState::Stopped)?;
        self.registry.remove_media_object(controller_id);
        Ok(())
    }

    /// Destroy a local controller together with every outbound copy
    pub async fn remove_local_controller(&self, controller_id: &str) -> SessionResult<()> {
        let removed = self
            .lock_store()
            .local
            .remove(controller_id)
            .ok_or_else(|| not_found(controller_id))?;
        self.release(&Owner::Local(controller_id.to_string()));

        if let Some(role) = removed.as_local() {
            for remote_endpoint_id in &role.shared_with {
                self.remove_outbound(remote_endpoint_id, controller_id).await;
            }
        }
        self.registry.remove_media_object(controller_id);

        let mut closed = removed;
        closed.close();
        info!(controller_id = %controller_id, "Local controller removed");
        self.local_listeners
            .notify(&controller_id.to_string(), ListenerEvent::Removed(closed));
        Ok(())
    }

    fn transition_local(&self, controller_id: &str, next: ControllerState) -> bool {
        self.transition_local_checked(controller_id, next)
            .unwrap_or(false)
    }

    fn transition_local_checked(
        &self,
        controller_id: &str,
        next: ControllerState,
    ) -> SessionResult<bool> {
        let snapshot = {
            let mut store = self.lock_store();
            let controller = store
                .local
                .get_mut(controller_id)
                .ok_or_else(|| not_found(controller_id))?;
            if !controller.transition(next) {
                return Ok(false);
            }
            controller.clone()
        };

        debug!(controller_id = %controller_id, state = %next, "Local controller state changed");
        self.local_listeners
            .notify(&controller_id.to_string(), ListenerEvent::Modified(snapshot));
        Ok(true)
    }

    /// READY while the media object exists; STOPPED once a ready resource
    /// disappears
    fn on_local_media_changed(&self, controller_id: &str) {
        let Some(state) = self.local_controller(controller_id).map(|c| c.state) else {
            return;
        };
        let present = self.registry.has_media_object(controller_id);

        match (present, state) {
            (true, ControllerState::Starting) => {
                self.transition_local(controller_id, ControllerState::Ready);
            }
            (false, ControllerState::Ready) => {
                self.transition_local(controller_id, ControllerState::Stopped);
            }
            _ => {}
        }
    }

    // Outbound controllers

    /// Mirror a local controller to a remote endpoint
    pub async fn share_local_controller(
        &self,
        controller_id: &str,
        remote_endpoint_id: &str,
    ) -> SessionResult<()> {
        let outbound = {
            let mut store = self.lock_store();
            let local = store
                .local
                .get(controller_id)
                .cloned()
                .ok_or_else(|| not_found(controller_id))?;
            if store.outbound_mut(remote_endpoint_id, controller_id).is_some() {
                debug!(
                    controller_id = %controller_id,
                    remote_endpoint_id = %remote_endpoint_id,
                    "Already shared"
                );
                return Ok(());
            }

            let outbound = Controller::outbound(&local, remote_endpoint_id);
            store
                .outbound
                .entry(remote_endpoint_id.to_string())
                .or_default()
                .insert(controller_id.to_string(), outbound.clone());
            if let Some(role) = store
                .local
                .get_mut(controller_id)
                .and_then(Controller::as_local_mut)
            {
                role.shared_with.insert(remote_endpoint_id.to_string());
            }
            outbound
        };

        let queue = Arc::clone(&self.queue);
        let sync = Command::SyncOutbound {
            remote_endpoint_id: remote_endpoint_id.to_string(),
            controller_id: controller_id.to_string(),
        };
        let on_local_change = sync.clone();
        let subscription = self
            .local_listeners
            .subscribe(controller_id.to_string(), move |_| queue.push(on_local_change.clone()));
        self.own(
            Owner::Outbound(remote_endpoint_id.to_string(), controller_id.to_string()),
            subscription,
        );

        info!(
            controller_id = %controller_id,
            remote_endpoint_id = %remote_endpoint_id,
            "Sharing local controller"
        );
        self.outbound_listeners.notify(
            &(remote_endpoint_id.to_string(), controller_id.to_string()),
            ListenerEvent::Added(outbound.clone()),
        );

        self.transmissions.connect(remote_endpoint_id)?;
        self.send(
            remote_endpoint_id,
            SignalingMessage::AddInboundController(AddInboundController {
                controller_id: controller_id.to_string(),
                label: outbound.label.clone(),
                state: outbound.state,
                kind: outbound.kind,
            }),
        )
        .await?;

        self.queue.push(sync);
        Ok(())
    }

    /// Stop mirroring a local controller to a remote endpoint
    pub async fn unshare(&self, remote_endpoint_id: &str, controller_id: &str) {
        if let Some(role) = self
            .lock_store()
            .local
            .get_mut(controller_id)
            .and_then(Controller::as_local_mut)
        {
            role.shared_with.remove(remote_endpoint_id);
        }
        self.remove_outbound(remote_endpoint_id, controller_id).await;
    }

    async fn sync_outbound(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
    ) -> SessionResult<()> {
        let local = self.local_controller(controller_id);
        let outbound = self.outbound_controller(remote_endpoint_id, controller_id);
        let (local, outbound) = match (local, outbound) {
            (_, None) => return Ok(()),
            (None, Some(_)) => {
                self.remove_outbound(remote_endpoint_id, controller_id).await;
                return Ok(());
            }
            (Some(local), Some(outbound)) => (local, outbound),
        };

        match local.state {
            ControllerState::Ready => {
                if outbound.state == ControllerState::Ready {
                    return Ok(());
                }
                let Some(stream) = self
                    .registry
                    .media_object(controller_id)
                    .and_then(|object| object.stream)
                else {
                    warn!(controller_id = %controller_id, "Ready controller without a stream");
                    return Ok(());
                };

                let transmission_id = self
                    .transmissions
                    .add_stream_transmission(remote_endpoint_id, stream, &local.label)
                    .await?;

                let local_ready = self
                    .local_controller(controller_id)
                    .map_or(false, |c| c.state == ControllerState::Ready);
                let changed = if local_ready {
                    self.update_outbound(remote_endpoint_id, controller_id, |controller| {
                        if let Some(role) = controller.as_outbound_mut() {
                            role.transmission_id = Some(transmission_id.clone());
                        }
                        controller.media_object_id = Some(transmission_id.clone());
                        controller.transition(ControllerState::Ready)
                    })
                } else {
                    None
                };

                match changed {
                    Some(true) => {
                        self.send_modify_inbound(
                            remote_endpoint_id,
                            controller_id,
                            Some(transmission_id),
                            ControllerState::Ready,
                        )
                        .await
                    }
                    Some(false) => Ok(()),
                    None => {
                        // superseded while the transmission was being added
                        self.transmissions
                            .remove_outbound_transmission(remote_endpoint_id, &transmission_id)
                            .await
                    }
                }
            }
            ControllerState::Starting | ControllerState::Failed | ControllerState::Stopped => {
                self.release_transmission(remote_endpoint_id, controller_id).await;
                let next = local.state;
                let changed = self
                    .update_outbound(remote_endpoint_id, controller_id, |controller| {
                        controller.media_object_id = None;
                        controller.transition(next)
                    })
                    .unwrap_or(false);
                if changed {
                    self.send_modify_inbound(remote_endpoint_id, controller_id, None, next)
                        .await?;
                }
                Ok(())
            }
            ControllerState::Closed => {
                self.remove_outbound(remote_endpoint_id, controller_id).await;
                Ok(())
            }
        }
    }

    async fn release_transmission(&self, remote_endpoint_id: &str, controller_id: &str) {
        let transmission_id = self
            .lock_store()
            .outbound_mut(remote_endpoint_id, controller_id)
            .and_then(|controller| controller.as_outbound_mut())
            .and_then(|role| role.transmission_id.take());

        if let Some(transmission_id) = transmission_id {
            if let Err(e) = self
                .transmissions
                .remove_outbound_transmission(remote_endpoint_id, &transmission_id)
                .await
            {
                warn!(
                    transmission_id = %transmission_id,
                    error = %e,
                    "Failed to remove transmission"
                );
            }
        }
    }

    /// Stop an outbound controller, tell the remote to drop its inbound
    /// copy, and disconnect the peer if nothing else uses it
    async fn remove_outbound(&self, remote_endpoint_id: &str, controller_id: &str) {
        self.release(&Owner::Outbound(
            remote_endpoint_id.to_string(),
            controller_id.to_string(),
        ));
        self.release_transmission(remote_endpoint_id, controller_id).await;

        let removed = self
            .lock_store()
            .outbound
            .get_mut(remote_endpoint_id)
            .and_then(|controllers| controllers.remove(controller_id));
        let Some(mut removed) = removed else {
            return;
        };
        removed.close();

        info!(
            controller_id = %controller_id,
            remote_endpoint_id = %remote_endpoint_id,
            "Outbound controller removed"
        );
        self.outbound_listeners.notify(
            &(remote_endpoint_id.to_string(), controller_id.to_string()),
            ListenerEvent::Removed(removed),
        );

        if let Err(e) = self
            .send(
                remote_endpoint_id,
                SignalingMessage::RemoveInboundController(RemoveInboundController {
                    controller_id: controller_id.to_string(),
                }),
            )
            .await
        {
            warn!(controller_id = %controller_id, error = %e, "Failed to send controller removal");
        }

        self.disconnect_if_idle(remote_endpoint_id);
    }

    fn update_outbound<R>(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
        f: impl FnOnce(&mut Controller) -> R,
    ) -> Option<R> {
        let (result, snapshot) = {
            let mut store = self.lock_store();
            let controller = store.outbound_mut(remote_endpoint_id, controller_id)?;
            let version = controller.version;
            let result = f(controller);
            let snapshot = (controller.version != version).then(|| controller.clone());
            (result, snapshot)
        };
        if let Some(snapshot) = snapshot {
            self.outbound_listeners.notify(
                &(remote_endpoint_id.to_string(), controller_id.to_string()),
                ListenerEvent::Modified(snapshot),
            );
        }
        Some(result)
    }

    async fn send_modify_inbound(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
        media_object_id: Option<String>,
        state: ControllerState,
    ) -> SessionResult<()> {
        debug!(
            controller_id = %controller_id,
            remote_endpoint_id = %remote_endpoint_id,
            state = %state,
            "Outbound controller state changed"
        );
        self.send(
            remote_endpoint_id,
            SignalingMessage::ModifyInboundController(ModifyInboundController {
                controller_id: controller_id.to_string(),
                media_object_id,
                state,
            }),
        )
        .await
    }

    // Inbound controllers

    /// Route a controller-level signaling message
    pub async fn handle_signal(&self, from: &str, message: SignalingMessage) -> SessionResult<()> {
        match message {
            SignalingMessage::AddInboundController(payload) => {
                self.handle_add_inbound(from, payload);
                Ok(())
            }
            SignalingMessage::RemoveInboundController(payload) => {
                self.handle_remove_inbound(from, &payload.controller_id);
                Ok(())
            }
            SignalingMessage::ModifyInboundController(payload) => {
                self.handle_modify_inbound(from, payload).await
            }
            SignalingMessage::ModifyOutboundController(payload) => {
                self.handle_modify_outbound(from, payload);
                Ok(())
            }
            other => {
                debug!(kind = %other.kind(), "Not a controller message");
                Ok(())
            }
        }
    }

    fn handle_add_inbound(&self, remote_endpoint_id: &str, payload: AddInboundController) {
        let controller = {
            let mut store = self.lock_store();
            if store.inbound_mut(remote_endpoint_id, &payload.controller_id).is_some() {
                debug!(controller_id = %payload.controller_id, "Inbound controller already known");
                return;
            }
            let controller = Controller::inbound(remote_endpoint_id, &payload);
            store
                .inbound
                .entry(remote_endpoint_id.to_string())
                .or_default()
                .insert(payload.controller_id.clone(), controller.clone());
            controller
        };
        self.transmissions.allow_reconnect(remote_endpoint_id);

        info!(
            controller_id = %payload.controller_id,
            remote_endpoint_id = %remote_endpoint_id,
            kind = %payload.kind,
            "Inbound controller added"
        );
        self.inbound_listeners.notify(
            &(remote_endpoint_id.to_string(), payload.controller_id),
            ListenerEvent::Added(controller),
        );
    }

    fn handle_remove_inbound(&self, remote_endpoint_id: &str, controller_id: &str) {
        let removed = self
            .lock_store()
            .inbound
            .get_mut(remote_endpoint_id)
            .and_then(|controllers| controllers.remove(controller_id));
        let Some(mut removed) = removed else {
            debug!(controller_id = %controller_id, "Unknown inbound controller");
            return;
        };
        self.release(&Owner::Inbound(
            remote_endpoint_id.to_string(),
            controller_id.to_string(),
        ));
        removed.close();

        info!(
            controller_id = %controller_id,
            remote_endpoint_id = %remote_endpoint_id,
            "Inbound controller removed"
        );
        self.inbound_listeners.notify(
            &(remote_endpoint_id.to_string(), controller_id.to_string()),
            ListenerEvent::Removed(removed),
        );

        self.disconnect_if_idle(remote_endpoint_id);
    }

    async fn handle_modify_inbound(
        &self,
        remote_endpoint_id: &str,
        payload: ModifyInboundController,
    ) -> SessionResult<()> {
        let controller_id = payload.controller_id.as_str();
        let mirrored = self.update_inbound(remote_endpoint_id, controller_id, |controller| {
            let changed = controller
                .remote_mut()
                .map_or(false, |remote| remote.mirror_remote_state(payload.state));
            if changed {
                controller.touch();
            }
        });
        if mirrored.is_none() {
            debug!(controller_id = %controller_id, "Unknown inbound controller");
            return Ok(());
        }

        match (payload.state, payload.media_object_id) {
            (ControllerState::Ready, Some(media_object_id)) => {
                self.load(remote_endpoint_id, controller_id, &media_object_id).await
            }
            (ControllerState::Ready, None) => {
                warn!(controller_id = %controller_id, "Ready without a media object");
                Ok(())
            }
            (state, _) => {
                self.unload(remote_endpoint_id, controller_id);
                let next = match state {
                    ControllerState::Closed => ControllerState::Stopped,
                    other => other,
                };
                self.transition_inbound(remote_endpoint_id, controller_id, next)
                    .await
            }
        }
    }

    /// Watch the registry entry carrying the remote resource
    async fn load(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
        media_object_id: &str,
    ) -> SessionResult<()> {
        let loaded = self.update_inbound(remote_endpoint_id, controller_id, |controller| {
            if controller.media_object_id.as_deref() == Some(media_object_id) {
                return false;
            }
            controller.media_object_id = Some(media_object_id.to_string());
            controller.touch();
            true
        });

        if loaded == Some(true) {
            debug!(
                controller_id = %controller_id,
                media_object_id = %media_object_id,
                "Loading inbound media"
            );
            let queue = Arc::clone(&self.queue);
            let command = Command::InboundMediaChanged {
                remote_endpoint_id: remote_endpoint_id.to_string(),
                controller_id: controller_id.to_string(),
            };
            let subscription = self
                .registry
                .subscribe(media_object_id, move |_| queue.push(command.clone()));
            self.own(
                Owner::Inbound(remote_endpoint_id.to_string(), controller_id.to_string()),
                subscription,
            );
        }

        self.on_inbound_media_changed(remote_endpoint_id, controller_id)
            .await
    }

    fn unload(&self, remote_endpoint_id: &str, controller_id: &str) {
        self.release(&Owner::Inbound(
            remote_endpoint_id.to_string(),
            controller_id.to_string(),
        ));
        self.update_inbound(remote_endpoint_id, controller_id, |controller| {
            if controller.media_object_id.take().is_some() {
                controller.touch();
            }
        });
    }

    /// READY while the loaded object exists, otherwise STARTING until it
    /// first appears and STOPPED once it goes away
    async fn on_inbound_media_changed(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
    ) -> SessionResult<()> {
        let Some(controller) = self.inbound_controller(remote_endpoint_id, controller_id) else {
            return Ok(());
        };
        let Some(media_object_id) = controller.media_object_id else {
            return Ok(());
        };
        let present = self.registry.has_media_object(&media_object_id);

        let next = match (present, controller.state) {
            (true, _) => ControllerState::Ready,
            (false, ControllerState::Ready) => ControllerState::Stopped,
            (false, ControllerState::Failed | ControllerState::Stopped) => {
                ControllerState::Starting
            }
            (false, state) => state,
        };
        self.transition_inbound(remote_endpoint_id, controller_id, next)
            .await
    }

    /// Apply a local transition and report it to the remote owner
    async fn transition_inbound(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
        next: ControllerState,
    ) -> SessionResult<()> {
        let changed = self
            .update_inbound(remote_endpoint_id, controller_id, |controller| {
                controller.transition(next)
            })
            .unwrap_or(false);
        if !changed {
            return Ok(());
        }

        debug!(
            controller_id = %controller_id,
            remote_endpoint_id = %remote_endpoint_id,
            state = %next,
            "Inbound controller state changed"
        );
        self.send(
            remote_endpoint_id,
            SignalingMessage::ModifyOutboundController(ModifyOutboundController {
                controller_id: controller_id.to_string(),
                state: next,
            }),
        )
        .await
    }

    fn handle_modify_outbound(&self, remote_endpoint_id: &str, payload: ModifyOutboundController) {
        let snapshot = {
            let mut store = self.lock_store();
            let Some(controller) = store.outbound_mut(remote_endpoint_id, &payload.controller_id)
            else {
                debug!(controller_id = %payload.controller_id, "Unknown outbound controller");
                return;
            };
            let changed = controller
                .remote_mut()
                .map_or(false, |remote| remote.mirror_remote_state(payload.state));
            if !changed {
                return;
            }
            controller.touch();
            controller.clone()
        };

        debug!(
            controller_id = %payload.controller_id,
            remote_endpoint_id = %remote_endpoint_id,
            remote_state = %payload.state,
            "Remote inbound controller state changed"
        );
        self.outbound_listeners.notify(
            &(remote_endpoint_id.to_string(), payload.controller_id),
            ListenerEvent::Modified(snapshot),
        );
    }

    fn update_inbound<R>(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
        f: impl FnOnce(&mut Controller) -> R,
    ) -> Option<R> {
        let (result, snapshot) = {
            let mut store = self.lock_store();
            let controller = store.inbound_mut(remote_endpoint_id, controller_id)?;
            let version = controller.version;
            let result = f(controller);
            let snapshot = (controller.version != version).then(|| controller.clone());
            (result, snapshot)
        };
        if let Some(snapshot) = snapshot {
            self.inbound_listeners.notify(
                &(remote_endpoint_id.to_string(), controller_id.to_string()),
                ListenerEvent::Modified(snapshot),
            );
        }
        Some(result)
    }

    // Peer lifecycle

    /// Disconnect a peer that has no controller in either direction
    fn disconnect_if_idle(&self, remote_endpoint_id: &str) {
        let idle = {
            let mut store = self.lock_store();
            let idle = store.is_idle(remote_endpoint_id);
            if idle {
                store.outbound.remove(remote_endpoint_id);
                store.inbound.remove(remote_endpoint_id);
            }
            idle
        };

        if idle && self.transmissions.has_connection(remote_endpoint_id) {
            info!(
                remote_endpoint_id = %remote_endpoint_id,
                "No controllers left, disconnecting peer"
            );
            self.transmissions.disconnect(remote_endpoint_id);
        }
    }

    /// Remove every controller. Peers left without controllers are
    /// disconnected along the way.
    pub async fn destroy(&self) {
        let local_ids: Vec<String> = self.lock_store().local.keys().cloned().collect();
        for controller_id in local_ids {
            if let Err(e) = self.remove_local_controller(&controller_id).await {
                debug!(controller_id = %controller_id, error = %e, "Already removed");
            }
        }

        let inbound = std::mem::take(&mut self.lock_store().inbound);
        for (remote_endpoint_id, controllers) in inbound {
            for (controller_id, mut controller) in controllers {
                self.release(&Owner::Inbound(remote_endpoint_id.clone(), controller_id.clone()));
                controller.close();
                self.inbound_listeners.notify(
                    &(remote_endpoint_id.clone(), controller_id),
                    ListenerEvent::Removed(controller),
                );
            }
        }
        self.lock_subscriptions().clear();
    }

    // Command queue

    /// Run queued commands until the queue is empty. Concurrent callers
    /// return immediately while another caller is draining.
    pub async fn process_pending(&self) {
        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                return;
            }
            while let Some(command) = self.queue.pop() {
                self.run(command).await;
            }
            self.draining.store(false, Ordering::Release);
            if self.queue.is_empty() {
                return;
            }
        }
    }

    async fn run(&self, command: Command) {
        debug!(command = ?command, "Running controller command");
        let result = match &command {
            Command::LocalMediaChanged { controller_id } => {
                self.on_local_media_changed(controller_id);
                Ok(())
            }
            Command::InboundMediaChanged {
                remote_endpoint_id,
                controller_id,
            } => {
                self.on_inbound_media_changed(remote_endpoint_id, controller_id)
                    .await
            }
            Command::SyncOutbound {
                remote_endpoint_id,
                controller_id,
            } => self.sync_outbound(remote_endpoint_id, controller_id).await,
        };

        if let Err(e) = result {
            error!(command = ?command, error = %e, "Controller command failed");
        }
    }

    /// Drain the queue in the background whenever a command arrives
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                manager.queue.notify.notified().await;
                manager.process_pending().await;
            }
        })
    }

    // Queries and subscriptions

    pub fn local_controller(&self, controller_id: &str) -> Option<Controller> {
        self.lock_store().local.get(controller_id).cloned()
    }

    pub fn local_controllers(&self) -> Vec<Controller> {
        self.lock_store().local.values().cloned().collect()
    }

    pub fn outbound_controller(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
    ) -> Option<Controller> {
        self.lock_store()
            .outbound_mut(remote_endpoint_id, controller_id)
            .cloned()
    }

    pub fn outbound_controllers(&self, remote_endpoint_id: &str) -> Vec<Controller> {
        self.lock_store()
            .outbound
            .get(remote_endpoint_id)
            .map(|controllers| controllers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn inbound_controller(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
    ) -> Option<Controller> {
        self.lock_store()
            .inbound_mut(remote_endpoint_id, controller_id)
            .cloned()
    }

    pub fn inbound_controllers(&self, remote_endpoint_id: &str) -> Vec<Controller> {
        self.lock_store()
            .inbound
            .get(remote_endpoint_id)
            .map(|controllers| controllers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscribe_local<F>(&self, controller_id: &str, callback: F) -> Subscription
    where
        F: Fn(&ListenerEvent<Controller>) + Send + Sync + 'static,
    {
        self.local_listeners.subscribe(controller_id.to_string(), callback)
    }

    pub fn subscribe_all_local<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&String, &ListenerEvent<Controller>) + Send + Sync + 'static,
    {
        self.local_listeners.subscribe_all(callback)
    }

    pub fn subscribe_outbound<F>(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&ListenerEvent<Controller>) + Send + Sync + 'static,
    {
        self.outbound_listeners.subscribe(
            (remote_endpoint_id.to_string(), controller_id.to_string()),
            callback,
        )
    }

    pub fn subscribe_all_outbound<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ControllerKey, &ListenerEvent<Controller>) + Send + Sync + 'static,
    {
        self.outbound_listeners.subscribe_all(callback)
    }

    pub fn subscribe_inbound<F>(
        &self,
        remote_endpoint_id: &str,
        controller_id: &str,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&ListenerEvent<Controller>) + Send + Sync + 'static,
    {
        self.inbound_listeners.subscribe(
            (remote_endpoint_id.to_string(), controller_id.to_string()),
            callback,
        )
    }

    pub fn subscribe_all_inbound<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ControllerKey, &ListenerEvent<Controller>) + Send + Sync + 'static,
    {
        self.inbound_listeners.subscribe_all(callback)
    }

    async fn send(&self, remote_endpoint_id: &str, message: SignalingMessage) -> SessionResult<()> {
        self.signaling.send(remote_endpoint_id, message).await?;
        Ok(())
    }

    fn own(&self, owner: Owner, subscription: Subscription) {
        let previous = self.lock_subscriptions().insert(owner, subscription);
        drop(previous);
    }

    fn release(&self, owner: &Owner) {
        let released = self.lock_subscriptions().remove(owner);
        drop(released);
    }

    fn lock_store(&self) -> MutexGuard<'_, ControllerStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, HashMap<Owner, Subscription>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(controller_id: &str) -> SessionError {
    SessionError::ControllerNotFound {
        controller_id: controller_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_capture::CaptureError;
    use crate::testing::{MemoryStream, MockCapture, MockPeerConnectionFactory, RecordingSignaling};
    use crate::transport::TransportConfig;
    use peerlink_types::SessionDescriptionInit;
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        controllers: ControllerManager,
        transmissions: Arc<TransmissionManager>,
        signaling: Arc<RecordingSignaling>,
        registry: Arc<MediaRegistry>,
    }

    fn fixture_with(capture: MockCapture) -> Fixture {
        let signaling = Arc::new(RecordingSignaling::new("alice"));
        let registry = MediaRegistry::new(Arc::new(capture));
        let transmissions = Arc::new(TransmissionManager::new(
            "alice",
            TransportConfig::default(),
            Arc::new(MockPeerConnectionFactory::new("alice")),
            signaling.clone(),
            Arc::clone(&registry),
        ));
        let controllers = ControllerManager::new(
            Arc::clone(&registry),
            Arc::clone(&transmissions),
            signaling.clone(),
        );
        Fixture {
            controllers,
            transmissions,
            signaling,
            registry,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockCapture::new())
    }

    fn modify_inbound_to(
        signaling: &RecordingSignaling,
        remote: &str,
    ) -> Vec<ModifyInboundController> {
        signaling
            .sent_to(remote)
            .into_iter()
            .filter_map(|message| match message {
                SignalingMessage::ModifyInboundController(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    fn modify_outbound_to(
        signaling: &RecordingSignaling,
        remote: &str,
    ) -> Vec<ModifyOutboundController> {
        signaling
            .sent_to(remote)
            .into_iter()
            .filter_map(|message| match message {
                SignalingMessage::ModifyOutboundController(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    async fn shared_camera(f: &Fixture, remote: &str) -> String {
        let id = f
            .controllers
            .add_local_camera_controller("Camera", CameraConstraints::default())
            .await
            .unwrap();
        f.controllers.share_local_controller(&id, remote).await.unwrap();
        f.controllers.process_pending().await;
        id
    }

    fn announcement(controller_id: &str) -> SignalingMessage {
        SignalingMessage::AddInboundController(AddInboundController {
            controller_id: controller_id.to_string(),
            label: "Remote camera".to_string(),
            state: ControllerState::Starting,
            kind: ControllerKind::Camera,
        })
    }

    fn modify(
        controller_id: &str,
        media_object_id: Option<&str>,
        state: ControllerState,
    ) -> SignalingMessage {
        SignalingMessage::ModifyInboundController(ModifyInboundController {
            controller_id: controller_id.to_string(),
            media_object_id: media_object_id.map(str::to_string),
            state,
        })
    }

    #[tokio::test]
    async fn test_camera_controller_becomes_ready() {
        let f = fixture();
        let id = f
            .controllers
            .add_local_camera_controller("Camera", CameraConstraints::default())
            .await
            .unwrap();
        assert_eq!(f.controllers.local_controller(&id).unwrap().state, ControllerState::Starting);

        f.controllers.process_pending().await;

        let controller = f.controllers.local_controller(&id).unwrap();
        assert_eq!(controller.state, ControllerState::Ready);
        assert_eq!(controller.media_object_id.as_deref(), Some(id.as_str()));
        assert!(f.registry.has_media_object(&id));
    }

    #[tokio::test]
    async fn test_permission_denied_fails_controller() {
        let f = fixture_with(MockCapture::with_probe_result(Err(CaptureError::NotAllowed)));

        let result = f
            .controllers
            .add_local_screen_controller("Screen")
            .await;
        assert!(matches!(result, Err(SessionError::Permissions(_))));

        let controllers = f.controllers.local_controllers();
        assert_eq!(controllers.len(), 1);
        assert_eq!(controllers[0].state, ControllerState::Failed);
        assert_eq!(controllers[0].kind, ControllerKind::Screen);
    }

    #[tokio::test]
    async fn test_share_announces_ready_exactly_once() {
        let f = fixture();
        let id = shared_camera(&f, "bob").await;

        let outbound = f.controllers.outbound_controller("bob", &id).unwrap();
        assert_eq!(outbound.state, ControllerState::Ready);
        let transmission_id = outbound.as_outbound().unwrap().transmission_id.clone().unwrap();
        assert_eq!(outbound.media_object_id.as_deref(), Some(transmission_id.as_str()));
        assert!(f.transmissions.outbound_transmission("bob", &transmission_id).is_some());

        let announced = f
            .signaling
            .sent_to("bob")
            .into_iter()
            .filter(|message| matches!(message, SignalingMessage::AddInboundController(_)))
            .count();
        assert_eq!(announced, 1);

        let modifications = modify_inbound_to(&f.signaling, "bob");
        assert_eq!(modifications.len(), 1);
        assert_eq!(modifications[0].state, ControllerState::Ready);
        assert_eq!(modifications[0].media_object_id, Some(transmission_id));
    }

    #[tokio::test]
    async fn test_share_is_idempotent() {
        let f = fixture();
        let id = shared_camera(&f, "bob").await;

        tokio_test::assert_ok!(f.controllers.share_local_controller(&id, "bob").await);
        f.controllers.process_pending().await;

        assert_eq!(f.controllers.outbound_controllers("bob").len(), 1);
        assert_eq!(modify_inbound_to(&f.signaling, "bob").len(), 1);
        assert_eq!(f.transmissions.outbound_transmissions("bob").len(), 1);
    }

    #[tokio::test]
    async fn test_share_unknown_controller() {
        let f = fixture();
        let result = f.controllers.share_local_controller("missing", "bob").await;
        assert!(matches!(result, Err(SessionError::ControllerNotFound { .. })));
        assert!(!f.transmissions.has_connection("bob"));
    }

    #[tokio::test]
    async fn test_stop_and_restart_fan_out() {
        let f = fixture();
        let id = shared_camera(&f, "bob").await;
        let first = f.controllers.outbound_controller("bob", &id).unwrap().media_object_id;

        f.controllers.stop_local_controller(&id).unwrap();
        f.controllers.process_pending().await;

        assert_eq!(f.controllers.local_controller(&id).unwrap().state, ControllerState::Stopped);
        let outbound = f.controllers.outbound_controller("bob", &id).unwrap();
        assert_eq!(outbound.state, ControllerState::Stopped);
        assert!(outbound.as_outbound().unwrap().transmission_id.is_none());
        assert!(f.transmissions.outbound_transmissions("bob").is_empty());
        let last = modify_inbound_to(&f.signaling, "bob").pop().unwrap();
        assert_eq!(last.state, ControllerState::Stopped);
        assert_eq!(last.media_object_id, None);

        f.controllers.restart_local_controller(&id).await.unwrap();
        f.controllers.process_pending().await;

        let outbound = f.controllers.outbound_controller("bob", &id).unwrap();
        assert_eq!(outbound.state, ControllerState::Ready);
        assert_ne!(outbound.media_object_id, first);
        let states: Vec<ControllerState> = modify_inbound_to(&f.signaling, "bob")
            .into_iter()
            .map(|payload| payload.state)
            .collect();
        assert_eq!(
            states,
            vec![
                ControllerState::Ready,
                ControllerState::Stopped,
                ControllerState::Starting,
                ControllerState::Ready
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_keeps_media_object() {
        let f = fixture();
        let id = shared_camera(&f, "bob").await;

        f.controllers.fail_local_controller(&id).unwrap();
        f.controllers.process_pending().await;

        assert_eq!(f.controllers.local_controller(&id).unwrap().state, ControllerState::Failed);
        assert_eq!(
            f.controllers.outbound_controller("bob", &id).unwrap().state,
            ControllerState::Failed
        );
        assert!(f.registry.has_media_object(&id));
    }

    #[tokio::test]
    async fn test_remove_local_disconnects_idle_peer_once() {
        let f = fixture();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disconnects);
        let _subscription = f.transmissions.subscribe_connections(move |remote, event| {
            if remote == "bob" && event.is_removed() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let id = shared_camera(&f, "bob").await;
        f.controllers.remove_local_controller(&id).await.unwrap();
        f.controllers.process_pending().await;

        assert!(f.controllers.local_controller(&id).is_none());
        assert!(f.controllers.outbound_controllers("bob").is_empty());
        assert!(!f.registry.has_media_object(&id));
        assert!(!f.transmissions.has_connection("bob"));
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(f
            .signaling
            .sent_to("bob")
            .iter()
            .any(|message| matches!(message, SignalingMessage::RemoveInboundController(_))));
    }

    #[tokio::test]
    async fn test_peer_stays_connected_while_any_direction_has_controllers() {
        let f = fixture();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disconnects);
        let _subscription = f.transmissions.subscribe_connections(move |remote, event| {
            if remote == "bob" && event.is_removed() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        f.controllers.handle_signal("bob", announcement("c9")).await.unwrap();
        let id = shared_camera(&f, "bob").await;
        assert!(f.transmissions.has_connection("bob"));

        f.controllers.unshare("bob", &id).await;
        f.controllers.process_pending().await;
        assert!(f.controllers.outbound_controllers("bob").is_empty());
        assert!(f.transmissions.has_connection("bob"));
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);

        f.controllers
            .handle_signal(
                "bob",
                SignalingMessage::RemoveInboundController(RemoveInboundController {
                    controller_id: "c9".to_string(),
                }),
            )
            .await
            .unwrap();
        f.controllers.process_pending().await;
        assert!(!f.transmissions.has_connection("bob"));
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_late_offer_does_not_reopen_idle_peer() {
        let f = fixture();
        let offer = SignalingMessage::SessionDescription(SessionDescriptionInit::offer(
            "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
        ));

        f.controllers.handle_signal("bob", announcement("c9")).await.unwrap();
        f.transmissions.connect("bob").unwrap();
        f.controllers
            .handle_signal(
                "bob",
                SignalingMessage::RemoveInboundController(RemoveInboundController {
                    controller_id: "c9".to_string(),
                }),
            )
            .await
            .unwrap();
        assert!(!f.transmissions.has_connection("bob"));

        f.transmissions.handle_signal("bob", offer.clone()).await.unwrap();
        assert!(!f.transmissions.has_connection("bob"));

        // sharing again re-enables negotiation with the peer
        f.controllers.handle_signal("bob", announcement("c10")).await.unwrap();
        f.transmissions.handle_signal("bob", offer).await.unwrap();
        assert!(f.transmissions.has_connection("bob"));
    }

    #[tokio::test]
    async fn test_unshare_leaves_other_peers_alone() {
        let f = fixture();
        let id = shared_camera(&f, "bob").await;
        f.controllers.share_local_controller(&id, "carol").await.unwrap();
        f.controllers.process_pending().await;

        f.controllers.unshare("bob", &id).await;
        f.controllers.process_pending().await;

        assert!(!f.transmissions.has_connection("bob"));
        assert!(f.transmissions.has_connection("carol"));
        assert_eq!(
            f.controllers.outbound_controller("carol", &id).unwrap().state,
            ControllerState::Ready
        );
        let local = f.controllers.local_controller(&id).unwrap();
        let shared: Vec<&String> = local.as_local().unwrap().shared_with.iter().collect();
        assert_eq!(shared, vec!["carol"]);
    }

    #[tokio::test]
    async fn test_inbound_follows_remote_media() {
        let f = fixture();
        f.controllers.handle_signal("bob", announcement("c9")).await.unwrap();
        f.controllers.handle_signal("bob", announcement("c9")).await.unwrap();
        assert_eq!(f.controllers.inbound_controllers("bob").len(), 1);

        f.controllers
            .handle_signal("bob", modify("c9", Some("t1"), ControllerState::Ready))
            .await
            .unwrap();
        let inbound = f.controllers.inbound_controller("bob", "c9").unwrap();
        assert_eq!(inbound.state, ControllerState::Starting);
        assert_eq!(inbound.remote().unwrap().remote_state(), Some(ControllerState::Ready));
        assert!(modify_outbound_to(&f.signaling, "bob").is_empty());

        f.registry
            .add_remote_media_stream("t1", MemoryStream::camera("t1", 640, 480));
        f.controllers.process_pending().await;
        assert_eq!(
            f.controllers.inbound_controller("bob", "c9").unwrap().state,
            ControllerState::Ready
        );

        f.registry.remove_media_object("t1");
        f.controllers.process_pending().await;
        assert_eq!(
            f.controllers.inbound_controller("bob", "c9").unwrap().state,
            ControllerState::Stopped
        );

        let reported: Vec<ControllerState> = modify_outbound_to(&f.signaling, "bob")
            .into_iter()
            .map(|payload| payload.state)
            .collect();
        assert_eq!(reported, vec![ControllerState::Ready, ControllerState::Stopped]);
    }

    #[tokio::test]
    async fn test_inbound_closed_maps_to_stopped() {
        let f = fixture();
        f.controllers.handle_signal("bob", announcement("c9")).await.unwrap();
        f.controllers
            .handle_signal("bob", modify("c9", None, ControllerState::Closed))
            .await
            .unwrap();

        let inbound = f.controllers.inbound_controller("bob", "c9").unwrap();
        assert_eq!(inbound.state, ControllerState::Stopped);

        f.controllers
            .handle_signal(
                "bob",
                SignalingMessage::RemoveInboundController(RemoveInboundController {
                    controller_id: "c9".to_string(),
                }),
            )
            .await
            .unwrap();
        assert!(f.controllers.inbound_controller("bob", "c9").is_none());
    }

    #[tokio::test]
    async fn test_outbound_mirrors_remote_inbound_state() {
        let f = fixture();
        let id = shared_camera(&f, "bob").await;

        let message = SignalingMessage::ModifyOutboundController(ModifyOutboundController {
            controller_id: id.clone(),
            state: ControllerState::Ready,
        });
        f.controllers.handle_signal("bob", message).await.unwrap();

        let outbound = f.controllers.outbound_controller("bob", &id).unwrap();
        assert_eq!(outbound.remote().unwrap().remote_state(), Some(ControllerState::Ready));
    }

    #[tokio::test]
    async fn test_unknown_controllers_are_ignored() {
        let f = fixture();
        let messages = vec![
            modify("ghost", Some("t1"), ControllerState::Ready),
            SignalingMessage::RemoveInboundController(RemoveInboundController {
                controller_id: "ghost".to_string(),
            }),
            SignalingMessage::ModifyOutboundController(ModifyOutboundController {
                controller_id: "ghost".to_string(),
                state: ControllerState::Failed,
            }),
        ];
        for message in messages {
            f.controllers.handle_signal("bob", message).await.unwrap();
        }

        assert!(f.signaling.sent().is_empty());
        assert!(f.controllers.inbound_controllers("bob").is_empty());
    }
}
