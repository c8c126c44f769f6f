//! Media object registry
//!
//! Keyed store of local captures and remote inbound streams. Entries are
//! handed out as copies carrying a monotonically increasing `version`;
//! holders keep only the id and re-fetch when notified.
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


use peerlink_types::MediaKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::listeners::{IdListeners, ListenerEvent, Subscription};
use crate::media_capture::{CameraConstraints, MediaCapture, MediaPermissions};
use crate::media_stream::{has_kind, stream_dimensions, MediaStream, StreamEvent, TrackKind};

/// Origin of a stream object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSubKind {
    LocalCamera,
    LocalScreen,
    Remote,
}

/// Snapshot of a registry entry
#[derive(Debug, Clone)]
pub struct MediaObject {
    pub obj_id: String,
    pub kind: MediaKind,
    pub sub_kind: StreamSubKind,
    pub stream: Option<Arc<dyn MediaStream>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_video: bool,
    pub has_audio: bool,
    pub render_target_id: Option<String>,
    /// Bumped on every change
    pub version: u64,
}

/// Presentation surface a stream can be bound to
pub trait RenderTarget: Send + Sync {
    /// Show `stream`, or nothing when `None`
    fn attach(&self, stream: Option<Arc<dyn MediaStream>>);
}

pub struct MediaRegistry {
    self_ref: Weak<MediaRegistry>,
    capture: Arc<dyn MediaCapture>,
    objects: Mutex<HashMap<String, MediaObject>>,
    render_targets: Mutex<HashMap<String, Arc<dyn RenderTarget>>>,
    listeners: IdListeners<String, MediaObject>,
    permissions: OnceCell<MediaPermissions>,
    permission_listeners: IdListeners<(), MediaPermissions>,
    next_version: AtomicU64,
}

fn same_stream(a: &Arc<dyn MediaStream>, b: &Arc<dyn MediaStream>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl MediaRegistry {
    pub fn new(capture: Arc<dyn MediaCapture>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            capture,
            objects: Mutex::new(HashMap::new()),
            render_targets: Mutex::new(HashMap::new()),
            listeners: IdListeners::new(),
            permissions: OnceCell::new(),
            permission_listeners: IdListeners::new(),
            next_version: AtomicU64::new(1),
        })
    }

    pub fn add_local_camera_stream(
        &self,
        obj_id: &str,
        stream: Arc<dyn MediaStream>,
    ) -> MediaObject {
        debug!(obj_id = %obj_id, stream_id = %stream.id(), "Adding local camera stream");
        self.add_stream_object(obj_id, StreamSubKind::LocalCamera, stream)
    }

    pub fn add_local_screen_stream(
        &self,
        obj_id: &str,
        stream: Arc<dyn MediaStream>,
    ) -> MediaObject {
        debug!(obj_id = %obj_id, stream_id = %stream.id(), "Adding local screen stream");
        self.add_stream_object(obj_id, StreamSubKind::LocalScreen, stream)
    }

    pub fn add_remote_media_stream(
        &self,
        obj_id: &str,
        stream: Arc<dyn MediaStream>,
    ) -> MediaObject {
        debug!(obj_id = %obj_id, stream_id = %stream.id(), "Adding remote media stream");
        self.add_stream_object(obj_id, StreamSubKind::Remote, stream)
    }

    /// Insert a stream object, or refresh the existing one with the same id
    fn add_stream_object(
        &self,
        obj_id: &str,
        sub_kind: StreamSubKind,
        stream: Arc<dyn MediaStream>,
    ) -> MediaObject {
        let tracks = stream.tracks();
        let (width, height) = stream_dimensions(&tracks);
        let has_video = has_kind(&tracks, TrackKind::Video);
        let has_audio = has_kind(&tracks, TrackKind::Audio);
        let version = self.bump_version();

        let (event, replaced) = {
            let mut objects = self.lock_objects();
            match objects.get_mut(obj_id) {
                Some(existing) => {
                    let replaced = existing
                        .stream
                        .replace(Arc::clone(&stream))
                        .filter(|old| !same_stream(old, &stream));
                    if width.is_some() {
                        existing.width = width;
                    }
                    if height.is_some() {
                        existing.height = height;
                    }
                    existing.sub_kind = sub_kind;
                    existing.has_video = has_video;
                    existing.has_audio = has_audio;
                    existing.version = version;
                    (ListenerEvent::Modified(existing.clone()), replaced)
                }
                None => {
                    let object = MediaObject {
                        obj_id: obj_id.to_string(),
                        kind: MediaKind::Stream,
                        sub_kind,
                        stream: Some(Arc::clone(&stream)),
                        width,
                        height,
                        has_video,
                        has_audio,
                        render_target_id: None,
                        version,
                    };
                    objects.insert(obj_id.to_string(), object.clone());
                    (ListenerEvent::Added(object), None)
                }
            }
        };

        if let Some(old) = replaced {
            old.set_event_handler(None);
        }
        self.install_stream_handler(obj_id, &stream);

        let snapshot = event.value().clone();
        self.listeners.notify(&obj_id.to_string(), event);
        snapshot
    }

    fn install_stream_handler(&self, obj_id: &str, stream: &Arc<dyn MediaStream>) {
        let registry = self.self_ref.clone();
        let obj_id = obj_id.to_string();
        let stream_id = stream.id().to_string();
        stream.set_event_handler(Some(Arc::new(move |event: &StreamEvent| {
            if let Some(registry) = registry.upgrade() {
                registry.handle_stream_event(&obj_id, &stream_id, event);
            }
        })));
    }

    /// Keep dimensions current and evict the entry once no live track remains
    fn handle_stream_event(&self, obj_id: &str, stream_id: &str, event: &StreamEvent) {
        debug!(obj_id = %obj_id, event = ?event, "Stream event");

        let outcome = {
            let mut objects = self.lock_objects();
            let Some(object) = objects.get_mut(obj_id) else {
                return;
            };
            let Some(stream) = object.stream.clone() else {
                return;
            };
            if stream.id() != stream_id {
                return;
            }

            let live: Vec<_> = stream
                .tracks()
                .into_iter()
                .filter(|track| !track.is_ended())
                .collect();

            if live.is_empty() {
                objects
                    .remove(obj_id)
                    .map(|object| (ListenerEvent::Removed(object), Some(stream)))
            } else {
                if let (Some(width), Some(height)) = stream_dimensions(&live) {
                    object.width = Some(width);
                    object.height = Some(height);
                }
                object.has_video = has_kind(&live, TrackKind::Video);
                object.has_audio = has_kind(&live, TrackKind::Audio);
                object.version = self.bump_version();
                Some((ListenerEvent::Modified(object.clone()), None))
            }
        };

        if let Some((event, evicted)) = outcome {
            if let Some(stream) = evicted {
                info!(obj_id = %obj_id, "All tracks gone, removing media object");
                stream.set_event_handler(None);
            }
            self.listeners.notify(&obj_id.to_string(), event);
        }
    }

    pub fn update_stream_dimensions(&self, obj_id: &str, width: u32, height: u32) {
        let snapshot = {
            let mut objects = self.lock_objects();
            let Some(object) = objects.get_mut(obj_id) else {
                return;
            };
            if object.kind != MediaKind::Stream {
                return;
            }
            object.width = Some(width);
            object.height = Some(height);
            object.version = self.bump_version();
            object.clone()
        };
        self.listeners
            .notify(&obj_id.to_string(), ListenerEvent::Modified(snapshot));
    }

    /// Remove an entry and release its tracks; removing twice is a no-op
    pub fn remove_media_object(&self, obj_id: &str) -> Option<MediaObject> {
        let removed = self.lock_objects().remove(obj_id)?;
        debug!(obj_id = %obj_id, "Removing media object");

        if let Some(stream) = &removed.stream {
            stream.set_event_handler(None);
            for track in stream.tracks() {
                track.stop();
            }
        }
        if let Some(target_id) = &removed.render_target_id {
            if let Some(target) = self.render_target(target_id) {
                target.attach(None);
            }
        }

        self.listeners
            .notify(&obj_id.to_string(), ListenerEvent::Removed(removed.clone()));
        Some(removed)
    }

    /// Stop every track of an entry without removing it
    pub fn stop_stream(&self, obj_id: &str) {
        let stream = self
            .lock_objects()
            .get(obj_id)
            .and_then(|object| object.stream.clone());

        if let Some(stream) = stream {
            debug!(obj_id = %obj_id, "Stopping stream");
            for track in stream.tracks() {
                track.stop();
            }
        }
    }

    /// Cached permission outcome, if a probe has run
    pub fn permissions(&self) -> Option<MediaPermissions> {
        self.permissions.get().copied()
    }

    /// Observe the permission outcome. An outcome that is already known is
    /// replayed to the new subscriber right away.
    pub fn subscribe_permissions<F>(&self, callback: F) -> Subscription
    where
        F: Fn(MediaPermissions) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let listener = Arc::clone(&callback);
        let subscription = self
            .permission_listeners
            .subscribe((), move |event| listener(*event.value()));
        if let Some(permissions) = self.permissions() {
            callback(permissions);
        }
        subscription
    }

    /// Probe once per registry; later calls reuse the outcome
    async fn assert_permissions(&self) -> SessionResult<()> {
        let permissions = *self
            .permissions
            .get_or_init(|| async {
                let result = self.capture.probe_permissions().await;
                let permissions = MediaPermissions::from_probe(&result);
                info!(permissions = ?permissions, "Media permissions resolved");
                self.permission_listeners
                    .notify(&(), ListenerEvent::Added(permissions));
                permissions
            })
            .await;

        match permissions {
            MediaPermissions::Success => Ok(()),
            other => Err(SessionError::Permissions(other)),
        }
    }

    /// Acquire a camera stream and register it under `obj_id`
    pub async fn get_camera_stream(
        &self,
        obj_id: &str,
        constraints: &CameraConstraints,
    ) -> SessionResult<MediaObject> {
        debug!(obj_id = %obj_id, constraints = ?constraints, "Requesting camera stream");
        self.assert_permissions().await?;
        self.remove_media_object(obj_id);

        let stream = self.capture.camera_stream(constraints).await.map_err(|e| {
            warn!(obj_id = %obj_id, error = %e, "Camera stream unavailable");
            SessionError::StreamUnavailable
        })?;

        Ok(self.add_local_camera_stream(obj_id, stream))
    }

    /// Acquire a screen capture and register it under `obj_id`
    pub async fn get_screen_stream(&self, obj_id: &str) -> SessionResult<MediaObject> {
        debug!(obj_id = %obj_id, "Requesting screen stream");
        self.assert_permissions().await?;
        self.remove_media_object(obj_id);

        let stream = self.capture.screen_stream().await.map_err(|e| {
            warn!(obj_id = %obj_id, error = %e, "Screen stream unavailable");
            SessionError::StreamUnavailable
        })?;

        Ok(self.add_local_screen_stream(obj_id, stream))
    }

    pub fn register_render_target(
        &self,
        target_id: &str,
        target: Arc<dyn RenderTarget>,
        bind_to: Option<&str>,
    ) -> SessionResult<()> {
        debug!(target_id = %target_id, bind_to = ?bind_to, "Registering render target");
        self.lock_targets().insert(target_id.to_string(), target);
        match bind_to {
            Some(obj_id) => self.bind_to_render_target(obj_id, target_id),
            None => Ok(()),
        }
    }

    pub fn deregister_render_target(&self, target_id: &str) -> Option<Arc<dyn RenderTarget>> {
        debug!(target_id = %target_id, "Deregistering render target");
        let target = self.lock_targets().remove(target_id)?;

        let unbound: Vec<MediaObject> = {
            let mut objects = self.lock_objects();
            objects
                .values_mut()
                .filter(|object| object.render_target_id.as_deref() == Some(target_id))
                .map(|object| {
                    object.render_target_id = None;
                    object.version = self.bump_version();
                    object.clone()
                })
                .collect()
        };
        for object in unbound {
            self.listeners
                .notify(&object.obj_id.clone(), ListenerEvent::Modified(object));
        }

        Some(target)
    }

    /// Show an entry's stream on a registered render target
    pub fn bind_to_render_target(&self, obj_id: &str, target_id: &str) -> SessionResult<()> {
        let target = self
            .render_target(target_id)
            .ok_or_else(|| SessionError::RenderTargetNotFound {
                target_id: target_id.to_string(),
            })?;

        let snapshot = {
            let mut objects = self.lock_objects();
            let object = objects
                .get_mut(obj_id)
                .ok_or_else(|| SessionError::MediaObjectNotFound {
                    obj_id: obj_id.to_string(),
                })?;
            if object.kind != MediaKind::Stream {
                return Ok(());
            }
            object.render_target_id = Some(target_id.to_string());
            object.version = self.bump_version();
            object.clone()
        };

        target.attach(snapshot.stream.clone());
        self.listeners
            .notify(&obj_id.to_string(), ListenerEvent::Modified(snapshot));
        Ok(())
    }

    pub fn media_object(&self, obj_id: &str) -> Option<MediaObject> {
        self.lock_objects().get(obj_id).cloned()
    }

    pub fn has_media_object(&self, obj_id: &str) -> bool {
        self.lock_objects().contains_key(obj_id)
    }

    pub fn media_object_ids(&self) -> Vec<String> {
        self.lock_objects().keys().cloned().collect()
    }

    /// Listen for add/modify/remove of one entry
    pub fn subscribe<F>(&self, obj_id: &str, callback: F) -> Subscription
    where
        F: Fn(&ListenerEvent<MediaObject>) + Send + Sync + 'static,
    {
        self.listeners.subscribe(obj_id.to_string(), callback)
    }

    pub fn subscribe_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&String, &ListenerEvent<MediaObject>) + Send + Sync + 'static,
    {
        self.listeners.subscribe_all(callback)
    }

    /// Remove every entry
    pub fn destroy(&self) {
        for obj_id in self.media_object_ids() {
            self.remove_media_object(&obj_id);
        }
    }

    fn render_target(&self, target_id: &str) -> Option<Arc<dyn RenderTarget>> {
        self.lock_targets().get(target_id).cloned()
    }

    fn bump_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    fn lock_objects(&self) -> MutexGuard<'_, HashMap<String, MediaObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_targets(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn RenderTarget>>> {
        self.render_targets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
