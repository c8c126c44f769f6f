//! Id-scoped listener registries
//!
//! Every manager publishes add/modify/remove notifications for the entities
//! it owns through an [`IdListeners`] registry. Subscribing returns a
//! [`Subscription`] that removes the listener when dropped, so a listener can
//! never outlive the scope that registered it.
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


use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Notification about one entity
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent<V> {
    Added(V),
    Modified(V),
    Removed(V),
}

impl<V> ListenerEvent<V> {
    /// Snapshot carried by the event
    pub fn value(&self) -> &V {
        match self {
            ListenerEvent::Added(v) | ListenerEvent::Modified(v) | ListenerEvent::Removed(v) => v,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, ListenerEvent::Removed(_))
    }
}

type Callback<K, V> = Arc<dyn Fn(&K, &ListenerEvent<V>) + Send + Sync>;

struct Registry<K, V> {
    next_id: u64,
    scoped: HashMap<K, Vec<(u64, Callback<K, V>)>>,
    global: Vec<(u64, Callback<K, V>)>,
}

/// Listener registry keyed by entity id
pub struct IdListeners<K, V> {
    inner: Arc<Mutex<Registry<K, V>>>,
}

impl<K, V> IdListeners<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                scoped: HashMap::new(),
                global: Vec::new(),
            })),
        }
    }

    /// Listen for events about a single entity
    pub fn subscribe<F>(&self, key: K, callback: F) -> Subscription
    where
        F: Fn(&ListenerEvent<V>) + Send + Sync + 'static,
    {
        let adapted: Callback<K, V> =
            Arc::new(move |_: &K, event: &ListenerEvent<V>| callback(event));

        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.scoped.entry(key.clone()).or_default().push((id, adapted));
        drop(registry);

        let weak: Weak<Mutex<Registry<K, V>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut registry = inner.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(listeners) = registry.scoped.get_mut(&key) {
                    listeners.retain(|(listener_id, _)| *listener_id != id);
                    if listeners.is_empty() {
                        registry.scoped.remove(&key);
                    }
                }
            }
        })
    }

    /// Listen for events about every entity
    pub fn subscribe_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&K, &ListenerEvent<V>) + Send + Sync + 'static,
    {
        let callback: Callback<K, V> = Arc::new(callback);

        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.global.push((id, callback));
        drop(registry);

        let weak: Weak<Mutex<Registry<K, V>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .global
                    .retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }

    /// Deliver an event. Callbacks run after the registry lock is released,
    /// so a callback may subscribe or unsubscribe freely.
    pub fn notify(&self, key: &K, event: ListenerEvent<V>) {
        let callbacks: Vec<Callback<K, V>> = {
            let registry = self.lock();
            registry
                .scoped
                .get(key)
                .into_iter()
                .flatten()
                .chain(registry.global.iter())
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };

        for callback in callbacks {
            callback(key, &event);
        }
    }

    /// Number of listeners scoped to `key`
    pub fn listener_count(&self, key: &K) -> usize {
        self.lock().scoped.get(key).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for IdListeners<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Handle that removes a listener when dropped
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Remove the listener now
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
