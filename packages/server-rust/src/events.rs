//! Verb events and their listener registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rested_core::{ResourceMetadata, Verb};
use serde_json::Value;
use tracing::debug;

use crate::dispatch::Request;
use crate::service::ServiceKey;

// ---------------------------------------------------------------------------
// EventName
// ---------------------------------------------------------------------------

/// A verb fired against one loaded service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName {
    pub verb: Verb,
    pub service: ServiceKey,
}

impl EventName {
    #[must_use]
    pub fn new(verb: Verb, service: ServiceKey) -> Self {
        Self { verb, service }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.verb, self.service)
    }
}

// ---------------------------------------------------------------------------
// RequestEvent
// ---------------------------------------------------------------------------

/// Payload handed to every listener of a dispatched verb.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    request: Request,
    resource: Arc<ResourceMetadata>,
    parent: Option<Arc<ResourceMetadata>>,
    payload: Option<Value>,
    data: Option<Value>,
}

impl RequestEvent {
    #[must_use]
    pub fn new(request: Request, resource: Arc<ResourceMetadata>) -> Self {
        Self {
            request,
            resource,
            parent: None,
            payload: None,
            data: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: Arc<ResourceMetadata>) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[must_use]
    pub fn verb(&self) -> Verb {
        self.request.verb()
    }

    /// Resource whose service handles the request.
    #[must_use]
    pub fn resource(&self) -> &Arc<ResourceMetadata> {
        &self.resource
    }

    /// Primary resource when the request addressed a sub-resource.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<ResourceMetadata>> {
        self.parent.as_ref()
    }

    /// Decoded request body.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Response data set by listeners so far.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn set_data(&mut self, data: Value) {
        self.data = Some(data);
    }

    pub fn take_data(&mut self) -> Option<Value> {
        self.data.take()
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

type Callback = dyn Fn(&mut RequestEvent) -> anyhow::Result<()> + Send + Sync;

/// Callable registered against an event.
#[derive(Clone)]
pub struct Listener {
    name: String,
    callback: Arc<Callback>,
}

impl Listener {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut RequestEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    /// Binds a method of `service` as a listener.
    pub fn bind<S>(
        service: Arc<S>,
        name: impl Into<String>,
        method: fn(&S, &mut RequestEvent) -> anyhow::Result<()>,
    ) -> Self
    where
        S: Send + Sync + 'static,
    {
        Self::new(name, move |event| method(&service, event))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// Returns whatever the listener body returns.
    pub fn invoke(&self, event: &mut RequestEvent) -> anyhow::Result<()> {
        (self.callback)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("name", &self.name).finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventManager
// ---------------------------------------------------------------------------

/// Registry of listeners keyed by event.
#[derive(Default)]
pub struct EventManager {
    listeners: RwLock<HashMap<EventName, Vec<Listener>>>,
}

impl EventManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` after any already registered for `event`.
    pub fn add_listener(&self, event: EventName, listener: Listener) {
        debug!(event = %event, listener = listener.name(), "listener registered");
        self.listeners.write().entry(event).or_default().push(listener);
    }

    /// Appends `listeners` in iteration order under a single lock.
    pub fn add_listeners(&self, event: EventName, listeners: impl IntoIterator<Item = Listener>) {
        let mut guard = self.listeners.write();
        let slot = guard.entry(event.clone()).or_default();
        for listener in listeners {
            debug!(event = %event, listener = listener.name(), "listener registered");
            slot.push(listener);
        }
    }

    /// Invokes every listener of `event` in registration order and returns
    /// how many ran.
    ///
    /// Listeners run on a snapshot taken before the first call, so they may
    /// register further listeners without deadlocking.
    ///
    /// # Errors
    ///
    /// Returns the first listener error unchanged; later listeners are skipped.
    pub fn dispatch(&self, event: &EventName, payload: &mut RequestEvent) -> anyhow::Result<usize> {
        let snapshot = self
            .listeners
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();

        for listener in &snapshot {
            debug!(event = %event, listener = listener.name(), "invoking listener");
            listener.invoke(payload)?;
        }
        Ok(snapshot.len())
    }

    #[must_use]
    pub fn listener_count(&self, event: &EventName) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn has_listeners(&self, event: &EventName) -> bool {
        self.listener_count(event) > 0
    }

    /// Drops every listener registered for the service instance `service`,
    /// across all verbs, and returns how many were removed.
    pub fn remove_service(&self, service: &ServiceKey) -> usize {
        let mut guard = self.listeners.write();
        let mut removed = 0;
        guard.retain(|event, listeners| {
            if event.service == *service {
                removed += listeners.len();
                false
            } else {
                true
            }
        });
        removed
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("events", &self.listeners.read().len())
            .finish()
    }
}
