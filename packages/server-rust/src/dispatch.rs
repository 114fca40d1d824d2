//! Request routing from `(resource path, verb)` to service listeners.

use std::sync::Arc;
use std::time::Instant;

use rested_core::{MetadataProvider, ResourceMetadata, Verb};
use serde_json::Value;
use tracing::{debug, info, info_span};

use crate::error::RestError;
use crate::events::{EventName, RequestEvent};
use crate::service::{ContextId, ServiceKey, ServiceManager};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One inbound call against a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    resource: String,
    verb: Verb,
    accept: String,
    content_type: Option<String>,
    payload: Option<String>,
}

impl Request {
    #[must_use]
    pub fn new(resource: impl Into<String>, verb: Verb) -> Self {
        Self {
            resource: resource.into(),
            verb,
            accept: String::new(),
            content_type: None,
            payload: None,
        }
    }

    /// Converts a method name from the transport into a [`Verb`].
    ///
    /// # Errors
    ///
    /// Returns `RestError::MethodNotAllowed` for names outside the verb set.
    pub fn parse_verb(method: &str) -> Result<Verb, RestError> {
        method
            .parse()
            .map_err(|_| RestError::MethodNotAllowed(method.to_string()))
    }

    #[must_use]
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn set_verb(&mut self, verb: Verb) {
        self.verb = verb;
    }

    pub fn set_resource(&mut self, resource: impl Into<String>) {
        self.resource = resource.into();
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Raw `Accept` header; empty means anything is acceptable.
    #[must_use]
    pub fn accept(&self) -> &str {
        &self.accept
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

/// Splits `primary/sub` into its segments. Surrounding slashes are ignored.
fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.trim_matches('/').split_once('/') {
        Some((primary, sub)) => (primary, Some(sub)),
        None => (path.trim_matches('/'), None),
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Where a request lands after path resolution.
struct Route {
    target: Arc<ResourceMetadata>,
    service_id: String,
    parent: Option<ParentRoute>,
}

/// Primary resource of a sub-resource request. `service_id` is `None` when
/// the primary resolves to no service, in which case nothing is notified.
struct ParentRoute {
    resource: Arc<ResourceMetadata>,
    service_id: Option<String>,
}

/// Resolves requests to service instances and fires their verb events.
///
/// Each dispatcher owns a [`ContextId`]; services it loads are scoped to it
/// and survive until [`release`](Self::release).
pub struct Dispatcher {
    context: ContextId,
    manager: Arc<ServiceManager>,
    entities: Arc<dyn MetadataProvider>,
    default_service: Option<String>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(manager: Arc<ServiceManager>, entities: Arc<dyn MetadataProvider>) -> Self {
        Self {
            context: ContextId::next(),
            manager,
            entities,
            default_service: None,
        }
    }

    /// Service used for resources that do not declare one.
    #[must_use]
    pub fn with_default_service(mut self, service_id: Option<String>) -> Self {
        self.default_service = service_id;
        self
    }

    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<ServiceManager> {
        &self.manager
    }

    /// Dispatches `request` without a decoded payload.
    ///
    /// # Errors
    ///
    /// See [`dispatch_with_payload`](Self::dispatch_with_payload).
    pub fn dispatch(&self, request: &Request) -> Result<Option<Value>, RestError> {
        self.dispatch_with_payload(request, None)
    }

    /// Resolves the request path, loads the owning service and fires the
    /// request verb at it. Returns the response data left by the listeners.
    ///
    /// For `primary/sub` paths the primary resource's service is notified
    /// first, then the sub-resource's service handles the request. Both see
    /// the same [`RequestEvent`], so data set by the sub-resource's
    /// listeners wins.
    ///
    /// # Errors
    ///
    /// Returns `RestError::NotFound` for unknown resources or sub-resources,
    /// `RestError::Service` when the service cannot be loaded, and
    /// `RestError::Listener` with the first listener failure.
    pub fn dispatch_with_payload(
        &self,
        request: &Request,
        payload: Option<Value>,
    ) -> Result<Option<Value>, RestError> {
        let span = info_span!(
            "dispatch",
            resource = request.resource(),
            verb = %request.verb(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let _entered = span.enter();

        let start = Instant::now();
        let result = self.route(request, payload);

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) if err.is_not_found() => "not_found",
            Err(_) => "error",
        };
        span.record("duration_ms", duration_ms);
        span.record("outcome", outcome);
        info!(
            resource = request.resource(),
            verb = %request.verb(),
            duration_ms,
            outcome,
            "dispatch complete"
        );

        result
    }

    /// Drops every service loaded by this dispatcher and their listeners.
    pub fn release(&self) -> usize {
        self.manager.release_context(self.context)
    }

    fn route(&self, request: &Request, payload: Option<Value>) -> Result<Option<Value>, RestError> {
        let Route {
            target,
            service_id,
            parent,
        } = self.resolve(request.resource())?;

        // Notification order: parent first, then the handling service.
        let mut keys = Vec::with_capacity(2);
        if let Some(ParentRoute {
            resource,
            service_id: Some(parent_service),
        }) = &parent
        {
            keys.push(ServiceKey::new(
                parent_service.as_str(),
                resource.class_name(),
                self.context,
            ));
        }
        let handler = ServiceKey::new(service_id, target.class_name(), self.context);
        if keys.first() != Some(&handler) {
            keys.push(handler);
        }

        // Every service is loaded before any listener fires.
        for key in &keys {
            self.manager
                .get_service(&key.service_class, key.context, &key.resource_class)?;
        }

        let mut event = RequestEvent::new(request.clone(), target).with_payload(payload);
        if let Some(parent) = parent {
            event = event.with_parent(parent.resource);
        }

        for key in keys {
            let name = EventName::new(request.verb(), key);
            let invoked = self
                .manager
                .events()
                .dispatch(&name, &mut event)
                .map_err(RestError::Listener)?;
            if invoked == 0 {
                debug!(event = %name, "no listeners for event");
            }
        }
        Ok(event.take_data())
    }

    fn resolve(&self, path: &str) -> Result<Route, RestError> {
        let resources = self.manager.resources();
        let (primary, sub) = split_path(path);
        let primary = resources.metadata_by_name(primary)?;

        let Some(sub_name) = sub else {
            let service_id = self.service_for(&primary)?;
            return Ok(Route {
                target: primary,
                parent: None,
                service_id,
            });
        };

        let sub = primary.sub_resource(sub_name)?;
        let association = self
            .entities
            .metadata_for(primary.class_name())?
            .require_association(&sub.field_name)?
            .clone();
        let target = resources.metadata_for(&association.target_type)?;
        debug!(
            parent = primary.name(),
            sub_resource = sub_name,
            target = target.class_name(),
            service = %sub.service_id,
            "resolved sub-resource"
        );

        let parent_service = primary
            .service_id()
            .or(self.default_service.as_deref())
            .map(str::to_string);
        Ok(Route {
            service_id: sub.service_id.clone(),
            target,
            parent: Some(ParentRoute {
                resource: primary,
                service_id: parent_service,
            }),
        })
    }

    fn service_for(&self, resource: &ResourceMetadata) -> Result<String, RestError> {
        resource
            .service_id()
            .or(self.default_service.as_deref())
            .map(str::to_string)
            .ok_or_else(|| RestError::NoService {
                resource: resource.name().to_string(),
            })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("context", &self.context)
            .field("default_service", &self.default_service)
            .finish_non_exhaustive()
    }
}
