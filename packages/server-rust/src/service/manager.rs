//! Loading, caching and release of service instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rested_core::{DataMapperRef, ResourceMetadataStore, ServiceMetadataStore};
use tracing::debug;

use super::{ContextId, Service, ServiceContext, ServiceFactories, ServiceKey};
use crate::error::ServiceError;
use crate::events::{EventManager, EventName, Listener};

/// Creates, caches and wires service instances.
///
/// The cache holds at most one instance per [`ServiceKey`]. Creation and
/// listener registration happen while the key's map entry is locked, so
/// concurrent first requests for the same key register listeners once.
/// Service constructors must not call back into the manager.
pub struct ServiceManager {
    factories: ServiceFactories,
    services: Arc<ServiceMetadataStore>,
    resources: Arc<ResourceMetadataStore>,
    data_mappers: HashMap<String, DataMapperRef>,
    events: Arc<EventManager>,
    loaded: DashMap<ServiceKey, Arc<dyn Service>>,
}

impl ServiceManager {
    #[must_use]
    pub fn new(
        factories: ServiceFactories,
        services: Arc<ServiceMetadataStore>,
        resources: Arc<ResourceMetadataStore>,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            factories,
            services,
            resources,
            data_mappers: HashMap::new(),
            events,
            loaded: DashMap::new(),
        }
    }

    /// Makes `mapper` available to services whose metadata names `id`.
    #[must_use]
    pub fn with_data_mapper(mut self, id: impl Into<String>, mapper: DataMapperRef) -> Self {
        self.data_mappers.insert(id.into(), mapper);
        self
    }

    /// Returns the instance of `service_class` bound to `resource_class`
    /// within `context`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Fails when the service or resource metadata is missing, the service
    /// class has no constructor, its data mapper is not registered, or a
    /// declared listener method cannot be bound. Nothing is cached or
    /// registered on failure.
    pub fn get_service(
        &self,
        service_class: &str,
        context: ContextId,
        resource_class: &str,
    ) -> Result<Arc<dyn Service>, ServiceError> {
        let key = ServiceKey::new(service_class, resource_class, context);
        match self.loaded.entry(key) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let service = self.load(entry.key())?;
                entry.insert(Arc::clone(&service));
                Ok(service)
            }
        }
    }

    /// Whether an instance is already loaded. Never loads one.
    #[must_use]
    pub fn has_service(
        &self,
        service_class: &str,
        context: ContextId,
        resource_class: &str,
    ) -> bool {
        self.loaded
            .contains_key(&ServiceKey::new(service_class, resource_class, context))
    }

    /// Drops every instance loaded for `context` together with its listeners.
    /// Returns the number of instances released.
    ///
    /// Each instance and its listeners go while the instance's cache entry
    /// is locked, so a concurrent first load of the same key lands entirely
    /// before or entirely after the removal.
    pub fn release_context(&self, context: ContextId) -> usize {
        let keys: Vec<ServiceKey> = self
            .loaded
            .iter()
            .filter(|entry| entry.key().context == context)
            .map(|entry| entry.key().clone())
            .collect();

        let mut released = 0;
        let mut listeners = 0;
        for key in keys {
            if let Entry::Occupied(entry) = self.loaded.entry(key) {
                listeners += self.events.remove_service(entry.key());
                entry.remove();
                released += 1;
            }
        }
        debug!(%context, released, listeners, "released service context");
        released
    }

    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    #[must_use]
    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    #[must_use]
    pub fn resources(&self) -> &Arc<ResourceMetadataStore> {
        &self.resources
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ServiceMetadataStore> {
        &self.services
    }

    fn load(&self, key: &ServiceKey) -> Result<Arc<dyn Service>, ServiceError> {
        let resource = self.resources.metadata_for(&key.resource_class)?;
        let metadata = self.services.metadata_for(&key.service_class)?;

        let data_mapper = match metadata.data_mapper() {
            Some(id) => Some(Arc::clone(self.data_mappers.get(id).ok_or_else(|| {
                ServiceError::DataMapperNotFound {
                    service: key.service_class.clone(),
                    id: id.to_string(),
                }
            })?)),
            None => None,
        };

        let ctx = ServiceContext {
            context: key.context,
            resource,
            service: Arc::clone(&metadata),
            data_mapper,
        };
        let service = self.factories.create(&key.service_class, ctx)?;

        // Resolve every name before registering any, so a bad name leaves
        // the registry untouched.
        let mut bound: Vec<(EventName, Vec<Listener>)> = Vec::new();
        for (verb, methods) in metadata.all_listeners() {
            let listeners = methods
                .iter()
                .map(|method| {
                    Arc::clone(&service).bind_listener(method).ok_or_else(|| {
                        ServiceError::ListenerNotFound {
                            service: key.service_class.clone(),
                            method: method.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            bound.push((EventName::new(*verb, key.clone()), listeners));
        }
        for (event, listeners) in bound {
            self.events.add_listeners(event, listeners);
        }

        debug!(service = %key, "service loaded");
        Ok(service)
    }
}

impl fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceManager")
            .field("factories", &self.factories)
            .field("loaded", &self.loaded.len())
            .finish_non_exhaustive()
    }
}
