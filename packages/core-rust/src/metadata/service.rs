//! Service metadata: which listener methods a service declares per verb.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::MetadataError;
use crate::verb::Verb;

/// Declared listeners and data mapper for one service class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    class_name: String,
    data_mapper: Option<String>,
    #[serde(default)]
    listeners: HashMap<Verb, Vec<String>>,
}

impl ServiceMetadata {
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            data_mapper: None,
            listeners: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_data_mapper(mut self, data_mapper: impl Into<String>) -> Self {
        self.data_mapper = Some(data_mapper.into());
        self
    }

    /// Appends a listener method for `verb`. Duplicates are kept and each
    /// occurrence is invoked.
    pub fn add_listener(&mut self, verb: Verb, method: impl Into<String>) {
        self.listeners.entry(verb).or_default().push(method.into());
    }

    /// Builder-style variant of [`add_listener`](Self::add_listener).
    #[must_use]
    pub fn with_listener(mut self, verb: Verb, method: impl Into<String>) -> Self {
        self.add_listener(verb, method);
        self
    }

    /// Listener methods for `verb` in declaration order.
    #[must_use]
    pub fn listeners(&self, verb: Verb) -> &[String] {
        self.listeners.get(&verb).map_or(&[], Vec::as_slice)
    }

    /// Replaces every declared listener.
    pub fn set_all_listeners(&mut self, listeners: HashMap<Verb, Vec<String>>) {
        self.listeners = listeners;
    }

    #[must_use]
    pub fn all_listeners(&self) -> &HashMap<Verb, Vec<String>> {
        &self.listeners
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    #[must_use]
    pub fn data_mapper(&self) -> Option<&str> {
        self.data_mapper.as_deref()
    }
}

/// Collects service metadata at startup before freezing it into a store.
#[derive(Debug, Default)]
pub struct ServiceMetadataStoreBuilder {
    services: HashMap<String, Arc<ServiceMetadata>>,
}

impl ServiceMetadataStoreBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `MetadataError::DuplicateClass` if the class is already registered.
    pub fn register(&mut self, metadata: ServiceMetadata) -> Result<&mut Self, MetadataError> {
        if self.services.contains_key(metadata.class_name()) {
            return Err(MetadataError::DuplicateClass {
                class_name: metadata.class_name().to_string(),
            });
        }
        self.services
            .insert(metadata.class_name().to_string(), Arc::new(metadata));
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> ServiceMetadataStore {
        ServiceMetadataStore {
            services: self.services,
        }
    }
}

/// Immutable store of service metadata keyed by service class.
#[derive(Debug, Default)]
pub struct ServiceMetadataStore {
    services: HashMap<String, Arc<ServiceMetadata>>,
}

impl ServiceMetadataStore {
    #[must_use]
    pub fn builder() -> ServiceMetadataStoreBuilder {
        ServiceMetadataStoreBuilder::new()
    }

    /// # Errors
    ///
    /// Returns `MetadataError::ServiceNotFound` for unregistered classes.
    pub fn metadata_for(&self, class_name: &str) -> Result<Arc<ServiceMetadata>, MetadataError> {
        self.services
            .get(class_name)
            .cloned()
            .ok_or_else(|| MetadataError::ServiceNotFound {
                class_name: class_name.to_string(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
