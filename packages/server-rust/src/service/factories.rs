//! Constructor registry for service classes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Service, ServiceContext};
use crate::error::ServiceError;

type Factory = dyn Fn(ServiceContext) -> anyhow::Result<Arc<dyn Service>> + Send + Sync;

/// Constructors for service classes, keyed by service class id.
#[derive(Clone, Default)]
pub struct ServiceFactories {
    factories: HashMap<String, Arc<Factory>>,
}

impl ServiceFactories {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the constructor for `class_name`, replacing any previous one.
    pub fn register<F>(&mut self, class_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(ServiceContext) -> anyhow::Result<Arc<dyn Service>> + Send + Sync + 'static,
    {
        self.factories.insert(class_name.into(), Arc::new(factory));
        self
    }

    #[must_use]
    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// Constructs a new instance of `class_name`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ServiceNotFound` for unknown classes and
    /// `ServiceError::Construction` when the constructor fails.
    pub fn create(
        &self,
        class_name: &str,
        ctx: ServiceContext,
    ) -> Result<Arc<dyn Service>, ServiceError> {
        let factory = self
            .factories
            .get(class_name)
            .ok_or_else(|| ServiceError::ServiceNotFound {
                class_name: class_name.to_string(),
            })?;
        factory(ctx).map_err(|source| ServiceError::Construction {
            class_name: class_name.to_string(),
            source,
        })
    }
}

impl fmt::Debug for ServiceFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort_unstable();
        f.debug_struct("ServiceFactories").field("classes", &names).finish()
    }
}
