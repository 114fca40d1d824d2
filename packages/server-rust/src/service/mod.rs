//! Service handlers and their lifecycle.
//!
//! A service is a handler object bound to one resource context. The
//! [`ServiceManager`] creates at most one instance per
//! `(service class, resource class, dispatch context)` and wires that
//! instance's listeners into the [`EventManager`](crate::events::EventManager)
//! exactly once.

pub mod factories;
pub mod manager;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rested_core::{DataMapperRef, ResourceMetadata, ServiceMetadata};

use crate::events::Listener;

pub use factories::ServiceFactories;
pub use manager::ServiceManager;

// ---------------------------------------------------------------------------
// ContextId
// ---------------------------------------------------------------------------

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identity of a dispatch context. Services loaded for different contexts
/// are distinct instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates a process-unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ServiceKey
// ---------------------------------------------------------------------------

/// Cache key of a loaded service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub service_class: String,
    pub resource_class: String,
    pub context: ContextId,
}

impl ServiceKey {
    #[must_use]
    pub fn new(
        service_class: impl Into<String>,
        resource_class: impl Into<String>,
        context: ContextId,
    ) -> Self {
        Self {
            service_class: service_class.into(),
            resource_class: resource_class.into(),
            context,
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}#{}]", self.service_class, self.resource_class, self.context)
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Everything a service receives when it is constructed.
#[derive(Clone)]
pub struct ServiceContext {
    pub context: ContextId,
    /// Resource the instance serves.
    pub resource: Arc<ResourceMetadata>,
    pub service: Arc<ServiceMetadata>,
    /// Mapper named by the service metadata, if any.
    pub data_mapper: Option<DataMapperRef>,
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("context", &self.context)
            .field("resource", &self.resource.class_name())
            .field("service", &self.service.class_name())
            .field("data_mapper", &self.data_mapper.is_some())
            .finish()
    }
}

/// Handler object owning verb-specific business logic.
///
/// Listener methods are declared by name in [`ServiceMetadata`] and resolved
/// once, when the instance is loaded, through [`bind_listener`](Self::bind_listener).
pub trait Service: Send + Sync {
    /// Resolves a declared listener method name to a callable bound to this
    /// instance. Returns `None` for names the service does not implement.
    fn bind_listener(self: Arc<Self>, method: &str) -> Option<Listener>;
}
