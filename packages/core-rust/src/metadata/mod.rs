//! Resource, service and entity metadata.
//!
//! All stores follow the same lifecycle: a builder collects definitions at
//! startup, then `build()` freezes them into an immutable store shared by
//! `Arc` for the rest of the process.

pub mod entity;
pub mod resource;
pub mod service;

pub use entity::{
    AssociationMapping, EntityMetadata, EntityMetadataRegistry, EntityMetadataRegistryBuilder,
    FieldMapping, FieldType, MetadataProvider, TemporalKind,
};
pub use resource::{
    derive_resource_name, ResourceMetadata, ResourceMetadataStore, ResourceMetadataStoreBuilder,
    SubResource,
};
pub use service::{ServiceMetadata, ServiceMetadataStore, ServiceMetadataStoreBuilder};
