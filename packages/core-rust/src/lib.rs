//! Rested Core: verbs, resource/service/entity metadata, the entity
//! abstraction, data mappers and content converters.

pub mod content;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod metadata;
pub mod verb;

pub use content::{
    media_type_essence, ContentConverter, ContentConverters, ContentNegotiator,
    ExactMatchNegotiator, JsonConverter, NegotiatedResult,
};
pub use entity::{AccessorTable, Entity, EntityRef, LazyReference, Property, Reference};
pub use error::{ConverterError, MappingError, MetadataError};
pub use mapper::{
    CyclePolicy, Data, DataMapper, DataMapperRef, JsonMapper, MapperConfig, RawInput,
    UnknownPropertyPolicy,
};
pub use metadata::{
    EntityMetadata, EntityMetadataRegistry, MetadataProvider, ResourceMetadata,
    ResourceMetadataStore, ServiceMetadata, ServiceMetadataStore,
};
pub use verb::{UnknownVerb, Verb};
