//! Conversion between wire payloads and entity graphs.

pub mod config;
pub mod json;

use std::sync::Arc;

use serde_json::Value;

use crate::entity::{Entity, EntityRef};
use crate::error::MappingError;

pub use config::{CyclePolicy, MapperConfig, UnknownPropertyPolicy, DECODER_DEPTH_LIMIT};
pub use json::JsonMapper;

/// Raw request body as received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&str> for RawInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RawInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for RawInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Input to reverse mapping: plain containers that may hold entities.
#[derive(Clone)]
pub enum Data {
    Value(Value),
    List(Vec<Data>),
    /// Keyed container; entries are emitted in this order.
    Map(Vec<(String, Data)>),
    Entity(EntityRef),
}

impl Data {
    #[must_use]
    pub fn entities(entities: impl IntoIterator<Item = EntityRef>) -> Self {
        Self::List(entities.into_iter().map(Data::Entity).collect())
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<EntityRef> for Data {
    fn from(entity: EntityRef) -> Self {
        Self::Entity(entity)
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Self::Entity(e) => f.debug_tuple("Entity").field(&e.entity_type()).finish(),
        }
    }
}

/// Bidirectional mapper between an encoded format and entity graphs.
pub trait DataMapper: Send + Sync {
    /// Decodes `raw` and assigns the resulting properties onto `target`.
    ///
    /// # Errors
    ///
    /// Returns a decode-kind `MappingError` for malformed input, or the
    /// entity's own error when an assignment is rejected.
    fn map(&self, target: &mut dyn Entity, raw: &RawInput) -> Result<(), MappingError>;

    /// Converts `source` to plain data without encoding it.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`reverse`](Self::reverse), minus encoding.
    fn to_plain(&self, source: &Data) -> Result<Value, MappingError>;

    /// Converts `source` to plain data and encodes it.
    ///
    /// # Errors
    ///
    /// Fails when the graph is nested deeper than the configured limit, a
    /// lazy reference cannot be loaded, or encoding fails.
    fn reverse(&self, source: &Data) -> Result<String, MappingError>;
}

/// Shared handle to a registered data mapper.
pub type DataMapperRef = Arc<dyn DataMapper>;
