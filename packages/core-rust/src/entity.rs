//! Entity graph abstraction.
//!
//! Domain models expose their state through [`Entity`] instead of dynamic
//! property access. Most implementations delegate to a static
//! [`AccessorTable`] that maps property names to plain getter and setter
//! functions, built once per type.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::MappingError;

/// Shared handle to an entity in a loaded graph.
pub type EntityRef = Arc<dyn Entity>;

/// Read/write surface of one domain entity.
pub trait Entity: Send + Sync {
    /// Type identifier understood by the [`MetadataProvider`](crate::metadata::MetadataProvider).
    fn entity_type(&self) -> &str;

    /// Reads a property. `None` means the entity has no such property.
    fn get(&self, property: &str) -> Option<Property>;

    /// Writes a property.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::UnknownProperty` for undeclared properties and
    /// `MappingError::InvalidValue` when `value` has the wrong shape.
    fn set(&mut self, property: &str, value: Property) -> Result<(), MappingError>;

    /// Plain representation used when the type is not a tracked entity.
    fn plain_value(&self) -> Value {
        Value::Null
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// Value of a single entity property.
#[derive(Debug, Clone)]
pub enum Property {
    Value(Value),
    Temporal(Option<DateTime<FixedOffset>>),
    One(Option<Reference>),
    Many(Vec<Reference>),
}

impl Property {
    #[must_use]
    pub fn one(entity: EntityRef) -> Self {
        Self::One(Some(Reference::Loaded(entity)))
    }

    #[must_use]
    pub fn many(entities: impl IntoIterator<Item = EntityRef>) -> Self {
        Self::Many(entities.into_iter().map(Reference::Loaded).collect())
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Extracts a string value; `null` is rejected.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::InvalidValue` naming `field` for any other shape.
    pub fn into_string(self, field: &str) -> Result<String, MappingError> {
        match self {
            Self::Value(Value::String(s)) => Ok(s),
            other => Err(MappingError::invalid_value(
                field,
                format!("expected a string, got {}", other.describe()),
            )),
        }
    }

    /// Extracts an integer, accepting integral JSON numbers only.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::InvalidValue` naming `field` for any other shape.
    pub fn into_i64(self, field: &str) -> Result<i64, MappingError> {
        if let Self::Value(Value::Number(n)) = &self {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
        }
        Err(MappingError::invalid_value(
            field,
            format!("expected an integer, got {}", self.describe()),
        ))
    }

    /// Extracts an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::InvalidValue` when the property is not a plain value.
    pub fn into_value(self, field: &str) -> Result<Value, MappingError> {
        match self {
            Self::Value(v) => Ok(v),
            other => Err(MappingError::invalid_value(
                field,
                format!("expected a plain value, got {}", other.describe()),
            )),
        }
    }

    /// # Errors
    ///
    /// Returns `MappingError::InvalidValue` unless the property is temporal or `null`.
    pub fn into_temporal(self, field: &str) -> Result<Option<DateTime<FixedOffset>>, MappingError> {
        match self {
            Self::Temporal(t) => Ok(t),
            Self::Value(Value::Null) => Ok(None),
            other => Err(MappingError::invalid_value(
                field,
                format!("expected a temporal value, got {}", other.describe()),
            )),
        }
    }

    /// # Errors
    ///
    /// Returns `MappingError::InvalidValue` unless the property is a single reference.
    pub fn into_one(self, field: &str) -> Result<Option<Reference>, MappingError> {
        match self {
            Self::One(r) => Ok(r),
            Self::Value(Value::Null) => Ok(None),
            other => Err(MappingError::invalid_value(
                field,
                format!("expected a reference, got {}", other.describe()),
            )),
        }
    }

    /// # Errors
    ///
    /// Returns `MappingError::InvalidValue` unless the property is a collection.
    pub fn into_many(self, field: &str) -> Result<Vec<Reference>, MappingError> {
        match self {
            Self::Many(r) => Ok(r),
            other => Err(MappingError::invalid_value(
                field,
                format!("expected a collection, got {}", other.describe()),
            )),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Value(Value::Null) => "null",
            Self::Value(Value::Bool(_)) => "a boolean",
            Self::Value(Value::Number(_)) => "a number",
            Self::Value(Value::String(_)) => "a string",
            Self::Value(Value::Array(_)) => "an array",
            Self::Value(Value::Object(_)) => "an object",
            Self::Temporal(_) => "a temporal value",
            Self::One(_) => "a reference",
            Self::Many(_) => "a collection",
        }
    }
}

impl From<Value> for Property {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<i64> for Property {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<Option<DateTime<FixedOffset>>> for Property {
    fn from(value: Option<DateTime<FixedOffset>>) -> Self {
        Self::Temporal(value)
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Association target, either in memory or behind a lazy loader.
#[derive(Clone)]
pub enum Reference {
    Loaded(EntityRef),
    Lazy(Arc<LazyReference>),
}

impl Reference {
    /// Returns the referenced entity, running the lazy loader if needed.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::LazyLoad` when the loader fails.
    pub fn materialize(&self) -> Result<EntityRef, MappingError> {
        match self {
            Self::Loaded(entity) => Ok(Arc::clone(entity)),
            Self::Lazy(lazy) => lazy.load(),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(entity) => f.debug_tuple("Loaded").field(&entity.entity_type()).finish(),
            Self::Lazy(lazy) => f.debug_tuple("Lazy").field(lazy).finish(),
        }
    }
}

impl From<EntityRef> for Reference {
    fn from(entity: EntityRef) -> Self {
        Self::Loaded(entity)
    }
}

type Loader = Box<dyn Fn() -> anyhow::Result<EntityRef> + Send + Sync>;

/// Proxy for an association that has not been fetched yet.
///
/// The loader runs at most once; later calls return the cached entity.
/// A failed load leaves the proxy unloaded so the next call retries.
pub struct LazyReference {
    type_name: String,
    loader: Loader,
    loading: Mutex<()>,
    loaded: OnceLock<EntityRef>,
}

impl LazyReference {
    pub fn new<F>(type_name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<EntityRef> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            loader: Box::new(loader),
            loading: Mutex::new(()),
            loaded: OnceLock::new(),
        }
    }

    /// Wraps a new proxy in a [`Reference`].
    pub fn reference<F>(type_name: impl Into<String>, loader: F) -> Reference
    where
        F: Fn() -> anyhow::Result<EntityRef> + Send + Sync + 'static,
    {
        Reference::Lazy(Arc::new(Self::new(type_name, loader)))
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    fn load(&self) -> Result<EntityRef, MappingError> {
        if let Some(entity) = self.loaded.get() {
            return Ok(Arc::clone(entity));
        }
        let _guard = self.loading.lock();
        if let Some(entity) = self.loaded.get() {
            return Ok(Arc::clone(entity));
        }
        let entity = (self.loader)().map_err(|source| MappingError::LazyLoad {
            type_name: self.type_name.clone(),
            source,
        })?;
        Ok(Arc::clone(self.loaded.get_or_init(|| entity)))
    }
}

impl fmt::Debug for LazyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyReference")
            .field("type_name", &self.type_name)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// AccessorTable
// ---------------------------------------------------------------------------

pub type Getter<T> = fn(&T) -> Property;
pub type Setter<T> = fn(&mut T, Property) -> Result<(), MappingError>;

struct Accessor<T> {
    getter: Getter<T>,
    setter: Option<Setter<T>>,
}

/// Name to getter/setter table for one entity type.
///
/// Intended to live in a `static` initialised on first use:
///
/// ```
/// use std::sync::LazyLock;
/// use rested_core::entity::{AccessorTable, Property};
///
/// struct Tag { label: String }
///
/// static TAG: LazyLock<AccessorTable<Tag>> = LazyLock::new(|| {
///     AccessorTable::new("Tag").field(
///         "label",
///         |t| t.label.as_str().into(),
///         |t, v| { t.label = v.into_string("label")?; Ok(()) },
///     )
/// });
///
/// let mut tag = Tag { label: "a".into() };
/// TAG.set(&mut tag, "label", "b".into()).unwrap();
/// assert_eq!(tag.label, "b");
/// ```
pub struct AccessorTable<T> {
    type_name: String,
    names: Vec<String>,
    accessors: HashMap<String, Accessor<T>>,
}

impl<T> AccessorTable<T> {
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            names: Vec::new(),
            accessors: HashMap::new(),
        }
    }

    /// Adds a readable and writable property. Re-adding a name replaces it.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, getter: Getter<T>, setter: Setter<T>) -> Self {
        self.insert(name.into(), getter, Some(setter));
        self
    }

    /// Adds a property that cannot be assigned.
    #[must_use]
    pub fn read_only(mut self, name: impl Into<String>, getter: Getter<T>) -> Self {
        self.insert(name.into(), getter, None);
        self
    }

    fn insert(&mut self, name: String, getter: Getter<T>, setter: Option<Setter<T>>) {
        if !self.accessors.contains_key(&name) {
            self.names.push(name.clone());
        }
        self.accessors.insert(name, Accessor { getter, setter });
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Property names in declaration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, target: &T, name: &str) -> Option<Property> {
        self.accessors.get(name).map(|a| (a.getter)(target))
    }

    /// # Errors
    ///
    /// Returns `MappingError::UnknownProperty` for undeclared names,
    /// `MappingError::InvalidValue` for read-only properties, and whatever
    /// the setter itself reports.
    pub fn set(&self, target: &mut T, name: &str, value: Property) -> Result<(), MappingError> {
        let accessor = self
            .accessors
            .get(name)
            .ok_or_else(|| MappingError::unknown_property(&self.type_name, name))?;
        match accessor.setter {
            Some(setter) => setter(target, value),
            None => Err(MappingError::invalid_value(name, "property is read-only")),
        }
    }
}

impl<T> fmt::Debug for AccessorTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorTable")
            .field("type_name", &self.type_name)
            .field("names", &self.names)
            .finish()
    }
}
