//! JSON data mapper.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::error::Category;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::config::{CyclePolicy, MapperConfig, UnknownPropertyPolicy};
use super::{Data, DataMapper, RawInput};
use crate::entity::{Entity, EntityRef, Property};
use crate::error::MappingError;
use crate::metadata::{EntityMetadata, FieldMapping, MetadataProvider, TemporalKind};

/// Output format of temporal fields: ISO-8601 with a basic offset
/// (`2020-01-02T03:04:05+0000`).
pub const TEMPORAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Marker key emitted in place of an entity already being expanded.
pub const REF_KEY: &str = "$ref";

/// [`DataMapper`] for JSON payloads, driven by entity metadata.
pub struct JsonMapper {
    provider: Arc<dyn MetadataProvider>,
    config: MapperConfig,
}

impl JsonMapper {
    #[must_use]
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            provider,
            config: MapperConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Decodes `raw` into a JSON object without touching any entity.
    ///
    /// # Errors
    ///
    /// Returns `NotText` for binary input, `Depth` when nesting exceeds the
    /// configured limit, `DataType` when the top level is not an object, and
    /// `Truncated`, `ControlCharacter` or `Syntax` for malformed text.
    pub fn decode(&self, raw: &RawInput) -> Result<Map<String, Value>, MappingError> {
        let RawInput::Text(text) = raw else {
            return Err(MappingError::NotText);
        };

        let limit = self.config.decode_depth();
        if exceeds_depth(text, limit) {
            return Err(MappingError::Depth { limit });
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(object)) => Ok(object),
            Ok(other) => Err(MappingError::DataType {
                message: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
            Err(err) => Err(classify(&err, limit)),
        }
    }

    /// Casts every payload key against `metadata` before anything is written.
    /// Association keys are skipped and unknown keys follow the configured
    /// policy.
    fn stage(
        &self,
        metadata: &EntityMetadata,
        object: Map<String, Value>,
    ) -> Result<Vec<(String, Property)>, MappingError> {
        let mut staged = Vec::with_capacity(object.len());
        for (key, value) in object {
            if let Some(field) = metadata.field(&key) {
                let property = cast_field(field, value)?;
                staged.push((key, property));
            } else if metadata.association(&key).is_some() {
                debug!(
                    entity = metadata.type_name(),
                    association = %key,
                    "skipping association key"
                );
            } else if self.config.unknown_properties == UnknownPropertyPolicy::Reject {
                return Err(MappingError::unknown_property(metadata.type_name(), key));
            } else {
                debug!(
                    entity = metadata.type_name(),
                    property = %key,
                    "ignoring unknown property"
                );
            }
        }
        Ok(staged)
    }

    /// Writes `staged` in order. When a setter rejects a value, the
    /// properties written so far get their previous values back before the
    /// error is returned.
    fn commit(
        target: &mut dyn Entity,
        staged: Vec<(String, Property)>,
        skip_unknown: bool,
    ) -> Result<(), MappingError> {
        let mut undo: Vec<(String, Property)> = Vec::with_capacity(staged.len());
        for (key, property) in staged {
            let previous = target.get(&key);
            match target.set(&key, property) {
                Ok(()) => {
                    if let Some(previous) = previous {
                        undo.push((key, previous));
                    }
                }
                Err(MappingError::UnknownProperty { .. }) if skip_unknown => {
                    debug!(
                        entity = target.entity_type(),
                        property = %key,
                        "ignoring unknown property"
                    );
                }
                Err(err) => {
                    for (key, previous) in undo.into_iter().rev() {
                        if let Err(restore) = target.set(&key, previous) {
                            warn!(
                                entity = target.entity_type(),
                                property = %key,
                                error = %restore,
                                "failed to restore property"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<(), MappingError> {
        if depth > self.config.max_depth {
            return Err(MappingError::Depth {
                limit: self.config.max_depth,
            });
        }
        Ok(())
    }

    fn reverse_data(
        &self,
        data: &Data,
        depth: usize,
        visiting: &mut HashSet<Identity>,
    ) -> Result<Value, MappingError> {
        self.check_depth(depth)?;
        match data {
            Data::Value(value) => Ok(value.clone()),
            Data::List(items) => items
                .iter()
                .map(|item| self.reverse_data(item, depth + 1, visiting))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Data::Map(entries) => {
                let mut object = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    object.insert(key.clone(), self.reverse_data(item, depth + 1, visiting)?);
                }
                Ok(Value::Object(object))
            }
            Data::Entity(entity) => Ok(self
                .reverse_entity(entity, depth, visiting)?
                .unwrap_or(Value::Null)),
        }
    }

    /// Expands one entity. `None` means the entity was dropped by
    /// [`CyclePolicy::Omit`].
    fn reverse_entity(
        &self,
        entity: &EntityRef,
        depth: usize,
        visiting: &mut HashSet<Identity>,
    ) -> Result<Option<Value>, MappingError> {
        if self.provider.is_transient(entity.entity_type()) {
            return Ok(Some(entity.plain_value()));
        }
        let metadata = self.provider.metadata_for(entity.entity_type())?;

        let identity = Identity::of(entity, &metadata);
        if visiting.contains(&identity) {
            debug!(
                entity = metadata.type_name(),
                policy = ?self.config.cycle_policy,
                "cycle detected"
            );
            return Ok(match self.config.cycle_policy {
                CyclePolicy::Omit => None,
                CyclePolicy::Marker => Some(reference_marker(entity.as_ref(), &metadata)),
            });
        }
        self.check_depth(depth)?;

        visiting.insert(identity.clone());
        let expanded = self.expand_entity(entity.as_ref(), &metadata, depth, visiting);
        visiting.remove(&identity);
        expanded.map(Some)
    }

    fn expand_entity(
        &self,
        entity: &dyn Entity,
        metadata: &EntityMetadata,
        depth: usize,
        visiting: &mut HashSet<Identity>,
    ) -> Result<Value, MappingError> {
        let names = metadata
            .fields()
            .iter()
            .map(|f| &f.name)
            .chain(metadata.associations().iter().map(|a| &a.name));

        let mut object = Map::new();
        for name in names {
            let value = match entity.get(name) {
                Some(property) => self.reverse_property(property, depth, visiting)?,
                None => Some(Value::Null),
            };
            if let Some(value) = value {
                object.insert(name.clone(), value);
            }
        }
        Ok(Value::Object(object))
    }

    fn reverse_property(
        &self,
        property: Property,
        depth: usize,
        visiting: &mut HashSet<Identity>,
    ) -> Result<Option<Value>, MappingError> {
        match property {
            Property::Value(value) => Ok(Some(value)),
            Property::Temporal(value) => Ok(Some(format_temporal(value.as_ref()))),
            Property::One(None) => Ok(Some(Value::Null)),
            Property::One(Some(reference)) => {
                let target = reference.materialize()?;
                self.reverse_entity(&target, depth + 1, visiting)
            }
            Property::Many(references) => {
                let mut items = Vec::with_capacity(references.len());
                for reference in references {
                    let target = reference.materialize()?;
                    if let Some(item) = self.reverse_entity(&target, depth + 1, visiting)? {
                        items.push(item);
                    }
                }
                Ok(Some(Value::Array(items)))
            }
        }
    }
}

impl DataMapper for JsonMapper {
    fn map(&self, target: &mut dyn Entity, raw: &RawInput) -> Result<(), MappingError> {
        let object = self.decode(raw).inspect_err(|err| {
            warn!(entity = target.entity_type(), error = %err, "rejected payload");
        })?;

        let type_name = target.entity_type().to_string();
        if self.provider.is_transient(&type_name) {
            let staged = object
                .into_iter()
                .map(|(key, value)| (key, Property::Value(value)))
                .collect();
            let skip_unknown = self.config.unknown_properties == UnknownPropertyPolicy::Ignore;
            return Self::commit(target, staged, skip_unknown);
        }

        let metadata = self.provider.metadata_for(&type_name)?;
        let staged = self.stage(&metadata, object)?;
        Self::commit(target, staged, false)
    }

    fn to_plain(&self, source: &Data) -> Result<Value, MappingError> {
        let mut visiting = HashSet::new();
        self.reverse_data(source, 0, &mut visiting)
    }

    fn reverse(&self, source: &Data) -> Result<String, MappingError> {
        let value = self.to_plain(source)?;
        serde_json::to_string(&value).map_err(MappingError::Encode)
    }
}

impl std::fmt::Debug for JsonMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonMapper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Scans for container nesting deeper than `limit`, skipping string contents.
fn exceeds_depth(text: &str, limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for byte in text.bytes() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

fn classify(err: &serde_json::Error, limit: usize) -> MappingError {
    let message = err.to_string();
    match err.classify() {
        Category::Eof => MappingError::Truncated { message },
        Category::Data => MappingError::DataType { message },
        Category::Syntax if message.starts_with("recursion limit exceeded") => {
            MappingError::Depth { limit }
        }
        Category::Syntax if message.contains("control character") => {
            MappingError::ControlCharacter { message }
        }
        _ => MappingError::Syntax { message },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn cast_field(field: &FieldMapping, value: Value) -> Result<Property, MappingError> {
    let Some(kind) = field.temporal_kind() else {
        return Ok(Property::Value(value));
    };
    match value {
        Value::Null => Ok(Property::Temporal(None)),
        Value::String(text) => parse_temporal(kind, &text)
            .map(|parsed| Property::Temporal(Some(parsed)))
            .ok_or_else(|| {
                MappingError::invalid_value(
                    &field.name,
                    format!("'{text}' is not a valid {kind:?}"),
                )
            }),
        other => Err(MappingError::invalid_value(
            &field.name,
            format!("expected a string, got {}", json_kind(&other)),
        )),
    }
}

/// Parses a temporal string for a field of the given kind.
///
/// Each kind accepts its short form (`2020-01-02`, `03:04:05`,
/// `2020-01-02T03:04:05`) and every kind accepts RFC 3339 and the basic
/// offset form produced by reverse mapping. Values without an offset are
/// taken as UTC; bare times are placed on 1970-01-01.
#[must_use]
pub fn parse_temporal(kind: TemporalKind, text: &str) -> Option<DateTime<FixedOffset>> {
    let short = match kind {
        TemporalKind::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0)),
        TemporalKind::Time => NaiveTime::parse_from_str(text, "%H:%M:%S")
            .ok()
            .and_then(|time| NaiveDate::from_ymd_opt(1970, 1, 1).map(|date| date.and_time(time))),
        TemporalKind::DateTime => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok(),
        TemporalKind::DateTimeTz => None,
    };
    if let Some(naive) = short {
        return Some(naive.and_utc().fixed_offset());
    }
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, TEMPORAL_FORMAT))
        .ok()
}

fn format_temporal(value: Option<&DateTime<FixedOffset>>) -> Value {
    value.map_or(Value::Null, |dt| Value::String(dt.format(TEMPORAL_FORMAT).to_string()))
}

fn identifier_value(entity: &dyn Entity, id: &str) -> Value {
    match entity.get(id) {
        Some(Property::Value(value)) => value,
        Some(Property::Temporal(value)) => format_temporal(value.as_ref()),
        _ => Value::Null,
    }
}

fn reference_marker(entity: &dyn Entity, metadata: &EntityMetadata) -> Value {
    let mut marker = Map::new();
    marker.insert(REF_KEY.to_string(), Value::String(metadata.type_name().to_string()));
    for id in metadata.identifier() {
        marker.insert(id.clone(), identifier_value(entity, id));
    }
    Value::Object(marker)
}

/// Identity of an entity on the expansion path.
///
/// Entities with a non-null identifier are keyed by type and identifier
/// values, so distinct proxies of one row compare equal. Anything else is
/// keyed by address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Identity {
    Row { type_name: String, ids: String },
    Address(*const ()),
}

impl Identity {
    fn of(entity: &EntityRef, metadata: &EntityMetadata) -> Self {
        let ids: Vec<Value> = metadata
            .identifier()
            .iter()
            .map(|id| identifier_value(entity.as_ref(), id))
            .collect();
        if ids.is_empty() || ids.iter().any(Value::is_null) {
            return Self::Address(Arc::as_ptr(entity).cast::<()>());
        }
        Self::Row {
            type_name: metadata.type_name().to_string(),
            ids: Value::Array(ids).to_string(),
        }
    }
}
