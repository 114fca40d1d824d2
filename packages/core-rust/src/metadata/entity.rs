//! Entity metadata consumed from the persistence layer.
//!
//! The dispatch core never inspects a schema on its own. It asks a
//! [`MetadataProvider`] which types are tracked entities and how their
//! fields and associations are shaped.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// Temporal column kinds that get cast on input and formatted on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalKind {
    Date,
    DateTime,
    DateTimeTz,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Scalar,
    Temporal(TemporalKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    #[serde(default)]
    pub field_type: FieldType,
}

impl FieldMapping {
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Scalar,
        }
    }

    #[must_use]
    pub fn temporal(name: impl Into<String>, kind: TemporalKind) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Temporal(kind),
        }
    }

    /// The temporal kind, if the field holds one.
    #[must_use]
    pub fn temporal_kind(&self) -> Option<TemporalKind> {
        match self.field_type {
            FieldType::Temporal(kind) => Some(kind),
            FieldType::Scalar => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationMapping {
    pub name: String,
    pub target_type: String,
    #[serde(default)]
    pub is_collection: bool,
}

/// Shape of one persisted entity type.
///
/// Field and association order is significant: reverse mapping emits keys
/// in exactly this order, fields first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    type_name: String,
    #[serde(default)]
    identifier: Vec<String>,
    #[serde(default)]
    fields: Vec<FieldMapping>,
    #[serde(default)]
    associations: Vec<AssociationMapping>,
}

impl EntityMetadata {
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            identifier: Vec::new(),
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Declares an identifier field. Identifier fields are also regular
    /// fields, so they are appended to the field list as scalars when not
    /// already present.
    #[must_use]
    pub fn with_identifier(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.field(&name).is_none() {
            self.fields.push(FieldMapping::scalar(name.clone()));
        }
        self.identifier.push(name);
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_association(
        mut self,
        name: impl Into<String>,
        target_type: impl Into<String>,
        is_collection: bool,
    ) -> Self {
        self.associations.push(AssociationMapping {
            name: name.into(),
            target_type: target_type.into(),
            is_collection,
        });
        self
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn identifier(&self) -> &[String] {
        &self.identifier
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    #[must_use]
    pub fn associations(&self) -> &[AssociationMapping] {
        &self.associations
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn association(&self, name: &str) -> Option<&AssociationMapping> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Like [`association`](Self::association) but reports a miss as an error.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::AssociationNotFound` when `name` is not declared.
    pub fn require_association(&self, name: &str) -> Result<&AssociationMapping, MetadataError> {
        self.association(name)
            .ok_or_else(|| MetadataError::AssociationNotFound {
                type_name: self.type_name.clone(),
                association: name.to_string(),
            })
    }
}

/// Lookup contract over the persistence layer's schema.
pub trait MetadataProvider: Send + Sync {
    /// Whether `type_name` is untracked. Transient values pass through
    /// reverse mapping unexpanded.
    fn is_transient(&self, type_name: &str) -> bool;

    /// # Errors
    ///
    /// Returns `MetadataError::EntityNotFound` for types the provider does not track.
    fn metadata_for(&self, type_name: &str) -> Result<Arc<EntityMetadata>, MetadataError>;
}

// ---------------------------------------------------------------------------
// EntityMetadataRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct EntityMetadataRegistryBuilder {
    entities: HashMap<String, Arc<EntityMetadata>>,
}

impl EntityMetadataRegistryBuilder {
    /// # Errors
    ///
    /// Returns `MetadataError::DuplicateClass` if the type is already registered.
    pub fn register(&mut self, metadata: EntityMetadata) -> Result<&mut Self, MetadataError> {
        if self.entities.contains_key(metadata.type_name()) {
            return Err(MetadataError::DuplicateClass {
                class_name: metadata.type_name().to_string(),
            });
        }
        self.entities
            .insert(metadata.type_name().to_string(), Arc::new(metadata));
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> EntityMetadataRegistry {
        EntityMetadataRegistry {
            entities: self.entities,
        }
    }
}

/// In-memory [`MetadataProvider`]. Every registered type is tracked; every
/// other type is transient.
#[derive(Debug, Default)]
pub struct EntityMetadataRegistry {
    entities: HashMap<String, Arc<EntityMetadata>>,
}

impl EntityMetadataRegistry {
    #[must_use]
    pub fn builder() -> EntityMetadataRegistryBuilder {
        EntityMetadataRegistryBuilder::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl MetadataProvider for EntityMetadataRegistry {
    fn is_transient(&self, type_name: &str) -> bool {
        !self.entities.contains_key(type_name)
    }

    fn metadata_for(&self, type_name: &str) -> Result<Arc<EntityMetadata>, MetadataError> {
        self.entities
            .get(type_name)
            .cloned()
            .ok_or_else(|| MetadataError::EntityNotFound {
                type_name: type_name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee() -> EntityMetadata {
        EntityMetadata::new("Employee")
            .with_identifier("id")
            .with_field(FieldMapping::scalar("name"))
            .with_field(FieldMapping::temporal("hired_at", TemporalKind::DateTimeTz))
            .with_association("department", "Department", false)
            .with_association("assets", "Asset", true)
    }

    #[test]
    fn identifier_is_a_field() {
        let meta = employee();
        assert_eq!(meta.identifier(), ["id"]);
        let names: Vec<&str> = meta.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "hired_at"]);
    }

    #[test]
    fn field_and_association_lookup() {
        let meta = employee();
        assert_eq!(
            meta.field("hired_at").and_then(FieldMapping::temporal_kind),
            Some(TemporalKind::DateTimeTz)
        );
        assert!(meta.field("name").unwrap().temporal_kind().is_none());
        assert!(meta.association("assets").unwrap().is_collection);
        assert_eq!(meta.require_association("department").unwrap().target_type, "Department");
        assert!(matches!(
            meta.require_association("boss"),
            Err(MetadataError::AssociationNotFound { .. })
        ));
    }

    #[test]
    fn registry_classifies_transient_types() {
        let mut builder = EntityMetadataRegistry::builder();
        builder.register(employee()).unwrap();
        assert!(builder.register(employee()).is_err());
        let registry = builder.build();

        assert!(!registry.is_transient("Employee"));
        assert!(registry.is_transient("Money"));
        assert_eq!(registry.metadata_for("Employee").unwrap().type_name(), "Employee");
        assert_eq!(
            registry.metadata_for("Money").unwrap_err(),
            MetadataError::EntityNotFound {
                type_name: "Money".to_string()
            }
        );
    }

    #[test]
    fn deserializes_from_schema_document() {
        let json = r#"{
            "type_name": "Department",
            "identifier": ["id"],
            "fields": [
                {"name": "id"},
                {"name": "founded", "field_type": {"temporal": "date"}}
            ],
            "associations": [{"name": "employees", "target_type": "Employee", "is_collection": true}]
        }"#;
        let meta: EntityMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.field("founded").unwrap().temporal_kind(), Some(TemporalKind::Date));
        assert_eq!(meta.field("id").unwrap().field_type, FieldType::Scalar);
        assert_eq!(meta.associations().len(), 1);
    }
}
