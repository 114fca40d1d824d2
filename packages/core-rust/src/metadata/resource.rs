//! Resource metadata and its frozen lookup store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::MetadataError;

/// Mapping of a sub-resource name onto an association of its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResource {
    /// Association field on the parent entity.
    pub field_name: String,
    /// Service handling requests addressed to the sub-resource.
    pub service_id: String,
}

/// Describes how an entity class is exposed as a resource.
///
/// When deserialized, a missing `name` is derived from the class name and a
/// sub-resource key declared twice is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResourceDocument")]
pub struct ResourceMetadata {
    class_name: String,
    name: String,
    service_id: Option<String>,
    sub_resources: HashMap<String, SubResource>,
}

impl ResourceMetadata {
    /// Creates metadata for `class_name` with a name derived from the class.
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let name = derive_resource_name(&class_name);
        Self {
            class_name,
            name,
            service_id: None,
            sub_resources: HashMap::new(),
        }
    }

    /// Overrides the wire name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the service handling this resource.
    #[must_use]
    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    /// Declares a sub-resource backed by the association `field_name`.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::DuplicateSubResource` if `name` is already declared.
    pub fn with_sub_resource(
        mut self,
        name: impl Into<String>,
        field_name: impl Into<String>,
        service_id: impl Into<String>,
    ) -> Result<Self, MetadataError> {
        let name = name.into();
        if self.sub_resources.contains_key(&name) {
            return Err(MetadataError::DuplicateSubResource {
                resource: self.name,
                name,
            });
        }
        self.sub_resources.insert(
            name,
            SubResource {
                field_name: field_name.into(),
                service_id: service_id.into(),
            },
        );
        Ok(self)
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn service_id(&self) -> Option<&str> {
        self.service_id.as_deref()
    }

    #[must_use]
    pub fn sub_resources(&self) -> &HashMap<String, SubResource> {
        &self.sub_resources
    }

    /// Looks up a declared sub-resource.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::SubResourceNotFound` if `name` is not declared.
    pub fn sub_resource(&self, name: &str) -> Result<&SubResource, MetadataError> {
        self.sub_resources
            .get(name)
            .ok_or_else(|| MetadataError::SubResourceNotFound {
                resource: self.name.clone(),
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn has_sub_resource(&self, name: &str) -> bool {
        self.sub_resources.contains_key(name)
    }
}

/// Wire form of [`ResourceMetadata`] before validation.
#[derive(Deserialize)]
struct ResourceDocument {
    class_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    service_id: Option<String>,
    #[serde(default, deserialize_with = "sub_resource_entries")]
    sub_resources: Vec<(String, SubResource)>,
}

impl TryFrom<ResourceDocument> for ResourceMetadata {
    type Error = MetadataError;

    fn try_from(document: ResourceDocument) -> Result<Self, Self::Error> {
        let mut metadata = Self::new(document.class_name);
        if let Some(name) = document.name {
            metadata = metadata.with_name(name);
        }
        metadata.service_id = document.service_id;
        for (name, sub) in document.sub_resources {
            metadata = metadata.with_sub_resource(name, sub.field_name, sub.service_id)?;
        }
        Ok(metadata)
    }
}

/// Reads the sub-resource map as entries in document order, keeping
/// repeated keys.
fn sub_resource_entries<'de, D>(deserializer: D) -> Result<Vec<(String, SubResource)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Entries;

    impl<'de> Visitor<'de> for Entries {
        type Value = Vec<(String, SubResource)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of sub-resource declarations")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(Entries)
}

/// Derives a wire name from a class identifier.
///
/// Takes the last path segment (`::`, `\` and `.` all separate segments) and
/// converts it to `snake_case`: `Company::Employee` becomes `employee`,
/// `EmployeeAsset` becomes `employee_asset`.
#[must_use]
pub fn derive_resource_name(class_name: &str) -> String {
    let short = class_name
        .rsplit([':', '\\', '.'])
        .next()
        .unwrap_or(class_name);

    let mut name = String::with_capacity(short.len() + 4);
    let mut prev_lower = false;
    for c in short.chars() {
        if c.is_uppercase() {
            if prev_lower {
                name.push('_');
            }
            name.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            name.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    name
}

// ---------------------------------------------------------------------------
// ResourceMetadataStore
// ---------------------------------------------------------------------------

/// Collects resource metadata at startup before freezing it into a store.
#[derive(Debug, Default)]
pub struct ResourceMetadataStoreBuilder {
    by_class: HashMap<String, Arc<ResourceMetadata>>,
    by_name: HashMap<String, String>,
}

impl ResourceMetadataStoreBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds metadata for one resource class.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::DuplicateClass` when the class is already
    /// registered and `MetadataError::DuplicateName` when another class already
    /// uses the same wire name.
    pub fn register(&mut self, metadata: ResourceMetadata) -> Result<&mut Self, MetadataError> {
        if self.by_class.contains_key(metadata.class_name()) {
            return Err(MetadataError::DuplicateClass {
                class_name: metadata.class_name().to_string(),
            });
        }
        if let Some(existing) = self.by_name.get(metadata.name()) {
            return Err(MetadataError::DuplicateName {
                name: metadata.name().to_string(),
                existing: existing.clone(),
            });
        }

        debug!(
            class = metadata.class_name(),
            name = metadata.name(),
            "registered resource metadata"
        );
        self.by_name
            .insert(metadata.name().to_string(), metadata.class_name().to_string());
        self.by_class
            .insert(metadata.class_name().to_string(), Arc::new(metadata));
        Ok(self)
    }

    /// Freezes the collected metadata.
    #[must_use]
    pub fn build(self) -> ResourceMetadataStore {
        ResourceMetadataStore {
            by_class: self.by_class,
            by_name: self.by_name,
        }
    }
}

/// Immutable store of resource metadata, keyed by class and by wire name.
///
/// Built once at startup and shared behind an `Arc`; all lookups are
/// read-only, so concurrent access needs no locking.
#[derive(Debug, Default)]
pub struct ResourceMetadataStore {
    by_class: HashMap<String, Arc<ResourceMetadata>>,
    by_name: HashMap<String, String>,
}

impl ResourceMetadataStore {
    #[must_use]
    pub fn builder() -> ResourceMetadataStoreBuilder {
        ResourceMetadataStoreBuilder::new()
    }

    /// Returns metadata for a resource class.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::ClassNotFound` for unregistered classes.
    pub fn metadata_for(&self, class_name: &str) -> Result<Arc<ResourceMetadata>, MetadataError> {
        self.by_class
            .get(class_name)
            .cloned()
            .ok_or_else(|| MetadataError::ClassNotFound {
                class_name: class_name.to_string(),
            })
    }

    /// Returns metadata for the resource exposed under `name`.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::ResourceNotFound` for unknown names.
    pub fn metadata_by_name(&self, name: &str) -> Result<Arc<ResourceMetadata>, MetadataError> {
        self.by_name
            .get(name)
            .and_then(|class_name| self.by_class.get(class_name))
            .cloned()
            .ok_or_else(|| MetadataError::ResourceNotFound {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn has_resource(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered wire names, sorted.
    #[must_use]
    pub fn resource_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn employee() -> ResourceMetadata {
        ResourceMetadata::new("Company::Employee")
            .with_service("EmployeeService")
            .with_sub_resource("assets", "assets", "EmployeeAssetsService")
            .unwrap()
    }

    #[test]
    fn derives_snake_case_names() {
        assert_eq!(derive_resource_name("Company::Employee"), "employee");
        assert_eq!(derive_resource_name("Models\\Company\\EmployeeAsset"), "employee_asset");
        assert_eq!(derive_resource_name("company.department"), "department");
        assert_eq!(derive_resource_name("Invoice2Line"), "invoice2_line");
        assert_eq!(derive_resource_name("HTTPLog"), "httplog");
    }

    #[test]
    fn explicit_name_overrides_derived_name() {
        let meta = ResourceMetadata::new("Company::Employee").with_name("staff");
        assert_eq!(meta.name(), "staff");
        assert_eq!(meta.class_name(), "Company::Employee");
        assert!(meta.service_id().is_none());
    }

    #[test]
    fn sub_resources_are_unique() {
        let err = employee()
            .with_sub_resource("assets", "other", "OtherService")
            .unwrap_err();
        assert!(matches!(
            err,
            MetadataError::DuplicateSubResource { name, .. } if name == "assets"
        ));
    }

    #[test]
    fn deserialized_metadata_derives_missing_name() {
        let meta: ResourceMetadata = serde_json::from_str(
            r#"{"class_name": "Company::EmployeeAsset", "service_id": "AssetService"}"#,
        )
        .unwrap();
        assert_eq!(meta.name(), "employee_asset");
        assert_eq!(meta.service_id(), Some("AssetService"));
        assert!(meta.sub_resources().is_empty());

        let named: ResourceMetadata =
            serde_json::from_str(r#"{"class_name": "Company::Employee", "name": "staff"}"#)
                .unwrap();
        assert_eq!(named.name(), "staff");
    }

    #[test]
    fn deserialized_metadata_rejects_repeated_sub_resources() {
        let json = r#"{
            "class_name": "Company::Employee",
            "sub_resources": {
                "assets": { "field_name": "assets", "service_id": "AssetService" },
                "assets": { "field_name": "devices", "service_id": "DeviceService" }
            }
        }"#;
        let err = serde_json::from_str::<ResourceMetadata>(json).unwrap_err();
        assert!(err.to_string().contains("sub-resource 'assets'"));
    }

    #[test]
    fn serialized_metadata_reads_back() {
        let meta = employee();
        let text = serde_json::to_string(&meta).unwrap();
        assert_eq!(serde_json::from_str::<ResourceMetadata>(&text).unwrap(), meta);
    }

    #[test]
    fn sub_resource_lookup() {
        let meta = employee();
        let sub = meta.sub_resource("assets").unwrap();
        assert_eq!(sub.field_name, "assets");
        assert_eq!(sub.service_id, "EmployeeAssetsService");
        assert!(meta.has_sub_resource("assets"));

        let err = meta.sub_resource("payslips").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn store_resolves_by_class_and_name() {
        let mut builder = ResourceMetadataStore::builder();
        builder.register(employee()).unwrap();
        let store = builder.build();

        let by_name = store.metadata_by_name("employee").unwrap();
        let by_class = store.metadata_for("Company::Employee").unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_class));
        assert_eq!(store.resource_names(), vec!["employee"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_rejects_unknown_lookups() {
        let store = ResourceMetadataStore::builder().build();
        assert!(store.is_empty());
        assert_eq!(
            store.metadata_by_name("ghost").unwrap_err(),
            MetadataError::ResourceNotFound {
                name: "ghost".to_string()
            }
        );
        assert!(matches!(
            store.metadata_for("Ghost"),
            Err(MetadataError::ClassNotFound { .. })
        ));
    }

    #[test]
    fn builder_rejects_duplicate_names_and_classes() {
        let mut builder = ResourceMetadataStore::builder();
        builder.register(employee()).unwrap();

        let clash = ResourceMetadata::new("Hr::Employee");
        assert!(matches!(
            builder.register(clash),
            Err(MetadataError::DuplicateName { existing, .. }) if existing == "Company::Employee"
        ));

        let same_class = ResourceMetadata::new("Company::Employee").with_name("staff");
        assert!(matches!(
            builder.register(same_class),
            Err(MetadataError::DuplicateClass { .. })
        ));
    }

    proptest! {
        #[test]
        fn every_registered_name_resolves(
            names in proptest::collection::hash_set("[a-z][a-z0-9_]{0,12}", 1..16)
        ) {
            let mut builder = ResourceMetadataStore::builder();
            for name in &names {
                let resource =
                    ResourceMetadata::new(format!("Model::{name}")).with_name(name.clone());
                builder.register(resource).unwrap();
            }
            let store = builder.build();
            for name in &names {
                let meta = store.metadata_by_name(name).unwrap();
                prop_assert_eq!(meta.name(), name.as_str());
            }
            prop_assert!(store.metadata_by_name("-unregistered-").is_err());
        }
    }
}
