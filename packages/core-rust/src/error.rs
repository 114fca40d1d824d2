//! Error types shared by the metadata stores and the data mapper.

/// Failures resolving or registering resource, service, and entity metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("resource '{name}' not found")]
    ResourceNotFound { name: String },
    #[error("no resource metadata for class '{class_name}'")]
    ClassNotFound { class_name: String },
    #[error("sub-resource '{name}' not found on resource '{resource}'")]
    SubResourceNotFound { resource: String, name: String },
    #[error("no service metadata for class '{class_name}'")]
    ServiceNotFound { class_name: String },
    #[error("no entity metadata for type '{type_name}'")]
    EntityNotFound { type_name: String },
    #[error("type '{type_name}' has no association '{association}'")]
    AssociationNotFound {
        type_name: String,
        association: String,
    },
    #[error("class '{class_name}' is already registered")]
    DuplicateClass { class_name: String },
    #[error("resource name '{name}' is already used by '{existing}'")]
    DuplicateName { name: String, existing: String },
    #[error("resource '{resource}' already declares sub-resource '{name}'")]
    DuplicateSubResource { resource: String, name: String },
}

impl MetadataError {
    /// Whether the error reports a lookup miss rather than a registration conflict.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ResourceNotFound { .. }
                | Self::ClassNotFound { .. }
                | Self::SubResourceNotFound { .. }
                | Self::ServiceNotFound { .. }
                | Self::EntityNotFound { .. }
                | Self::AssociationNotFound { .. }
        )
    }
}

/// Failures converting between wire payloads and entity graphs.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("supplied data is not a string")]
    NotText,
    #[error("maximum nesting depth of {limit} exceeded")]
    Depth { limit: usize },
    #[error("invalid or malformed JSON: {message}")]
    Truncated { message: String },
    #[error("unexpected control character found: {message}")]
    ControlCharacter { message: String },
    #[error("syntax error, malformed JSON: {message}")]
    Syntax { message: String },
    #[error("unexpected data shape: {message}")]
    DataType { message: String },
    #[error("invalid value for field '{field}': {message}")]
    InvalidValue { field: String, message: String },
    #[error("type '{type_name}' has no property '{property}'")]
    UnknownProperty { type_name: String, property: String },
    #[error("failed to load lazy reference to '{type_name}': {source}")]
    LazyLoad {
        type_name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to encode data: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl MappingError {
    /// Whether the error came from decoding malformed input.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::NotText
                | Self::Depth { .. }
                | Self::Truncated { .. }
                | Self::ControlCharacter { .. }
                | Self::Syntax { .. }
                | Self::DataType { .. }
        )
    }

    pub(crate) fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unknown_property(
        type_name: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self::UnknownProperty {
            type_name: type_name.into(),
            property: property.into(),
        }
    }
}

/// Failures encoding or decoding a negotiated content type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConverterError {
    #[error("cannot decode {content_type} payload: {message}")]
    Decode {
        content_type: String,
        message: String,
    },
    #[error("cannot encode {content_type} payload: {message}")]
    Encode {
        content_type: String,
        message: String,
    },
}
