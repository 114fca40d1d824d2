//! Error taxonomy at the dispatch boundary.

use rested_core::{ConverterError, MappingError, MetadataError};

/// Failures loading or wiring a service instance.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service '{class_name}' not found")]
    ServiceNotFound { class_name: String },
    #[error("data mapper '{id}' required by service '{service}' is not registered")]
    DataMapperNotFound { service: String, id: String },
    #[error("service '{service}' has no listener method '{method}'")]
    ListenerNotFound { service: String, method: String },
    #[error("failed to construct service '{class_name}': {source}")]
    Construction {
        class_name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl ServiceError {
    /// Whether the service (or metadata it depends on) could not be resolved.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ServiceNotFound { .. } => true,
            Self::Metadata(err) => err.is_not_found(),
            _ => false,
        }
    }
}

/// Errors surfaced by [`Dispatcher`](crate::dispatch::Dispatcher) and
/// [`RestManager`](crate::rest_manager::RestManager).
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Unknown resource, sub-resource or related class.
    #[error(transparent)]
    NotFound(MetadataError),
    #[error("method '{0}' is not allowed")]
    MethodNotAllowed(String),
    #[error("none of the available content types is acceptable for '{accept}'")]
    NotAcceptable { accept: String },
    #[error("unsupported request content type '{content_type}'")]
    UnsupportedMediaType { content_type: String },
    #[error("no service configured for resource '{resource}'")]
    NoService { resource: String },
    #[error("no content converter registered under '{id}'")]
    ConverterNotFound { id: String },
    #[error(transparent)]
    Metadata(MetadataError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Converter(#[from] ConverterError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// Error returned by a listener, kept verbatim.
    #[error(transparent)]
    Listener(anyhow::Error),
}

impl From<MetadataError> for RestError {
    fn from(err: MetadataError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err)
        } else {
            Self::Metadata(err)
        }
    }
}

impl RestError {
    /// HTTP-equivalent status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::NotAcceptable { .. } => 406,
            Self::UnsupportedMediaType { .. } => 415,
            Self::Mapping(err) => mapping_status(err),
            Self::Converter(ConverterError::Decode { .. }) => 400,
            Self::Service(err) if err.is_not_found() => 404,
            Self::Listener(err) => listener_status(err),
            Self::NoService { .. }
            | Self::ConverterNotFound { .. }
            | Self::Metadata(_)
            | Self::Converter(_)
            | Self::Service(_) => 500,
        }
    }

    /// Whether the error maps to a 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code() == 404
    }
}

fn mapping_status(err: &MappingError) -> u16 {
    match err {
        MappingError::Metadata(inner) if inner.is_not_found() => 404,
        MappingError::LazyLoad { .. } | MappingError::Encode(_) | MappingError::Metadata(_) => 500,
        _ => 400,
    }
}

/// Listener errors keep their own classification when they wrap a known
/// error type; anything else is a server error.
fn listener_status(err: &anyhow::Error) -> u16 {
    if let Some(rest) = err.downcast_ref::<RestError>() {
        return rest.status_code();
    }
    if let Some(mapping) = err.downcast_ref::<MappingError>() {
        return mapping_status(mapping);
    }
    if let Some(metadata) = err.downcast_ref::<MetadataError>() {
        if metadata.is_not_found() {
            return 404;
        }
    }
    500
}
