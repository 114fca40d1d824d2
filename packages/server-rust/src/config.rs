//! REST layer configuration.

use std::collections::HashMap;
use std::sync::Arc;

use rested_core::content::{media_type_essence, APPLICATION_JSON};
use rested_core::{JsonMapper, MapperConfig, MetadataProvider};
use serde::{Deserialize, Serialize};

/// Supported log output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Structured JSON for log pipelines.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `"info,rested_server=debug"`. The
    /// `RESTED_LOG` environment variable takes precedence when set.
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("content type '{content_type}' has no converter")]
    MissingConverter { content_type: String },
    #[error("at least one content type must be configured")]
    NoContentTypes,
}

/// Configuration of the REST layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// Content types offered to clients, in order of preference.
    pub content_types: Vec<String>,
    /// Content type to converter id.
    pub content_converters: HashMap<String, String>,
    /// Service used by resources that do not name one.
    pub default_service: Option<String>,
    /// Locations a metadata driver scans for resource definitions.
    pub resource_paths: Vec<String>,
    pub mapper: MapperConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for RestConfig {
    fn default() -> Self {
        let mut content_converters = HashMap::new();
        content_converters.insert(APPLICATION_JSON.to_string(), "json".to_string());
        Self {
            content_types: vec![APPLICATION_JSON.to_string()],
            content_converters,
            default_service: None,
            resource_paths: Vec::new(),
            mapper: MapperConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl RestConfig {
    /// Parses a JSON configuration document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed documents, or any error
    /// reported by [`validate`](Self::validate).
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every offered content type can be encoded.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NoContentTypes` or `ConfigError::MissingConverter`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content_types.is_empty() {
            return Err(ConfigError::NoContentTypes);
        }
        if let Some(missing) = self
            .content_types
            .iter()
            .find(|ct| !self.content_converters.contains_key(ct.as_str()))
        {
            return Err(ConfigError::MissingConverter {
                content_type: missing.clone(),
            });
        }
        Ok(())
    }

    /// Converter id for `content_type`, if one is configured. Media-type
    /// parameters are ignored and the type compares case-insensitively.
    #[must_use]
    pub fn content_converter(&self, content_type: &str) -> Option<&str> {
        let essence = media_type_essence(content_type);
        self.content_converters
            .get(essence)
            .or_else(|| {
                self.content_converters
                    .iter()
                    .find(|(configured, _)| configured.eq_ignore_ascii_case(essence))
                    .map(|(_, id)| id)
            })
            .map(String::as_str)
    }

    /// JSON data mapper configured by the `mapper` section.
    #[must_use]
    pub fn json_mapper(&self, provider: Arc<dyn MetadataProvider>) -> JsonMapper {
        JsonMapper::new(provider).with_config(self.mapper.clone())
    }

    /// Offers an additional content type backed by `converter_id`.
    pub fn add_content_type(
        &mut self,
        content_type: impl Into<String>,
        converter_id: impl Into<String>,
    ) {
        let content_type = content_type.into();
        if !self.content_types.contains(&content_type) {
            self.content_types.push(content_type.clone());
        }
        self.content_converters.insert(content_type, converter_id.into());
    }
}
