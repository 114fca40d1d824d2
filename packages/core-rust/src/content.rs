//! Content converters and content-type negotiation.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ConverterError;

pub const APPLICATION_JSON: &str = "application/json";

/// Encodes and decodes one wire format.
pub trait ContentConverter: Send + Sync {
    /// Media type this converter produces.
    fn content_type(&self) -> &str;

    /// # Errors
    ///
    /// Returns `ConverterError::Encode` when `value` cannot be represented.
    fn encode(&self, value: &Value) -> Result<String, ConverterError>;

    /// # Errors
    ///
    /// Returns `ConverterError::Decode` for malformed input.
    fn decode(&self, text: &str) -> Result<Value, ConverterError>;
}

/// `application/json` converter. Object keys keep their input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl ContentConverter for JsonConverter {
    fn content_type(&self) -> &str {
        APPLICATION_JSON
    }

    fn encode(&self, value: &Value) -> Result<String, ConverterError> {
        serde_json::to_string(value).map_err(|err| ConverterError::Encode {
            content_type: APPLICATION_JSON.to_string(),
            message: err.to_string(),
        })
    }

    fn decode(&self, text: &str) -> Result<Value, ConverterError> {
        serde_json::from_str(text).map_err(|err| ConverterError::Decode {
            content_type: APPLICATION_JSON.to_string(),
            message: err.to_string(),
        })
    }
}

/// Converters keyed by converter id.
#[derive(Clone, Default)]
pub struct ContentConverters {
    converters: HashMap<String, Arc<dyn ContentConverter>>,
}

impl ContentConverters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `json` converter.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut converters = Self::new();
        converters.register("json", Arc::new(JsonConverter));
        converters
    }

    /// Registers `converter` under `id`, replacing any previous entry.
    pub fn register(&mut self, id: impl Into<String>, converter: Arc<dyn ContentConverter>) {
        self.converters.insert(id.into(), converter);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn ContentConverter>> {
        self.converters.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.converters.contains_key(id)
    }
}

impl std::fmt::Debug for ContentConverters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.converters.keys().collect();
        ids.sort_unstable();
        f.debug_struct("ContentConverters").field("ids", &ids).finish()
    }
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Outcome of content negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedResult {
    pub content_type: String,
    pub converter_id: String,
}

/// Chooses a response content type from an `Accept` header.
pub trait ContentNegotiator: Send + Sync {
    /// Returns `None` when nothing in `available` is acceptable.
    fn negotiate(&self, accept: &str, available: &[String]) -> Option<NegotiatedResult>;
}

/// Picks the first type in `available` that the `Accept` header allows
/// and that has a converter. Quality values only matter when zero, which
/// excludes the matching type.
#[derive(Debug, Clone, Default)]
pub struct ExactMatchNegotiator {
    converters: HashMap<String, String>,
}

impl ExactMatchNegotiator {
    /// `converters` maps content types to converter ids.
    #[must_use]
    pub fn new(converters: HashMap<String, String>) -> Self {
        Self { converters }
    }
}

impl ContentNegotiator for ExactMatchNegotiator {
    fn negotiate(&self, accept: &str, available: &[String]) -> Option<NegotiatedResult> {
        let ranges = parse_accept(accept);
        available
            .iter()
            .filter(|content_type| is_acceptable(&ranges, content_type))
            .find_map(|content_type| {
                self.converters
                    .get(content_type.as_str())
                    .map(|converter_id| NegotiatedResult {
                        content_type: content_type.clone(),
                        converter_id: converter_id.clone(),
                    })
            })
    }
}

struct MediaRange {
    kind: String,
    subtype: String,
    excluded: bool,
}

impl MediaRange {
    /// 2 for an exact match, 1 for `type/*`, 0 for `*/*`.
    fn specificity(&self, kind: &str, subtype: &str) -> Option<u8> {
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", "*") => Some(0),
            (k, "*") if k.eq_ignore_ascii_case(kind) => Some(1),
            (k, s) if k.eq_ignore_ascii_case(kind) && s.eq_ignore_ascii_case(subtype) => Some(2),
            _ => None,
        }
    }
}

fn parse_accept(accept: &str) -> Vec<MediaRange> {
    let accept = accept.trim();
    if accept.is_empty() {
        return vec![MediaRange {
            kind: "*".to_string(),
            subtype: "*".to_string(),
            excluded: false,
        }];
    }

    accept
        .split(',')
        .filter_map(|range| {
            let mut parts = range.split(';');
            let media = parts.next()?.trim();
            let (kind, subtype) = media.split_once('/')?;
            let excluded = parts.any(|param| {
                param
                    .split_once('=')
                    .is_some_and(|(name, value)| {
                        name.trim().eq_ignore_ascii_case("q")
                            && value.trim().parse::<f32>().is_ok_and(|q| q <= 0.0)
                    })
            });
            Some(MediaRange {
                kind: kind.trim().to_string(),
                subtype: subtype.trim().to_string(),
                excluded,
            })
        })
        .collect()
}

/// Strips parameters from a `Content-Type` value:
/// `application/json; charset=utf-8` becomes `application/json`.
#[must_use]
pub fn media_type_essence(content_type: &str) -> &str {
    content_type
        .split_once(';')
        .map_or(content_type, |(essence, _)| essence)
        .trim()
}

fn is_acceptable(ranges: &[MediaRange], content_type: &str) -> bool {
    let Some((kind, subtype)) = content_type.split_once('/') else {
        return false;
    };
    ranges
        .iter()
        .filter_map(|range| range.specificity(kind, subtype).map(|s| (s, range)))
        .max_by_key(|(specificity, _)| *specificity)
        .is_some_and(|(_, range)| !range.excluded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODED: &str = r#"{"one":"1","two":"2","three":"3"}"#;

    fn negotiator() -> ExactMatchNegotiator {
        let mut converters = HashMap::new();
        converters.insert(APPLICATION_JSON.to_string(), "json".to_string());
        converters.insert("text/csv".to_string(), "csv".to_string());
        ExactMatchNegotiator::new(converters)
    }

    fn available(types: &[&str]) -> Vec<String> {
        types.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn json_converter_round_trips_in_order() {
        let decoded = JsonConverter.decode(ENCODED).unwrap();
        assert_eq!(decoded, serde_json::json!({"one": "1", "two": "2", "three": "3"}));
        assert_eq!(JsonConverter.encode(&decoded).unwrap(), ENCODED);
    }

    #[test]
    fn json_converter_rejects_invalid_input() {
        let err = JsonConverter.decode("{not valid JSON").unwrap_err();
        assert!(matches!(
            err,
            ConverterError::Decode { content_type, .. } if content_type == APPLICATION_JSON
        ));
    }

    #[test]
    fn default_registry_has_json() {
        let converters = ContentConverters::with_defaults();
        assert!(converters.contains("json"));
        assert_eq!(converters.get("json").unwrap().content_type(), APPLICATION_JSON);
        assert!(converters.get("xml").is_none());
    }

    #[test]
    fn negotiates_exact_and_wildcard_types() {
        let n = negotiator();
        let types = available(&["application/json", "text/csv"]);

        let exact = n.negotiate("text/csv", &types).unwrap();
        assert_eq!(exact.content_type, "text/csv");
        assert_eq!(exact.converter_id, "csv");

        assert_eq!(n.negotiate("*/*", &types).unwrap().content_type, APPLICATION_JSON);
        assert_eq!(n.negotiate("text/*", &types).unwrap().content_type, "text/csv");
        assert_eq!(n.negotiate("", &types).unwrap().content_type, APPLICATION_JSON);
        assert_eq!(
            n.negotiate("text/html, application/json;q=0.8", &types).unwrap().content_type,
            APPLICATION_JSON
        );
    }

    #[test]
    fn zero_quality_excludes_type() {
        let n = negotiator();
        let types = available(&["application/json", "text/csv"]);
        let result = n.negotiate("application/json;q=0, */*", &types).unwrap();
        assert_eq!(result.content_type, "text/csv");
        assert!(n.negotiate("*/*;q=0", &types).is_none());
    }

    #[test]
    fn nothing_acceptable() {
        let n = negotiator();
        assert!(n.negotiate("text/html", &available(&["application/json"])).is_none());
        // Acceptable but without a converter.
        assert!(n.negotiate("*/*", &available(&["application/xml"])).is_none());
    }

    #[test]
    fn essence_drops_parameters() {
        assert_eq!(media_type_essence("application/json; charset=utf-8"), "application/json");
        assert_eq!(media_type_essence(" text/csv "), "text/csv");
        assert_eq!(media_type_essence("Application/JSON;q=1;x=y"), "Application/JSON");
    }
}
