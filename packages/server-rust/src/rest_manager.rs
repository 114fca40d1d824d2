//! Request processing: negotiate, decode, dispatch, encode.

use std::sync::Arc;

use rested_core::content::{
    ContentConverter, ContentConverters, ContentNegotiator, ExactMatchNegotiator,
};
use serde_json::json;
use tracing::warn;

use crate::config::RestConfig;
use crate::dispatch::{Dispatcher, Request};
use crate::error::RestError;

/// Encoded result of processing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: String,
    pub body: Option<String>,
}

/// Entry point tying configuration, negotiation and dispatch together.
pub struct RestManager {
    config: Arc<RestConfig>,
    dispatcher: Dispatcher,
    negotiator: Arc<dyn ContentNegotiator>,
    converters: ContentConverters,
}

impl RestManager {
    /// Uses an [`ExactMatchNegotiator`] over the configured converters and
    /// the built-in converter set. A `default_service` in `config` replaces
    /// the dispatcher's own.
    #[must_use]
    pub fn new(config: Arc<RestConfig>, mut dispatcher: Dispatcher) -> Self {
        if let Some(service) = &config.default_service {
            dispatcher = dispatcher.with_default_service(Some(service.clone()));
        }
        let negotiator = Arc::new(ExactMatchNegotiator::new(config.content_converters.clone()));
        Self {
            config,
            dispatcher,
            negotiator,
            converters: ContentConverters::with_defaults(),
        }
    }

    #[must_use]
    pub fn with_negotiator(mut self, negotiator: Arc<dyn ContentNegotiator>) -> Self {
        self.negotiator = negotiator;
        self
    }

    #[must_use]
    pub fn with_converter(
        mut self,
        id: impl Into<String>,
        converter: Arc<dyn ContentConverter>,
    ) -> Self {
        self.converters.register(id, converter);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn negotiator(&self) -> &Arc<dyn ContentNegotiator> {
        &self.negotiator
    }

    /// Processes one request.
    ///
    /// The response type is negotiated first, so an unacceptable `Accept`
    /// header fails before any service is loaded. A request payload is
    /// decoded with the converter for its content type, or the negotiated
    /// converter when it declares none.
    ///
    /// # Errors
    ///
    /// Returns `RestError::NotAcceptable` when negotiation fails,
    /// `RestError::UnsupportedMediaType` for undecodable payload types, and
    /// any dispatch or conversion error.
    pub fn process(&self, request: &Request) -> Result<Response, RestError> {
        let negotiated = self
            .negotiator
            .negotiate(request.accept(), &self.config.content_types)
            .ok_or_else(|| RestError::NotAcceptable {
                accept: request.accept().to_string(),
            })?;
        let encoder = self.converter(&negotiated.converter_id)?;

        let payload = match request.payload() {
            Some(text) => {
                let decoder = match request.content_type() {
                    Some(content_type) => {
                        let id = self.config.content_converter(content_type).ok_or_else(|| {
                            RestError::UnsupportedMediaType {
                                content_type: content_type.to_string(),
                            }
                        })?;
                        self.converter(id)?
                    }
                    None => Arc::clone(&encoder),
                };
                Some(decoder.decode(text)?)
            }
            None => None,
        };

        let data = self.dispatcher.dispatch_with_payload(request, payload)?;
        let body = data.map(|value| encoder.encode(&value)).transpose()?;
        Ok(Response {
            status: if body.is_some() { 200 } else { 204 },
            content_type: negotiated.content_type,
            body,
        })
    }

    /// Like [`process`](Self::process) but renders failures as responses
    /// with an `{"error": ...}` JSON body.
    #[must_use]
    pub fn handle(&self, request: &Request) -> Response {
        self.process(request).unwrap_or_else(|err| {
            let status = err.status_code();
            if status >= 500 {
                warn!(
                    resource = request.resource(),
                    verb = %request.verb(),
                    error = %err,
                    "request failed"
                );
            }
            Response {
                status,
                content_type: rested_core::content::APPLICATION_JSON.to_string(),
                body: Some(json!({ "error": err.to_string() }).to_string()),
            }
        })
    }

    fn converter(&self, id: &str) -> Result<Arc<dyn ContentConverter>, RestError> {
        self.converters
            .get(id)
            .ok_or_else(|| RestError::ConverterNotFound { id: id.to_string() })
    }
}

impl std::fmt::Debug for RestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestManager")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("converters", &self.converters)
            .finish_non_exhaustive()
    }
}
