//! Global tracing subscriber setup.
//!
//! Dispatch, service loading and the data mapper all log through `tracing`;
//! nothing is printed unless the embedding application calls [`initialise`]
//! or installs a subscriber of its own.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, TelemetryConfig};

/// Environment variable that overrides [`TelemetryConfig::log_filter`].
pub const LOG_FILTER_ENV: &str = "RESTED_LOG";

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Proof that the global subscriber is in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{directive}': {message}")]
    Filter { directive: String, message: String },
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Installs the global subscriber described by `config`.
///
/// Only the first successful call installs anything; later calls return a
/// handle and ignore their configuration.
///
/// # Errors
///
/// Returns `TelemetryError::Filter` for an unparsable filter directive and
/// `TelemetryError::Subscriber` when a subscriber was installed by someone
/// else.
pub fn initialise(config: &TelemetryConfig) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| {
            let directive = std::env::var(LOG_FILTER_ENV).ok();
            let subscriber = build_subscriber(config, directive.as_deref())?;
            tracing::subscriber::set_global_default(subscriber)
                .map_err(TelemetryError::Subscriber)
        })
        .map(|_| TelemetryHandle)
}

/// Parses the effective filter: `directive` when given, otherwise the
/// configured one.
fn resolve_filter(
    config: &TelemetryConfig,
    directive: Option<&str>,
) -> Result<EnvFilter, TelemetryError> {
    let directive = directive.unwrap_or(&config.log_filter);
    EnvFilter::try_new(directive).map_err(|err| TelemetryError::Filter {
        directive: directive.to_string(),
        message: err.to_string(),
    })
}

fn build_subscriber(
    config: &TelemetryConfig,
    directive: Option<&str>,
) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let filter = resolve_filter(config, directive)?;
    let ansi = io::stderr().is_terminal();

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format {
        LogFormat::Json => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_ansi(false)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .finish(),
        ),
        LogFormat::Compact => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_ansi(ansi)
                .with_target(true)
                .compact()
                .finish(),
        ),
    };
    Ok(subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(filter: &str, format: LogFormat) -> TelemetryConfig {
        TelemetryConfig {
            log_filter: filter.to_string(),
            log_format: format,
        }
    }

    #[test]
    fn invalid_filter_is_reported() {
        let err = resolve_filter(&config("rested=notalevel[", LogFormat::Compact), None)
            .unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Filter { ref directive, .. } if directive == "rested=notalevel["
        ));
    }

    #[test]
    fn override_directive_wins() {
        let cfg = config("rested=notalevel[", LogFormat::Json);
        assert!(resolve_filter(&cfg, Some("debug")).is_ok());
        let bad_override = resolve_filter(&config("info", LogFormat::Json), Some("x=notalevel["));
        assert!(bad_override.is_err());
    }

    #[test]
    fn builds_both_formats() {
        assert!(build_subscriber(&config("info", LogFormat::Json), None).is_ok());
        let compact = config("info,rested_server=debug", LogFormat::Compact);
        assert!(build_subscriber(&compact, None).is_ok());
    }

    #[test]
    fn initialise_is_idempotent() {
        let cfg = TelemetryConfig::default();
        let first = initialise(&cfg);
        let second = initialise(&cfg);
        assert_eq!(first.is_ok(), second.is_ok());
    }
}
