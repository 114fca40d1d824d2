//! Rested Server: resource dispatch, service management and the verb
//! listener registry.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod rest_manager;
pub mod service;
pub mod telemetry;

pub use config::{LogFormat, RestConfig, TelemetryConfig};
pub use dispatch::{Dispatcher, Request};
pub use error::{RestError, ServiceError};
pub use events::{EventManager, EventName, Listener, RequestEvent};
pub use rest_manager::{Response, RestManager};
pub use service::{ContextId, Service, ServiceContext, ServiceFactories, ServiceKey, ServiceManager};
