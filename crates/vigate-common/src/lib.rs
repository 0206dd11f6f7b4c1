//! vigate Common Types
//!
//! Shared building blocks for the vigate HTTP gateway:
//!
//! - [`error`] - the [`GateError`] taxonomy and `Result` alias
//! - [`config`] - server settings and endpoint registrations
//! - [`route`] - registration paths and how requests match them
//! - [`query`] - query-string splitting for endpoint parameters

pub mod config;
pub mod error;
pub mod query;
pub mod route;

pub use config::{EndpointConventions, EndpointRegistration, GatewayConfig, ListenScope, ServerConfig};
pub use error::{GateError, Result};
pub use query::parse_query;
pub use route::{MatchMode, Route};
