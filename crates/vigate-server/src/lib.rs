//! vigate Server
//!
//! Serves methods hosted in managed components over HTTP GET.
//!
//! - [`http_server`] - the listener and first-match routing
//! - [`endpoint`] - binding query parameters to a method and reporting its result
//! - [`loader`] - single-flight loading of components and methods
//! - [`gate`] - per-method FIFO serialization of runs
//! - [`runtime`] - the execution engine seam and the template engine
//!
//! ```no_run
//! use std::sync::Arc;
//! use vigate_common::{EndpointConventions, EndpointRegistration, ServerConfig};
//! use vigate_server::{ComponentLoader, DispatchServer, HttpEndpoint, TemplateEngine};
//!
//! # async fn demo() -> vigate_common::Result<()> {
//! let loader = Arc::new(ComponentLoader::new(Arc::new(TemplateEngine::new())));
//! let server = DispatchServer::new(ServerConfig::default());
//!
//! HttpEndpoint::new(
//!     EndpointRegistration::new("greeter.json", "Greet", "hello"),
//!     loader,
//!     EndpointConventions::default(),
//! )
//! .register(&server)?;
//!
//! println!("listening on {:?}", server.local_addr());
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod gate;
pub mod handler;
pub mod http_server;
pub mod loader;
pub mod runtime;
pub mod serializer;

pub use endpoint::HttpEndpoint;
pub use gate::{MethodGate, MethodTurn};
pub use handler::{HandlerResponse, IncomingRequest, RequestHandler};
pub use http_server::DispatchServer;
pub use loader::{ComponentLoader, LoadedComponent};
pub use runtime::{
    ComponentHandle, DataSpace, ExecutionEngine, MethodHandle, RunCompletion, TemplateEngine,
};
pub use serializer::{PlainTextSerializer, ValueSerializer};
