//! HTTP GET endpoint bound to one method of one component.
//!
//! For each request an [`HttpEndpoint`]:
//!
//! 1. splits the query string into `(key, value)` pairs
//! 2. opens the component and the method gate (loading on first use)
//! 3. takes the method's turn for the rest of the request and waits out any
//!    run left behind by an earlier timeout
//! 4. binds every pair to the declared parameter whose name matches the key
//!    case-insensitively; an unknown key answers `400 Bad Request` without
//!    touching the execution context or running the method
//! 5. runs the method
//! 6. reports an application error when the error parameter carries
//!    `{ "success": false, "status": <code>, "message": <text> }`
//! 7. otherwise serializes the response parameter as a `text/plain` body
//!
//! Any failure in steps 2-7 is logged and answered with
//! `503 Service Unavailable`.

use async_trait::async_trait;
use hyper::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use vigate_common::{
    parse_query, EndpointConventions, EndpointRegistration, GateError, Result, Route,
};

use crate::handler::{HandlerResponse, IncomingRequest, RequestHandler};
use crate::http_server::DispatchServer;
use crate::loader::ComponentLoader;
use crate::runtime::DataSpace;
use crate::serializer::{PlainTextSerializer, ValueSerializer};

pub struct HttpEndpoint {
    registration: EndpointRegistration,
    route: Route,
    loader: Arc<ComponentLoader>,
    conventions: EndpointConventions,
    serializer: Arc<dyn ValueSerializer>,
}

impl HttpEndpoint {
    pub fn new(
        registration: EndpointRegistration,
        loader: Arc<ComponentLoader>,
        conventions: EndpointConventions,
    ) -> Self {
        let route = Route::new(&registration.url_path, registration.mode);
        Self {
            registration,
            route,
            loader,
            conventions,
            serializer: Arc::new(PlainTextSerializer),
        }
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ValueSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Registers the endpoint with `server`, starting its listener if this
    /// is the first registration.
    pub fn register(self, server: &DispatchServer) -> Result<Arc<Self>> {
        let endpoint = Arc::new(self);
        server.register(endpoint.clone())?;
        tracing::info!(
            url = endpoint.route.path(),
            component = %endpoint.registration.component.display(),
            method = %endpoint.registration.method,
            "Endpoint registered"
        );
        Ok(endpoint)
    }

    /// Removes the endpoint's route from `server`.
    pub fn unregister(&self, server: &DispatchServer) -> bool {
        server.unregister(self.route.path())
    }

    pub fn registration(&self) -> &EndpointRegistration {
        &self.registration
    }

    async fn respond(&self, target: &str) -> Result<HandlerResponse> {
        let pairs = parse_query(target);

        let component = self
            .loader
            .open_component(&self.registration.component)
            .await?;
        let gate = component.open_method(&self.registration.method).await?;
        let mut turn = gate.wait_for_turn().await;
        turn.settle_previous().await?;

        let mut bindings = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match turn.data().resolve(&key) {
                Some(name) => bindings.push((name, value)),
                None => {
                    tracing::debug!(url = self.route.path(), parameter = %key, "Unknown parameter");
                    return Ok(HandlerResponse::status(StatusCode::BAD_REQUEST)
                        .with_description(format!("Unknown parameter: {}", key)));
                }
            }
        }
        for (name, value) in &bindings {
            turn.data().assign_text(name, value)?;
        }

        turn.run().await?;

        let data = turn.data();
        if let Some(response) = self.application_error(data) {
            return Ok(response);
        }

        let output = &self.conventions.response_parameter;
        let value = data
            .resolve(output)
            .and_then(|name| data.get(&name))
            .ok_or_else(|| GateError::MissingOutput(output.clone()))?;
        let body = self.serializer.serialize(&value)?;
        Ok(HandlerResponse::text(body))
    }

    /// Reads the error triple, if the method declares one and it reports
    /// failure.
    fn application_error(&self, data: &DataSpace) -> Option<HandlerResponse> {
        let name = data.resolve(&self.conventions.error_parameter)?;
        let error = data.get(&name)?;
        if error.get("success").and_then(Value::as_bool)? {
            return None;
        }

        let code = error.get("status").and_then(Value::as_u64).unwrap_or(500);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let status = u16::try_from(code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        tracing::debug!(url = self.route.path(), status = status.as_u16(), message = %message, "Application error");
        Some(HandlerResponse::status(status).with_description(message))
    }
}

#[async_trait]
impl RequestHandler for HttpEndpoint {
    fn route(&self) -> &Route {
        &self.route
    }

    async fn process(&self, request: &IncomingRequest) -> Result<HandlerResponse> {
        match self.respond(&request.target).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!(
                    url = self.route.path(),
                    method = %self.registration.method,
                    error = %e,
                    "Endpoint failed"
                );
                Ok(HandlerResponse::status(StatusCode::SERVICE_UNAVAILABLE))
            }
        }
    }
}
