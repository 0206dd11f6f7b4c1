//! Request handler abstraction used by the dispatch server.
//!
//! A [`RequestHandler`] owns a [`Route`] and produces a [`HandlerResponse`]
//! for requests whose path the route matches. The server tries handlers in
//! registration order and the first match wins.

use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, Response, StatusCode};
use vigate_common::{Result, Route};

/// Response type written back to hyper.
pub type HyperResponse = Response<Full<Bytes>>;

/// A request as seen by handlers.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// URL-decoded path and query with leading slashes removed.
    pub target: String,
    pub headers: HeaderMap,
}

impl IncomingRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            headers: HeaderMap::new(),
        }
    }
}

/// Status, optional reason phrase and body of a handled request.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    status: StatusCode,
    description: Option<String>,
    content_type: Option<&'static str>,
    body: Bytes,
}

impl HandlerResponse {
    /// An empty response with `status`.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            description: None,
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// `200 OK` with a `text/plain` body.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            description: None,
            content_type: Some("text/plain"),
            body: Bytes::from(body.into()),
        }
    }

    /// Sets the reason phrase sent on the status line.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Builds the hyper response. `Cache-Control: no-cache` is always set.
    pub fn into_http(self) -> HyperResponse {
        let Self {
            status,
            description,
            content_type,
            body,
        } = self;
        let length = body.len();

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }

        if let Some(reason) = description.as_deref().and_then(reason_phrase) {
            response.extensions_mut().insert(reason);
        }
        response
    }
}

/// Keeps the characters allowed in an HTTP/1.1 reason phrase.
fn reason_phrase(description: &str) -> Option<ReasonPhrase> {
    let cleaned: String = description
        .chars()
        .filter(|c| *c == '\t' || (' '..='~').contains(c))
        .collect();
    if cleaned.trim().is_empty() {
        return None;
    }
    ReasonPhrase::try_from(cleaned).ok()
}

/// A route plus the processing for requests it matches.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    fn route(&self) -> &Route;

    fn matches(&self, path: &str) -> bool {
        self.route().matches(path)
    }

    /// Produces the response. Errors become `500 Internal Server Error`.
    async fn process(&self, request: &IncomingRequest) -> Result<HandlerResponse>;
}
