//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigate_common::{EndpointConventions, EndpointRegistration, Result, ServerConfig};
use vigate_server::{
    ComponentHandle, ComponentLoader, DispatchServer, ExecutionEngine, HttpEndpoint,
    TemplateEngine,
};

pub const GREETER: &str = r#"{
    "methods": {
        "Greet": {
            "parameters": {
                "Who": "nobody",
                "Error": { "success": true, "status": 0, "message": "" }
            },
            "template": "Hello, {Who}!",
            "errors": [
                { "parameter": "Who", "equals": "teapot", "status": 418, "message": "I am a teapot" }
            ]
        },
        "Add": {
            "parameters": { "A": 0, "B": 0 },
            "template": "{A}+{B}"
        },
        "SlowA": { "parameters": { "Tag": "" }, "template": "a{Tag}", "delay_ms": 300 },
        "SlowB": { "parameters": { "Tag": "" }, "template": "b{Tag}", "delay_ms": 300 }
    }
}"#;

/// Creates a temporary component file with the given content.
pub fn create_test_component(content: &str) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), content).unwrap();
    file
}

/// Template engine that counts component loads.
#[derive(Default)]
pub struct CountingEngine {
    inner: TemplateEngine,
    pub loads: AtomicUsize,
}

impl CountingEngine {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionEngine for CountingEngine {
    async fn load_component(&self, path: &Path) -> Result<Arc<dyn ComponentHandle>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent first requests overlap.
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.inner.load_component(path).await
    }
}

/// A running gateway with its engine and loader.
pub struct TestGateway {
    pub server: DispatchServer,
    pub loader: Arc<ComponentLoader>,
    pub engine: Arc<CountingEngine>,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let engine = Arc::new(CountingEngine::default());
        let loader = Arc::new(
            ComponentLoader::new(engine.clone()).with_run_timeout(config.run_timeout()),
        );
        Self {
            server: DispatchServer::new(config),
            loader,
            engine,
        }
    }

    /// Registers `method` of `component` under `url`.
    pub fn expose(&self, component: &Path, method: &str, url: &str) -> Arc<HttpEndpoint> {
        HttpEndpoint::new(
            EndpointRegistration::new(component, method, url),
            Arc::clone(&self.loader),
            EndpointConventions::default(),
        )
        .register(&self.server)
        .unwrap()
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr().unwrap()
    }

    pub fn url(&self, target: &str) -> String {
        format!("http://{}/{}", self.addr(), target.trim_start_matches('/'))
    }
}

pub async fn get(url: &str) -> reqwest::Response {
    reqwest::get(url).await.unwrap()
}
