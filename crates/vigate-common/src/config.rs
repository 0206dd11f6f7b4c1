//! Gateway configuration.
//!
//! The gateway is configured from a JSON document:
//!
//! ```json
//! {
//!   "server": { "listen": "local", "use_fixed_port": true, "port": 8080 },
//!   "endpoints": [
//!     { "component": "components/greeter.json", "method": "Greet", "url_path": "greet" }
//!   ]
//! }
//! ```
//!
//! Relative component paths are resolved against the directory holding the
//! configuration file.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};
use crate::route::MatchMode;

/// Which interfaces the listener binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenScope {
    /// Loopback only.
    #[default]
    Local,
    /// Every interface.
    Any,
}

impl ListenScope {
    pub fn ip(self) -> IpAddr {
        match self {
            ListenScope::Local => IpAddr::V4(Ipv4Addr::LOCALHOST),
            ListenScope::Any => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

/// Parameter names an endpoint reads after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConventions {
    /// Parameter whose value becomes the response body.
    pub response_parameter: String,
    /// Parameter holding the `{ success, status, message }` error triple.
    pub error_parameter: String,
}

impl Default for EndpointConventions {
    fn default() -> Self {
        Self {
            response_parameter: "Response".to_string(),
            error_parameter: "Error".to_string(),
        }
    }
}

/// Listener and execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interfaces to bind. Defaults to loopback only.
    pub listen: ListenScope,
    /// Try `port` before falling back to OS-assigned ports.
    pub use_fixed_port: bool,
    /// Preferred port, used only with `use_fixed_port`. Defaults to 8080.
    pub port: u16,
    /// Upper bound on a single run. `None` waits indefinitely.
    pub run_timeout_ms: Option<u64>,
    pub conventions: EndpointConventions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ListenScope::Local,
            use_fixed_port: false,
            port: 8080,
            run_timeout_ms: None,
            conventions: EndpointConventions::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listen(mut self, listen: ListenScope) -> Self {
        self.listen = listen;
        self
    }

    /// Prefers `port`; a free port is still chosen if it is taken.
    pub fn with_fixed_port(mut self, port: u16) -> Self {
        self.use_fixed_port = true;
        self.port = port;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// `run_timeout_ms` as a [`Duration`].
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

/// One `(component, method, url path)` registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRegistration {
    /// Component file hosting the method.
    pub component: PathBuf,
    /// Method name inside the component, matched exactly.
    pub method: String,
    /// Registration path, leading slashes optional.
    pub url_path: String,
    /// Defaults to [`MatchMode::Prefix`].
    #[serde(default)]
    pub mode: MatchMode,
}

impl EndpointRegistration {
    pub fn new(
        component: impl Into<PathBuf>,
        method: impl Into<String>,
        url_path: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            method: method.into(),
            url_path: url_path.into(),
            mode: MatchMode::Prefix,
        }
    }
}

/// Complete gateway configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Registered in file order, which is also match order.
    #[serde(default)]
    pub endpoints: Vec<EndpointRegistration>,
}

impl GatewayConfig {
    /// Reads, resolves and validates a configuration file.
    ///
    /// # Arguments
    ///
    /// * `path` - JSON file; relative component paths inside it are
    ///   resolved against its directory
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if the file cannot be read or fails
    /// [`GatewayConfig::validate`], and [`GateError::Json`] if it does not
    /// parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GateError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config: GatewayConfig = serde_json::from_str(&text)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_components(base);
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            endpoints = config.endpoints.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn resolve_components(&mut self, base: &Path) {
        for endpoint in &mut self.endpoints {
            if endpoint.component.is_relative() {
                endpoint.component = base.join(&endpoint.component);
            }
        }
    }

    /// Rejects registrations that could never be served unambiguously.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            let url = endpoint.url_path.trim_start_matches('/');
            if url.is_empty() {
                return Err(GateError::Config(format!(
                    "Endpoint for method {} has an empty url_path",
                    endpoint.method
                )));
            }
            if endpoint.method.is_empty() {
                return Err(GateError::Config(format!(
                    "Endpoint {} has an empty method name",
                    url
                )));
            }
            if !seen.insert(url.to_ascii_lowercase()) {
                return Err(GateError::Config(format!("Duplicate url_path: {}", url)));
            }
        }
        Ok(())
    }
}
