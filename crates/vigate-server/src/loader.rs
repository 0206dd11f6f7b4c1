//! Lazy, single-flight loading of components and their methods.
//!
//! [`ComponentLoader`] owns every loaded component keyed by path. A lookup
//! first checks the map without locking; on a miss it takes the loader's
//! turn, checks again, and only then asks the engine to load. Concurrent
//! first requests for the same path therefore trigger exactly one load and
//! all observe the same [`LoadedComponent`]. A failed load leaves no entry
//! behind, so the next request retries.
//!
//! [`LoadedComponent`] applies the same pattern to its methods, scoped to
//! its own turn and method map.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use vigate_common::Result;

use crate::gate::MethodGate;
use crate::runtime::{ComponentHandle, ExecutionEngine};

/// Owns the set of loaded components.
pub struct ComponentLoader {
    engine: Arc<dyn ExecutionEngine>,
    components: DashMap<PathBuf, Arc<LoadedComponent>>,
    turn: Mutex<()>,
    run_timeout: Option<Duration>,
}

impl ComponentLoader {
    /// Creates an empty loader.
    ///
    /// # Arguments
    ///
    /// * `engine` - Engine asked to load each component path once
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            engine,
            components: DashMap::new(),
            turn: Mutex::new(()),
            run_timeout: None,
        }
    }

    /// Applies `timeout` to every method gate opened from now on.
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    fn cached(&self, path: &Path) -> Option<Arc<LoadedComponent>> {
        self.components.get(path).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the component at `path`, loading it on first use.
    ///
    /// # Returns
    ///
    /// The same [`LoadedComponent`] for every caller with this `path`.
    ///
    /// # Errors
    ///
    /// Propagates the engine's load error. Nothing is cached on failure.
    pub async fn open_component(&self, path: &Path) -> Result<Arc<LoadedComponent>> {
        if let Some(component) = self.cached(path) {
            return Ok(component);
        }

        let _turn = self.turn.lock().await;
        if let Some(component) = self.cached(path) {
            return Ok(component);
        }

        tracing::debug!(component = %path.display(), "Loading component");
        let handle = self.engine.load_component(path).await?;
        let component = Arc::new(LoadedComponent::new(handle, self.run_timeout));
        self.components
            .insert(path.to_path_buf(), Arc::clone(&component));
        tracing::info!(component = %path.display(), "Component loaded");
        Ok(component)
    }

    /// Whether `path` has been loaded and not shut down since.
    pub fn is_loaded(&self, path: &Path) -> bool {
        self.components.contains_key(path)
    }

    /// Number of loaded components.
    pub fn loaded_count(&self) -> usize {
        self.components.len()
    }

    /// Closes every method gate and component.
    pub async fn shutdown(&self) {
        let _turn = self.turn.lock().await;
        let components: Vec<Arc<LoadedComponent>> = self
            .components
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.components.clear();

        for component in components {
            component.close().await;
        }
        tracing::info!("Component loader shut down");
    }
}

/// A loaded component and the gates of its opened methods.
pub struct LoadedComponent {
    handle: Arc<dyn ComponentHandle>,
    methods: DashMap<String, Arc<MethodGate>>,
    turn: Mutex<()>,
    run_timeout: Option<Duration>,
}

impl LoadedComponent {
    fn new(handle: Arc<dyn ComponentHandle>, run_timeout: Option<Duration>) -> Self {
        Self {
            handle,
            methods: DashMap::new(),
            turn: Mutex::new(()),
            run_timeout,
        }
    }

    /// Path the component was loaded from.
    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    fn cached(&self, name: &str) -> Option<Arc<MethodGate>> {
        self.methods.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the gate for `name`, opening the method on first use.
    pub async fn open_method(&self, name: &str) -> Result<Arc<MethodGate>> {
        if let Some(gate) = self.cached(name) {
            return Ok(gate);
        }

        let _turn = self.turn.lock().await;
        if let Some(gate) = self.cached(name) {
            return Ok(gate);
        }

        let method = self.handle.open_method(name).await?;
        let gate = Arc::new(MethodGate::open(method, self.run_timeout)?);
        self.methods.insert(name.to_string(), Arc::clone(&gate));
        tracing::debug!(component = %self.path().display(), method = name, "Method opened");
        Ok(gate)
    }

    /// Number of methods opened so far.
    pub fn opened_count(&self) -> usize {
        self.methods.len()
    }

    async fn close(&self) {
        let _turn = self.turn.lock().await;
        for entry in self.methods.iter() {
            entry.value().close();
        }
        self.methods.clear();
        self.handle.close().await;
    }
}
