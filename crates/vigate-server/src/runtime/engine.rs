//! Seam between the gateway and the execution engine that hosts methods.
//!
//! The gateway never runs a method itself. It asks an [`ExecutionEngine`]
//! to load a component, asks the component for a method, and drives the
//! method through [`MethodHandle`]. Engines are not required to be
//! reentrant: the gateway guarantees that [`MethodHandle::start`] is never
//! called while a previous run of the same handle is still in progress.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;
use vigate_common::Result;

use super::DataSpace;

/// Resolves once the top-level run has ended, carrying its outcome.
pub type RunCompletion = oneshot::Receiver<Result<()>>;

/// Loads components from storage.
#[async_trait]
pub trait ExecutionEngine: Send + Sync + 'static {
    async fn load_component(&self, path: &Path) -> Result<Arc<dyn ComponentHandle>>;
}

/// A loaded component.
#[async_trait]
pub trait ComponentHandle: Send + Sync {
    fn path(&self) -> &Path;

    /// Opens the named method for execution.
    async fn open_method(&self, name: &str) -> Result<Arc<dyn MethodHandle>>;

    /// Releases engine resources held by the component.
    async fn close(&self) {}
}

/// One opened method.
pub trait MethodHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Opens the execution context that stays resident between runs.
    fn open_resident(&self) -> Result<DataSpace>;

    /// Releases a context obtained from [`MethodHandle::open_resident`].
    fn release_resident(&self, data: &DataSpace);

    /// Starts a run against `data`. The returned completion resolves when
    /// the top-level run ends.
    fn start(&self, data: &DataSpace) -> Result<RunCompletion>;

    /// Pushes the latest run state into `data` so results can be read.
    fn synchronize(&self, _data: &DataSpace) {}
}
