//! Per-method execution gate.
//!
//! A [`MethodGate`] wraps one opened method and makes sure only one run of
//! it is in flight at a time. Callers obtain a [`MethodTurn`] with
//! [`MethodGate::wait_for_turn`]; waiters are served in arrival order
//! because the turn is a `tokio::sync::Mutex`, which is fair.
//!
//! Parameter writes, the run itself and reading results all go through the
//! turn, so one request's parameters cannot leak into another's run. The
//! turn is released when the [`MethodTurn`] is dropped, including on error
//! paths.
//!
//! The gate opens the method's resident execution context on creation and
//! holds it until the gate is closed or dropped, so values persist between
//! runs.
//!
//! # Run timeouts
//!
//! With a run timeout configured, a run that does not complete in time
//! fails with [`GateError::Timeout`]. Its completion is parked on the gate
//! and the next turn first waits (again bounded by the timeout) for that
//! run to finish, failing with [`GateError::RunStillActive`] if it has not.
//! Runs of one method therefore never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use vigate_common::{GateError, Result};

use crate::runtime::{DataSpace, MethodHandle, RunCompletion};

enum Settled {
    Finished(Result<()>),
    Pending(RunCompletion),
}

/// Serializes runs of one method.
pub struct MethodGate {
    method: Arc<dyn MethodHandle>,
    resident: DataSpace,
    turn: Mutex<Option<RunCompletion>>,
    run_timeout: Option<Duration>,
    released: AtomicBool,
}

impl MethodGate {
    /// Wraps `method`, opening its resident context immediately.
    pub fn open(method: Arc<dyn MethodHandle>, run_timeout: Option<Duration>) -> Result<Self> {
        let resident = method.open_resident()?;
        tracing::debug!(method = method.name(), "Method gate opened");
        Ok(Self {
            method,
            resident,
            turn: Mutex::new(None),
            run_timeout,
            released: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        self.method.name()
    }

    /// Waits until every earlier caller has released its turn.
    pub async fn wait_for_turn(&self) -> MethodTurn<'_> {
        MethodTurn {
            gate: self,
            parked: self.turn.lock().await,
        }
    }

    /// Releases the resident context. Later calls do nothing.
    pub fn close(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.method.release_resident(&self.resident);
            tracing::debug!(method = self.name(), "Method gate closed");
        }
    }

    async fn settle(&self, mut completion: RunCompletion) -> Settled {
        let outcome = match self.run_timeout {
            None => completion.await,
            Some(limit) => match tokio::time::timeout(limit, &mut completion).await {
                Ok(outcome) => outcome,
                Err(_) => return Settled::Pending(completion),
            },
        };
        Settled::Finished(outcome.unwrap_or_else(|_| {
            Err(GateError::Engine(format!(
                "{} ended without signalling completion",
                self.name()
            )))
        }))
    }

    fn timeout_ms(&self) -> u64 {
        self.run_timeout
            .map(|limit| u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}

impl Drop for MethodGate {
    fn drop(&mut self) {
        self.close();
    }
}

/// Exclusive access to a [`MethodGate`] for one request.
pub struct MethodTurn<'a> {
    gate: &'a MethodGate,
    parked: MutexGuard<'a, Option<RunCompletion>>,
}

impl MethodTurn<'_> {
    /// The method's resident execution context.
    pub fn data(&self) -> &DataSpace {
        &self.gate.resident
    }

    /// Waits for a run left behind by an earlier timeout.
    ///
    /// Must be called before writing parameters, since a still-running
    /// previous run reads the same execution context.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::RunStillActive`] if the previous run has not
    /// finished within the run timeout. It stays parked on the gate.
    pub async fn settle_previous(&mut self) -> Result<()> {
        let Some(previous) = self.parked.take() else {
            return Ok(());
        };
        match self.gate.settle(previous).await {
            Settled::Finished(outcome) => {
                if let Err(e) = outcome {
                    tracing::warn!(method = self.gate.name(), error = %e, "Timed-out run finished with error");
                }
                Ok(())
            }
            Settled::Pending(previous) => {
                *self.parked = Some(previous);
                Err(GateError::RunStillActive(self.gate.name().to_string()))
            }
        }
    }

    /// Runs the method and waits for the top-level run to end.
    pub async fn run(&mut self) -> Result<()> {
        self.settle_previous().await?;

        let completion = self.gate.method.start(&self.gate.resident)?;
        match self.gate.settle(completion).await {
            Settled::Finished(outcome) => outcome?,
            Settled::Pending(completion) => {
                *self.parked = Some(completion);
                tracing::warn!(method = self.gate.name(), "Run timed out");
                return Err(GateError::Timeout(self.gate.timeout_ms()));
            }
        }

        self.gate.method.synchronize(&self.gate.resident);
        Ok(())
    }
}
