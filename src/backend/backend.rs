//! # Execution backend contract.
//!
//! A [`Backend`] launches the container of a check and hands back a
//! [`RunHandle`] that resolves exactly once with the [`RunResult`].
//!
//! ```text
//! Backend::run(ctx, params)
//!     ├─ Err(BackendError)  → the run never started
//!     └─ Ok(RunHandle)      → container started
//!            └─ .await      → RunResult { output, result }   (exactly once)
//! ```
//!
//! Cancelling `ctx` must stop the container; the handle then resolves with
//! [`BackendError::Canceled`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;

/// Everything a backend needs to launch the container of a check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunParams {
    /// Unique id of the run.
    pub check_id: String,
    /// Checktype name.
    pub checktype_name: String,
    /// Checktype version (image tag).
    pub checktype_version: String,
    /// Container image reference.
    pub image: String,
    /// Scan target.
    pub target: String,
    /// Asset type of the target.
    pub asset_type: String,
    /// Check options (JSON text).
    pub options: String,
    /// Environment variables the check requires from the host.
    pub required_vars: Vec<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
    /// URL of the push endpoint the container reports to.
    pub push_address: String,
}

/// Terminal outcome of one container run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Captured output, kept for diagnostics even on failure.
    pub output: Vec<u8>,
    /// Run outcome.
    pub result: Result<(), BackendError>,
}

impl RunResult {
    /// Successful run.
    pub fn ok(output: Vec<u8>) -> Self {
        Self {
            output,
            result: Ok(()),
        }
    }

    /// Failed run without output.
    pub fn failed(err: BackendError) -> Self {
        Self {
            output: Vec::new(),
            result: Err(err),
        }
    }
}

/// Receiving end of a run's single [`RunResult`].
///
/// Resolves with a failed result if the backend drops its sender.
#[derive(Debug)]
pub struct RunHandle {
    rx: oneshot::Receiver<RunResult>,
}

impl RunHandle {
    /// Creates a connected sender/handle pair.
    pub fn channel() -> (oneshot::Sender<RunResult>, RunHandle) {
        let (tx, rx) = oneshot::channel();
        (tx, RunHandle { rx })
    }
}

impl Future for RunHandle {
    type Output = RunResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| {
                RunResult::failed(BackendError::run("backend dropped the run result"))
            })
        })
    }
}

/// # Container execution engine.
///
/// Implementations launch the container for `params` and return as soon as it
/// started. They must honour `ctx`: on cancellation the container is stopped
/// and the handle resolves with [`BackendError::Canceled`].
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Returns a stable, human-readable backend name.
    fn name(&self) -> &str;

    /// Launches the check described by `params`.
    async fn run(
        &self,
        ctx: CancellationToken,
        params: RunParams,
    ) -> Result<RunHandle, BackendError>;
}

/// Shared handle to a backend.
pub type BackendRef = Arc<dyn Backend>;
