//! # Runtime: runs checks concurrently and coordinates shutdown.
//!
//! The [`Runtime`] owns the event bus, the push registry, the backend and the
//! runtime cancellation token. Every submitted check runs on its own tokio
//! task, tracked by a [`TaskTracker`].
//!
//! ## Architecture
//! ```text
//! Runtime::submit(check)
//!     ├─ id = uuid v4, abort token
//!     ├─ running[id] = abort token
//!     └─ tracker.spawn(run_check(ctx, id, check, abort)) ──► CheckHandle
//!
//! PATCH /checks/{id} ──► push server ──► PushRegistry ──► runner(id)
//! runner(id) ──► Bus ──► Runtime::subscribe() receivers
//!
//! Shutdown path:
//!   Runtime::shutdown()
//!       └─► Bus.publish(ShutdownRequested)
//!       └─► runtime_token.cancel()       → every run settles in KILLED
//!       └─► wait tracker (≤ Config::grace):
//!              ├─ all settled → Bus.publish(AllStoppedWithin)
//!              └─ exceeded    → Bus.publish(GraceExceeded), RuntimeError::GraceExceeded { stuck }
//!       └─► push_token.cancel()          → push server drains and stops
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use checkvisor::{BackendError, BackendFn, BackendRef, Check, Config, RunParams, Runtime, State};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend: BackendRef = BackendFn::arc("inline", |_ctx: CancellationToken, p: RunParams| async move {
//!         Ok::<_, BackendError>(format!("scanned {}", p.target).into_bytes())
//!     });
//!
//!     let mut cfg = Config::default();
//!     cfg.push.listen = "127.0.0.1:0".into();
//!     let (runtime, push) = Runtime::start(cfg, backend).await?;
//!
//!     let outcome = runtime.run(Check::new("acme/scanner:1", "example.com")).await?;
//!     assert_eq!(outcome.state, State::Finished);
//!     assert_eq!(outcome.output, b"scanned example.com");
//!
//!     runtime.shutdown().await?;
//!     push.stopped().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use uuid::Uuid;

use super::builder::RuntimeBuilder;
use super::check::{Check, CheckOutcome};
use super::runner::{RunContext, run_check};
use super::shutdown;
use crate::backend::BackendRef;
use crate::config::Config;
use crate::error::{PushError, RuntimeError};
use crate::events::{Event, EventKind};
use crate::push::{self, PushHandle, PushRegistry};

pub(crate) struct Inner {
    pub ctx: RunContext,
    pub grace: Duration,
    pub tracker: TaskTracker,
    pub running: DashMap<String, CancellationToken>,
    pub push_token: CancellationToken,
}

/// Orchestrates check runs. Cheap to clone.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

/// Removes a run from the in-flight map on drop.
struct Running<'a> {
    map: &'a DashMap<String, CancellationToken>,
    id: &'a str,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.map.remove(self.id);
    }
}

impl Runtime {
    /// Returns a builder for a runtime over `backend`.
    pub fn builder(cfg: Config, backend: BackendRef) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg, backend)
    }

    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Starts the push server on `Config::push.listen` and a runtime reporting to it.
    ///
    /// Checks are given `Config::push.address`, or the bound URL when unset.
    /// The server stops once [`Runtime::shutdown`] completes; await
    /// [`PushHandle::stopped`] to observe how.
    pub async fn start(cfg: Config, backend: BackendRef) -> Result<(Self, PushHandle), PushError> {
        let registry = Arc::new(PushRegistry::from_config(&cfg.push));
        let push_token = CancellationToken::new();
        let handle = push::start(
            Arc::clone(&registry),
            &cfg.push.listen,
            cfg.push.shutdown_grace,
            push_token.clone(),
        )
        .await?;
        let address = cfg.push.address.clone().unwrap_or_else(|| handle.url());
        let runtime = RuntimeBuilder::new(cfg, backend)
            .with_registry(registry)
            .with_push_address(address)
            .with_push_token(push_token)
            .build();
        Ok((runtime, handle))
    }

    /// Starts running `check` and returns immediately.
    pub fn submit(&self, check: Check) -> CheckHandle {
        let id = Uuid::new_v4().to_string();
        let abort = CancellationToken::new();
        self.inner.running.insert(id.clone(), abort.clone());

        let inner = Arc::clone(&self.inner);
        let run_id = id.clone();
        let run_abort = abort.clone();
        let join = self.inner.tracker.spawn(async move {
            let _running = Running {
                map: &inner.running,
                id: &run_id,
            };
            run_check(&inner.ctx, run_id.clone(), check, run_abort).await
        });
        CheckHandle { id, abort, join }
    }

    /// Runs `check` to completion.
    pub async fn run(&self, check: Check) -> Result<CheckOutcome, RuntimeError> {
        self.submit(check).outcome().await
    }

    /// Aborts the run `id`. Returns `false` if it is not in flight.
    pub fn abort(&self, id: &str) -> bool {
        match self.inner.running.get(id) {
            Some(entry) => {
                entry.value().cancel();
                true
            }
            None => false,
        }
    }

    /// Sorted ids of the runs in flight.
    pub fn running(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .running
            .iter()
            .map(|e| e.key().clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Returns `true` while `id` is accepting status pushes.
    ///
    /// Registrations are only ever removed by the run that owns them.
    pub fn is_registered(&self, id: &str) -> bool {
        self.inner.ctx.registry.contains(id)
    }

    /// URL passed to checks for status pushes.
    pub fn push_address(&self) -> &str {
        &self.inner.ctx.push_address
    }

    /// Subscribes to runtime events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.ctx.bus.subscribe()
    }

    /// Cancels every run and waits up to `Config::grace` for them to settle.
    ///
    /// Runs submitted afterwards settle in `KILLED` right away.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let inner = &self.inner;
        inner.ctx.bus.publish(Event::new(EventKind::ShutdownRequested));
        info!(running = inner.running.len(), "runtime shutdown requested");

        inner.tracker.close();
        inner.ctx.runtime_token.cancel();
        let res = match time::timeout(inner.grace, inner.tracker.wait()).await {
            Ok(()) => {
                inner.ctx.bus.publish(Event::new(EventKind::AllStoppedWithin));
                info!("all checks stopped within grace");
                Ok(())
            }
            Err(_elapsed) => {
                let stuck = self.running();
                inner.ctx.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
                );
                warn!(grace = ?inner.grace, stuck = ?stuck, "shutdown grace exceeded");
                Err(RuntimeError::GraceExceeded {
                    grace: inner.grace,
                    stuck,
                })
            }
        };
        inner.push_token.cancel();
        res
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then shuts down.
    pub async fn shutdown_on_signal(&self) -> Result<(), RuntimeError> {
        shutdown::wait_for_shutdown_signal().await?;
        self.shutdown().await
    }
}

/// Handle to a submitted check.
#[derive(Debug)]
pub struct CheckHandle {
    id: String,
    abort: CancellationToken,
    join: JoinHandle<CheckOutcome>,
}

impl CheckHandle {
    /// Run id; also the id checks push to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Asks the run to stop; it settles in `ABORTED` unless already terminal.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Waits for the outcome of the run.
    pub async fn outcome(self) -> Result<CheckOutcome, RuntimeError> {
        self.join.await.map_err(|err| RuntimeError::Join {
            id: self.id,
            error: err.to_string(),
        })
    }
}
