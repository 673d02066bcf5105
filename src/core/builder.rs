use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::runner::RunContext;
use super::runtime::{Inner, Runtime};
use crate::backend::BackendRef;
use crate::config::Config;
use crate::events::Bus;
use crate::push::PushRegistry;

/// Builder for a [`Runtime`] whose push server is managed by the caller.
///
/// Use [`Runtime::start`] to get a runtime with its own push server.
pub struct RuntimeBuilder {
    cfg: Config,
    backend: BackendRef,
    registry: Option<Arc<PushRegistry>>,
    push_address: Option<String>,
    push_token: Option<CancellationToken>,
}

impl RuntimeBuilder {
    /// Creates a builder for `backend` with the given configuration.
    pub fn new(cfg: Config, backend: BackendRef) -> Self {
        Self {
            cfg,
            backend,
            registry: None,
            push_address: None,
            push_token: None,
        }
    }

    /// Shares an existing push registry (e.g. one served by a router you own).
    ///
    /// Defaults to a fresh registry built from `Config::push`.
    pub fn with_registry(mut self, registry: Arc<PushRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the URL checks push their status to.
    ///
    /// Defaults to `Config::push.address`, then to `http://{Config::push.listen}`.
    pub fn with_push_address(mut self, address: impl Into<String>) -> Self {
        self.push_address = Some(address.into());
        self
    }

    /// Token cancelled at the end of [`Runtime::shutdown`], to stop a push server.
    pub fn with_push_token(mut self, token: CancellationToken) -> Self {
        self.push_token = Some(token);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> Runtime {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(PushRegistry::from_config(&self.cfg.push)));
        let push_address = self
            .push_address
            .or_else(|| self.cfg.push.address.clone())
            .unwrap_or_else(|| format!("http://{}", self.cfg.push.listen));

        let ctx = RunContext {
            backend: self.backend,
            registry,
            bus: Bus::new(self.cfg.bus_capacity_clamped()),
            push_address,
            default_timeout: self.cfg.default_timeout(),
            backend_grace: self.cfg.backend_grace,
            runtime_token: CancellationToken::new(),
        };
        Runtime::from_inner(Inner {
            ctx,
            grace: self.cfg.grace,
            tracker: TaskTracker::new(),
            running: DashMap::new(),
            push_token: self.push_token.unwrap_or_else(CancellationToken::new),
        })
    }
}
