//! # Function-backed backend (`BackendFn`)
//!
//! [`BackendFn`] wraps a closure `F: Fn(CancellationToken, RunParams) -> Fut`,
//! producing a fresh future per run and driving it on its own tokio task.
//! Useful to embed an in-process engine or to script a backend in tests.
//!
//! ## Semantics
//! - `run` returns as soon as the future is spawned (the "container" started).
//! - `Ok(output)` becomes a successful [`RunResult`]; `Err(e)` a failed one.
//! - A panic inside the future becomes [`BackendError::Panicked`].
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use checkvisor::{Backend, BackendError, BackendFn, BackendRef, RunParams};
//!
//! let sleeper: BackendRef = BackendFn::arc("sleeper", |ctx: CancellationToken, _p: RunParams| async move {
//!     tokio::select! {
//!         _ = tokio::time::sleep(Duration::from_millis(10)) => Ok(b"done".to_vec()),
//!         _ = ctx.cancelled() => Err(BackendError::Canceled),
//!     }
//! });
//! assert_eq!(sleeper.name(), "sleeper");
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::backend::{Backend, RunHandle, RunParams, RunResult};
use crate::error::BackendError;

/// Function-backed backend implementation.
#[derive(Debug)]
pub struct BackendFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> BackendFn<F> {
    /// Creates a new function-backed backend.
    ///
    /// Prefer [`BackendFn::arc`] when you immediately need a [`BackendRef`](super::BackendRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the backend and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Backend for BackendFn<F>
where
    F: Fn(CancellationToken, RunParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>, BackendError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        ctx: CancellationToken,
        params: RunParams,
    ) -> Result<RunHandle, BackendError> {
        let fut = (self.f)(ctx, params);
        let (tx, handle) = RunHandle::channel();
        tokio::spawn(async move {
            let res = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(output)) => RunResult::ok(output),
                Ok(Err(err)) => RunResult::failed(err),
                Err(panic) => RunResult::failed(BackendError::Panicked(panic_message(&*panic))),
            };
            let _ = tx.send(res);
        });
        Ok(handle)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
