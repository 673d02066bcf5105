//! # checkvisor
//!
//! **Checkvisor** runs containerized security checks and tracks each of them
//! through a lattice-ordered lifecycle.
//!
//! A check's progress has two independent sources: the result of the
//! container run reported by an execution [`Backend`], and status updates the
//! container pushes over HTTP while it runs. The runtime merges both under a
//! single timeout/cancellation policy and never lets a run move backwards.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller ── Runtime::submit(Check) ──► CheckHandle ──► CheckOutcome
//!                     │
//! ┌───────────────────▼───────────────────────────────────────────────┐
//! │  Runtime                                                          │
//! │  - TaskTracker (one runner task per check)                        │
//! │  - running map (id → abort token)                                 │
//! │  - runtime token (forced stop on shutdown)                        │
//! │  - Bus (broadcast events)                                         │
//! └──────┬──────────────────────────────┬─────────────────────────────┘
//!        ▼                              ▼
//!   ┌────────────┐  register(id)   ┌──────────────────┐   PATCH /checks/{id}
//!   │   runner   │ ──────────────► │   PushRegistry   │ ◄──── push server ◄──── container
//!   │ (CheckRun) │ ◄── StatusUpdate│ (DashMap<id,tx>) │
//!   └─────┬──────┘                 └──────────────────┘
//!         │ Backend::run(token, RunParams { push_address, .. })
//!         ▼
//!   ┌─────────────────────────┐
//!   │ Backend                 │──► RunHandle ──► RunResult (exactly once)
//!   │ (DockerCli, BackendFn)  │
//!   └─────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! CREATED ──► INIT ──► RUNNING ──► TIMEOUT | ABORTED | KILLED | FAILED
//!                 │                FINISHED | MALFORMED | INCONCLUSIVE
//!                 └──────────────► (terminal states are reachable from INIT too)
//!
//! runner loop {
//!   ├─ abort token      → ABORTED
//!   ├─ runtime token    → KILLED
//!   ├─ deadline         → TIMEOUT
//!   ├─ push             → advance if strictly later, refresh fields if equal,
//!   │                     discard regressions, MALFORMED on unknown status
//!   ├─ launch           → RUNNING (Err → FAILED)
//!   └─ backend result   → FINISHED (Err → by which scope fired, else FAILED)
//! }
//! on terminal: deregister, drain stream, cancel backend, salvage output (≤ backend_grace)
//! ```
//!
//! ## Features
//! | Area              | Description                                                | Key types / traits                          |
//! |-------------------|------------------------------------------------------------|---------------------------------------------|
//! | **Lifecycle**     | Validated states and the stage lattice ordering them.      | [`State`], [`Lattice`], [`CHECK_STATES`]    |
//! | **Push bridge**   | HTTP endpoint and per-check streams for status pushes.     | [`PushRegistry`], [`push::start`]           |
//! | **Backends**      | Pluggable container execution.                             | [`Backend`], [`BackendFn`], [`DockerCli`]   |
//! | **Orchestration** | Run checks, abort them, shut down gracefully.              | [`Runtime`], [`Check`], [`CheckOutcome`]    |
//! | **Checktypes**    | Manifest and image reference parsing for check defaults.   | [`Checktype`], [`checktype::ImageRef`]      |
//! | **Events**        | Observe state changes and shutdown progress.               | [`Event`], [`EventKind`]                    |
//! | **Errors**        | Typed errors per concern.                                  | [`PushError`], [`BackendError`], [`RuntimeError`] |
//! | **Configuration** | Centralized settings, loadable from TOML.                  | [`Config`], [`PushConfig`]                  |
//!
//! ## Optional features
//! - `docker` _(default)_: the [`DockerCli`] backend and image label source.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use checkvisor::{BackendError, BackendFn, BackendRef, Check, Config, RunParams, Runtime, State};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend: BackendRef = BackendFn::arc("sleeper", |ctx: CancellationToken, _p: RunParams| async move {
//!         tokio::select! {
//!             _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(Vec::new()),
//!             _ = ctx.cancelled() => Err(BackendError::Canceled),
//!         }
//!     });
//!
//!     let mut cfg = Config::default();
//!     cfg.push.listen = "127.0.0.1:0".into();
//!     let (runtime, push) = Runtime::start(cfg, backend).await?;
//!
//!     let check = Check::new("acme/slow-scan:1", "example.com").with_timeout(Duration::from_millis(50));
//!     let outcome = runtime.run(check).await?;
//!     assert_eq!(outcome.state, State::Timeout);
//!
//!     runtime.shutdown().await?;
//!     push.stopped().await?;
//!     Ok(())
//! }
//! ```
mod backend;
mod config;
mod core;
mod error;
mod events;
mod states;

pub mod checktype;
pub mod push;

// ---- Public re-exports ----

pub use backend::{Backend, BackendFn, BackendRef, RunHandle, RunParams, RunResult};
pub use checktype::{Checktype, LabelSource};
pub use config::{Config, PushConfig};
pub use core::{Check, CheckHandle, CheckOutcome, Runtime, RuntimeBuilder};
pub use error::{BackendError, ChecktypeError, ConfigError, PushError, RuntimeError, StateError};
pub use events::{Bus, Event, EventKind};
pub use push::{PushHandle, PushRegistry, ReportedState, StatusUpdate};
pub use states::{CHECK_STATES, Lattice, State, validate};

// Docker CLI backend (default feature).
#[cfg(feature = "docker")]
pub use backend::DockerCli;
