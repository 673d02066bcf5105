//! Execution backends.
//!
//! - [`Backend`] is the contract the runtime drives.
//! - [`BackendFn`] runs an async closure per check (embedding, tests).
//! - [`DockerCli`] runs the check image with the `docker` CLI (feature `docker`).

mod backend;
mod backend_fn;
#[cfg(feature = "docker")]
mod docker;

pub use backend::{Backend, BackendRef, RunHandle, RunParams, RunResult};
pub use backend_fn::BackendFn;
#[cfg(feature = "docker")]
pub use docker::DockerCli;
