//! Runtime core: check orchestration and lifecycle.
//!
//! Public API: [`Runtime`], [`RuntimeBuilder`], [`CheckHandle`], [`Check`] and
//! [`CheckOutcome`].
//!
//! Internal modules:
//! - [`run`]: per-check lifecycle record enforcing lattice transitions;
//! - [`runner`]: merges backend, pushes and cancellation for one check;
//! - [`runtime`]: spawns runners, tracks them, handles shutdown;
//! - [`shutdown`]: OS signal handling.

mod builder;
mod check;
mod run;
mod runner;
mod runtime;
mod shutdown;

pub use builder::RuntimeBuilder;
pub use check::{Check, CheckOutcome};
pub use runtime::{CheckHandle, Runtime};
