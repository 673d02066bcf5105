//! Push bridge: inbound HTTP status reports → per-check event streams.
//!
//! - [`PushRegistry`] maps check ids to the send side of each run's stream.
//! - [`start`] serves `PATCH /checks/{id}` and forwards into the registry.
//! - [`router`] exposes the same handler as an axum [`Router`](axum::Router)
//!   for embedding or testing.
//!
//! The server only ever *produces* into streams; it never reads runtime state.

mod registry;
mod server;
mod update;

pub use registry::PushRegistry;
pub use server::{PushHandle, router, start};
pub use update::{PushPayload, ReportedState, StatusUpdate};
