//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the runtime and its check runs.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: check runners (state changes, pushes), `Runtime` (shutdown).
//! - **Consumers**: receivers from [`Runtime::subscribe`](crate::Runtime::subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
