//! Lifecycle states and the lattice that orders them.
//!
//! - [`State`] is the validated vocabulary of a check run.
//! - [`Lattice`] groups states into ordered stages and answers
//!   "is this update a regression?" queries.

mod lattice;
mod state;

pub use lattice::{CHECK_STATES, Lattice};
pub use state::{State, validate};
