//! # Runtime events emitted by the check runners and the runtime.
//!
//! The [`EventKind`] enum classifies event types across two categories:
//! - **Check events**: lifecycle of a single check run (created, state changes, pushes, finish)
//! - **Shutdown events**: runtime-wide shutdown progress
//!
//! The [`Event`] struct carries the metadata: timestamps, check id, states and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use checkvisor::{Event, EventKind, State};
//!
//! let ev = Event::new(EventKind::StateChanged)
//!     .with_check("c7f1")
//!     .with_transition(State::Init, State::Running);
//!
//! assert_eq!(ev.kind, EventKind::StateChanged);
//! assert_eq!(ev.state, Some(State::Running));
//! assert_eq!(ev.previous, Some(State::Init));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::states::State;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Check events ===
    /// A check run was allocated and registered with the push bridge.
    ///
    /// Sets: `check`, `state` (`CREATED`)
    CheckCreated,

    /// The run moved to a later lifecycle state.
    ///
    /// Sets: `check`, `previous`, `state`, `reason` (source of the transition)
    StateChanged,

    /// A push update was applied (fields and/or state).
    ///
    /// Sets: `check`, `state` (current state after applying)
    PushApplied,

    /// A push update was discarded as a regression.
    ///
    /// Sets: `check`, `previous` (current state), `state` (reported state)
    PushDiscarded,

    /// The run reached its terminal state and was deregistered.
    ///
    /// Sets: `check`, `state`, `reason` (backend error, if any)
    CheckFinished,

    // === Shutdown events ===
    /// Runtime shutdown requested.
    ShutdownRequested,

    /// All check runs settled within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some runs did not settle in time.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Check id, if applicable.
    pub check: Option<Arc<str>>,
    /// New (or reported) state.
    pub state: Option<State>,
    /// State before the event.
    pub previous: Option<State>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            check: None,
            state: None,
            previous: None,
            reason: None,
        }
    }

    /// Attaches a check id.
    #[inline]
    pub fn with_check(mut self, id: impl Into<Arc<str>>) -> Self {
        self.check = Some(id.into());
        self
    }

    /// Attaches a state.
    #[inline]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches a `previous → state` pair.
    #[inline]
    pub fn with_transition(mut self, previous: State, state: State) -> Self {
        self.previous = Some(previous);
        self.state = Some(state);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
