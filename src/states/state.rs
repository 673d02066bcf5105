//! # Lifecycle state tokens.
//!
//! [`State`] is the closed vocabulary a check run moves through. It parses
//! from (and renders to) the exact upper-case names used on the wire:
//!
//! ```text
//! CREATED  INIT  RUNNING  TIMEOUT  ABORTED  KILLED  FAILED  FINISHED  MALFORMED  INCONCLUSIVE
//! ```
//!
//! Parsing is case sensitive; anything else is rejected with
//! [`StateError::Invalid`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StateError;

/// Lifecycle state of a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Run allocated, nothing launched yet.
    Created,
    /// Backend launch in progress.
    Init,
    /// Container acknowledged as started.
    Running,
    /// The run exceeded its deadline.
    Timeout,
    /// The caller aborted the run.
    Aborted,
    /// The runtime forced the run to stop (shutdown).
    Killed,
    /// The backend failed to launch or reported an error.
    Failed,
    /// The run completed.
    Finished,
    /// The check reported a status the runtime could not validate.
    Malformed,
    /// The check explicitly reported it could not reach a verdict.
    Inconclusive,
}

impl State {
    /// Every state, in lifecycle declaration order.
    pub const ALL: [State; 10] = [
        State::Created,
        State::Init,
        State::Running,
        State::Timeout,
        State::Aborted,
        State::Killed,
        State::Failed,
        State::Finished,
        State::Malformed,
        State::Inconclusive,
    ];

    /// Returns the wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Created => "CREATED",
            State::Init => "INIT",
            State::Running => "RUNNING",
            State::Timeout => "TIMEOUT",
            State::Aborted => "ABORTED",
            State::Killed => "KILLED",
            State::Failed => "FAILED",
            State::Finished => "FINISHED",
            State::Malformed => "MALFORMED",
            State::Inconclusive => "INCONCLUSIVE",
        }
    }
}

/// Validates `text` against the lifecycle vocabulary.
///
/// # Example
/// ```
/// use checkvisor::{State, validate};
///
/// assert_eq!(validate("RUNNING").unwrap(), State::Running);
/// assert!(validate("running").is_err());
/// ```
pub fn validate(text: &str) -> Result<State, StateError> {
    text.parse()
}

impl FromStr for State {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| StateError::Invalid(s.to_string()))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
