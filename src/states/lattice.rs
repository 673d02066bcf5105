//! # Lifecycle lattice.
//!
//! A [`Lattice`] partitions states into totally ordered *stages*; states
//! inside one stage are mutually unordered. The last stage is the terminal one.
//!
//! ```text
//! stage 0   CREATED
//! stage 1   INIT
//! stage 2   RUNNING
//! stage 3   ABORTED FAILED FINISHED INCONCLUSIVE KILLED MALFORMED TIMEOUT   (terminal)
//! ```
//!
//! ## Rules
//! - A state→stage index is built once in [`Lattice::new`]; every query is a
//!   hash lookup plus a walk over a handful of stages.
//! - Queries about a state that belongs to no stage **fail open**: both
//!   [`Lattice::states_up_to_and_including`] and [`Lattice::states_strictly_after`]
//!   return every state. Use [`Lattice::stage_of`] to detect that case explicitly.
//! - States inside a stage are kept sorted by name.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use super::state::State;

/// The partition used by the runtime.
pub static CHECK_STATES: LazyLock<Lattice> = LazyLock::new(Lattice::check_states);

/// Ordered partition of lifecycle states into stages.
#[derive(Debug, Clone)]
pub struct Lattice {
    stages: Vec<Vec<State>>,
    index: HashMap<State, usize>,
}

impl Lattice {
    /// Builds a lattice from stages given in lifecycle order.
    ///
    /// Empty stages are dropped. A state listed twice keeps its first stage.
    pub fn new(stages: Vec<Vec<State>>) -> Self {
        let mut seen = HashSet::new();
        let stages: Vec<Vec<State>> = stages
            .into_iter()
            .map(|mut stage| {
                stage.sort_by_key(|s| s.as_str());
                stage.retain(|s| seen.insert(*s));
                stage
            })
            .filter(|stage| !stage.is_empty())
            .collect();
        let index = stages
            .iter()
            .enumerate()
            .flat_map(|(i, stage)| stage.iter().map(move |s| (*s, i)))
            .collect();
        Self { stages, index }
    }

    /// The check lifecycle partition.
    pub fn check_states() -> Self {
        Self::new(vec![
            vec![State::Created],
            vec![State::Init],
            vec![State::Running],
            vec![
                State::Timeout,
                State::Aborted,
                State::Killed,
                State::Failed,
                State::Finished,
                State::Malformed,
                State::Inconclusive,
            ],
        ])
    }

    /// Returns the stage index of `s`, or `None` if `s` is not part of this lattice.
    pub fn stage_of(&self, s: State) -> Option<usize> {
        self.index.get(&s).copied()
    }

    /// Returns the stages in lifecycle order.
    pub fn stages(&self) -> &[Vec<State>] {
        &self.stages
    }

    /// States in stages `0..=stage_of(s)`, in stage order.
    ///
    /// Returns every state if `s` is unknown to the lattice.
    pub fn states_up_to_and_including(&self, s: State) -> Vec<State> {
        let last = self.stage_of(s).unwrap_or(self.stages.len().saturating_sub(1));
        self.stages
            .iter()
            .take(last + 1)
            .flatten()
            .copied()
            .collect()
    }

    /// States in stages strictly after the stage of `s`, terminal stage first.
    ///
    /// Returns every state (terminal stage first) if `s` is unknown to the lattice.
    pub fn states_strictly_after(&self, s: State) -> Vec<State> {
        let stop = self.stage_of(s);
        self.stages
            .iter()
            .enumerate()
            .rev()
            .take_while(|(i, _)| Some(*i) != stop)
            .flat_map(|(_, stage)| stage.iter().copied())
            .collect()
    }

    /// True if `candidate` is in a stage strictly after the stage of `base`.
    pub fn is_strictly_after(&self, candidate: State, base: State) -> bool {
        self.states_strictly_after(base).contains(&candidate)
    }

    /// True if `candidate` is in a stage at or before the stage of `base`.
    pub fn is_at_or_before(&self, candidate: State, base: State) -> bool {
        self.states_up_to_and_including(base).contains(&candidate)
    }

    /// States of the terminal (last) stage.
    pub fn terminal_states(&self) -> &[State] {
        self.stages.last().map(Vec::as_slice).unwrap_or_default()
    }

    /// The fixed non-terminal states of a check.
    pub fn non_terminal_states(&self) -> [State; 3] {
        [State::Created, State::Init, State::Running]
    }

    /// True if `s` belongs to the terminal stage.
    pub fn is_terminal(&self, s: State) -> bool {
        self.terminal_states().contains(&s)
    }
}

impl Default for Lattice {
    fn default() -> Self {
        Self::check_states()
    }
}
