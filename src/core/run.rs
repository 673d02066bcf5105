//! # Per-check lifecycle record.
//!
//! [`CheckRun`] is owned by the runner task of one check and is never shared.
//! It enforces the lattice rules:
//!
//! - transitions only move to a strictly later stage;
//! - a pushed state equal to the current one only refreshes fields;
//! - regressions are discarded entirely (fields included);
//! - the terminal state is assigned exactly once, later attempts are no-ops.

use std::time::SystemTime;

use super::check::CheckOutcome;
use crate::push::{ReportedState, StatusUpdate};
use crate::states::{CHECK_STATES, State};

/// What applying a push did to the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Fields refreshed, state unchanged.
    Updated,
    /// State moved forward.
    Advanced {
        /// State before the push.
        from: State,
        /// State after the push.
        to: State,
    },
    /// Regression; nothing applied.
    Discarded {
        /// Current state.
        current: State,
        /// State carried by the push.
        reported: State,
    },
    /// Status text outside the vocabulary; nothing applied.
    Malformed(String),
    /// The run is already terminal; nothing applied.
    Closed,
}

#[derive(Debug)]
pub(crate) struct CheckRun {
    id: String,
    state: State,
    report: Option<String>,
    raw: Option<String>,
    agent_id: Option<String>,
    progress: Option<f32>,
    history: Vec<State>,
    started_at: SystemTime,
    finished_at: Option<SystemTime>,
}

impl CheckRun {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: State::Created,
            report: None,
            raw: None,
            agent_id: None,
            progress: None,
            history: vec![State::Created],
            started_at: SystemTime::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Moves to a later non-terminal state. Returns `false` if `to` is not
    /// strictly after the current state or the run is already terminal.
    pub fn advance(&mut self, to: State) -> bool {
        if self.is_terminal() || CHECK_STATES.is_terminal(to) {
            return false;
        }
        if !CHECK_STATES.is_strictly_after(to, self.state) {
            return false;
        }
        self.set(to);
        true
    }

    /// Assigns the terminal state. Only the first call has an effect.
    pub fn terminate(&mut self, to: State) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.set(to);
        self.finished_at = Some(SystemTime::now());
        true
    }

    /// Applies a pushed update.
    pub fn apply_push(&mut self, update: StatusUpdate) -> Verdict {
        if self.is_terminal() {
            return Verdict::Closed;
        }
        let verdict = match &update.status {
            None => Verdict::Updated,
            Some(ReportedState::Unknown(raw)) => return Verdict::Malformed(raw.clone()),
            Some(ReportedState::Known(s)) if *s == self.state => Verdict::Updated,
            Some(ReportedState::Known(s)) if CHECK_STATES.is_strictly_after(*s, self.state) => {
                Verdict::Advanced {
                    from: self.state,
                    to: *s,
                }
            }
            Some(ReportedState::Known(s)) => {
                return Verdict::Discarded {
                    current: self.state,
                    reported: *s,
                };
            }
        };
        self.apply_fields(update);
        if let Verdict::Advanced { to, .. } = verdict {
            if CHECK_STATES.is_terminal(to) {
                self.terminate(to);
            } else {
                self.set(to);
            }
        }
        verdict
    }

    fn apply_fields(&mut self, update: StatusUpdate) {
        if update.report.is_some() {
            self.report = update.report;
        }
        if update.raw.is_some() {
            self.raw = update.raw;
        }
        if update.agent_id.is_some() {
            self.agent_id = update.agent_id;
        }
        if update.progress.is_some() {
            self.progress = update.progress;
        }
    }

    fn set(&mut self, to: State) {
        self.state = to;
        self.history.push(to);
    }

    /// Consumes the run into its outcome.
    pub fn into_outcome(self, output: Vec<u8>, error: Option<String>) -> CheckOutcome {
        CheckOutcome {
            id: self.id,
            state: self.state,
            report: self.report,
            raw: self.raw,
            agent_id: self.agent_id,
            progress: self.progress,
            output,
            error,
            started_at: self.started_at,
            finished_at: self.finished_at.unwrap_or_else(SystemTime::now),
            history: self.history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(state: State) -> StatusUpdate {
        StatusUpdate::new("c").with_status(state)
    }

    #[test]
    fn regressions_are_discarded_with_their_fields() {
        let mut run = CheckRun::new("c");
        assert!(run.advance(State::Init));
        assert_eq!(
            run.apply_push(push(State::Running).with_progress(0.5)),
            Verdict::Advanced {
                from: State::Init,
                to: State::Running
            }
        );
        assert_eq!(
            run.apply_push(push(State::Init).with_progress(0.9)),
            Verdict::Discarded {
                current: State::Running,
                reported: State::Init
            }
        );
        assert_eq!(run.state(), State::Running);
        let outcome = run.into_outcome(Vec::new(), None);
        assert_eq!(outcome.progress, Some(0.5));
        assert_eq!(outcome.history, [State::Created, State::Init, State::Running]);
    }

    #[test]
    fn equal_state_only_refreshes_fields() {
        let mut run = CheckRun::new("c");
        run.advance(State::Init);
        run.advance(State::Running);
        assert_eq!(
            run.apply_push(push(State::Running).with_report("partial")),
            Verdict::Updated
        );
        assert_eq!(
            run.apply_push(StatusUpdate::new("c").with_progress(0.2)),
            Verdict::Updated
        );
        let outcome = run.into_outcome(Vec::new(), None);
        assert_eq!(outcome.report.as_deref(), Some("partial"));
        assert_eq!(outcome.progress, Some(0.2));
        assert_eq!(outcome.history.len(), 3);
    }

    #[test]
    fn terminal_is_assigned_once() {
        let mut run = CheckRun::new("c");
        run.advance(State::Init);
        assert!(matches!(
            run.apply_push(push(State::Inconclusive).with_report("r1")),
            Verdict::Advanced { .. }
        ));
        assert!(run.is_terminal());
        assert_eq!(
            run.apply_push(push(State::Inconclusive).with_report("r2")),
            Verdict::Closed
        );
        assert!(!run.terminate(State::Finished));
        assert!(!run.advance(State::Running));
        let outcome = run.into_outcome(Vec::new(), None);
        assert_eq!(outcome.state, State::Inconclusive);
        assert_eq!(outcome.report.as_deref(), Some("r1"));
    }

    #[test]
    fn unknown_status_is_malformed() {
        let mut run = CheckRun::new("c");
        let verdict = run.apply_push(StatusUpdate::new("c").with_raw_status("DONE"));
        assert_eq!(verdict, Verdict::Malformed("DONE".into()));
        assert_eq!(run.state(), State::Created);
    }

    #[test]
    fn advance_rejects_terminal_and_backwards_moves() {
        let mut run = CheckRun::new("c");
        assert!(!run.advance(State::Finished));
        assert!(run.advance(State::Running));
        assert!(!run.advance(State::Init));
        assert_eq!(run.state(), State::Running);
    }

    #[test]
    fn monotonic_under_arbitrary_push_order() {
        use rand::seq::SliceRandom;

        let mut rng = rand::rng();
        for _ in 0..50 {
            let mut pushes = vec![
                State::Created,
                State::Init,
                State::Running,
                State::Running,
                State::Init,
                State::Finished,
            ];
            pushes.shuffle(&mut rng);
            let mut run = CheckRun::new("c");
            for s in pushes {
                run.apply_push(push(s));
            }
            let history = run.into_outcome(Vec::new(), None).history;
            let stages: Vec<usize> = history
                .iter()
                .filter_map(|s| CHECK_STATES.stage_of(*s))
                .collect();
            assert!(stages.windows(2).all(|w| w[0] < w[1]), "{history:?}");
        }
    }
}
