//! # Status updates pushed by running checks.
//!
//! Two shapes of the same data:
//! - [`PushPayload`] is the JSON body of `PATCH /checks/{id}`; `status` is raw text.
//! - [`StatusUpdate`] is what a check run consumes; `status` has been
//!   classified against the lifecycle vocabulary as a [`ReportedState`].
//!
//! Unknown status text is kept (as [`ReportedState::Unknown`]) rather than
//! rejected at decode time, so the run can terminate as `MALFORMED`.

use serde::Deserialize;

use crate::states::State;

/// JSON body sent by a check when publishing its status.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    /// Check id; must match the id in the request path.
    pub id: String,
    /// Lifecycle state reported by the check.
    #[serde(default)]
    pub status: Option<String>,
    /// Agent the check runs under.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Opaque report payload.
    #[serde(default)]
    pub report: Option<String>,
    /// Opaque raw output payload.
    #[serde(default)]
    pub raw: Option<String>,
    /// Completion fraction reported by the check.
    #[serde(default)]
    pub progress: Option<f32>,
}

/// Status reported by a check, after validation against the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedState {
    /// A valid lifecycle state.
    Known(State),
    /// Text that is not a lifecycle state.
    Unknown(String),
}

impl From<String> for ReportedState {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(st) => ReportedState::Known(st),
            Err(_) => ReportedState::Unknown(raw),
        }
    }
}

/// A decoded progress/status report for one check.
///
/// Absent fields mean "no change reported".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    /// Target check id.
    pub id: String,
    /// Reported lifecycle state.
    pub status: Option<ReportedState>,
    /// Agent id.
    pub agent_id: Option<String>,
    /// Opaque report payload.
    pub report: Option<String>,
    /// Opaque raw output payload.
    pub raw: Option<String>,
    /// Completion fraction.
    pub progress: Option<f32>,
}

impl StatusUpdate {
    /// Creates an empty update for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets a valid reported state.
    pub fn with_status(mut self, state: State) -> Self {
        self.status = Some(ReportedState::Known(state));
        self
    }

    /// Sets a reported state from raw text.
    pub fn with_raw_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(ReportedState::from(status.into()));
        self
    }

    /// Sets the report payload.
    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = Some(report.into());
        self
    }

    /// Sets the progress fraction.
    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl From<PushPayload> for StatusUpdate {
    fn from(p: PushPayload) -> Self {
        Self {
            id: p.id,
            status: p.status.map(ReportedState::from),
            agent_id: p.agent_id,
            report: p.report,
            raw: p.raw,
            progress: p.progress,
        }
    }
}
