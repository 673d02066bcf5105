//! Error types used by the checkvisor runtime.
//!
//! One enum per concern:
//!
//! - [`StateError`]: lifecycle text that is not part of the vocabulary.
//! - [`PushError`]: push registry and push server failures.
//! - [`BackendError`]: container launch and run failures.
//! - [`ChecktypeError`]: image reference, label and manifest problems.
//! - [`ConfigError`]: configuration parsing.
//! - [`RuntimeError`]: errors raised by the orchestration runtime itself.
//!
//! Each type provides `as_label` (stable snake_case label for logs/metrics).

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Invalid lifecycle state text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The text does not match any known lifecycle state.
    #[error("invalid state {0}")]
    Invalid(String),
}

/// # Errors produced by the push bridge.
///
/// Request-level variants map to HTTP statuses via [`PushError::status_code`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PushError {
    /// No check is registered under the id.
    #[error("check id not found: {id}")]
    UnknownCheck {
        /// Offending check id.
        id: String,
    },

    /// The id is already registered; ids are unique per run.
    #[error("check id already registered: {id}")]
    AlreadyRegistered {
        /// Offending check id.
        id: String,
    },

    /// The check's stream stayed full for the whole delivery timeout.
    #[error("check {id} did not accept the update within {timeout:?}")]
    Stalled {
        /// Target check id.
        id: String,
        /// Configured delivery timeout.
        timeout: Duration,
    },

    /// The listener could not be bound.
    #[error("unable to listen on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with a transport error.
    #[error("push server failed: {0}")]
    Serve(#[source] std::io::Error),

    /// In-flight requests did not drain within the shutdown grace period.
    #[error("push server did not drain within {grace:?}")]
    GraceExceeded {
        /// Configured drain window.
        grace: Duration,
    },
}

impl PushError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PushError::UnknownCheck { .. } => "push_unknown_check",
            PushError::AlreadyRegistered { .. } => "push_already_registered",
            PushError::Stalled { .. } => "push_stalled",
            PushError::Bind { .. } => "push_bind",
            PushError::Serve(_) => "push_serve",
            PushError::GraceExceeded { .. } => "push_grace_exceeded",
        }
    }

    /// HTTP status returned to the pushing check.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PushError::UnknownCheck { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// # Errors produced by execution backends.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The container could not be started.
    #[error("unable to launch check: {0}")]
    Launch(String),

    /// The container ran but exited unsuccessfully.
    #[error("check exited with {code:?}: {error}")]
    Run {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Failure description.
        error: String,
    },

    /// The run was stopped because its context was cancelled.
    #[error("check run canceled")]
    Canceled,

    /// The backend task panicked.
    #[error("backend panicked: {0}")]
    Panicked(String),
}

impl BackendError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use checkvisor::BackendError;
    ///
    /// assert_eq!(BackendError::Canceled.as_label(), "backend_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BackendError::Launch(_) => "backend_launch",
            BackendError::Run { .. } => "backend_run",
            BackendError::Canceled => "backend_canceled",
            BackendError::Panicked(_) => "backend_panicked",
        }
    }

    /// Shorthand for a run failure without exit code.
    pub fn run(error: impl Into<String>) -> Self {
        BackendError::Run {
            code: None,
            error: error.into(),
        }
    }
}

/// # Errors produced while discovering checktypes.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChecktypeError {
    /// The image reference is not valid.
    #[error("invalid image reference {reference}: {reason}")]
    InvalidReference {
        /// Offending reference.
        reference: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The manifest could not be parsed.
    #[error("invalid checktype manifest: {0}")]
    Manifest(String),

    /// The image does not carry checktype metadata.
    #[error("invalid metadata in image {image}: {reason}")]
    NoChecktypeImage {
        /// Image name.
        image: String,
        /// Missing or invalid label.
        reason: String,
    },

    /// The image labels could not be read.
    #[error("unable to read image labels: {0}")]
    Labels(String),
}

impl ChecktypeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChecktypeError::InvalidReference { .. } => "checktype_invalid_reference",
            ChecktypeError::Manifest(_) => "checktype_manifest",
            ChecktypeError::NoChecktypeImage { .. } => "checktype_no_checktype_image",
            ChecktypeError::Labels(_) => "checktype_labels",
        }
    }
}

/// Configuration could not be loaded.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML document is invalid.
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Toml(_) => "config_toml",
        }
    }
}

/// # Errors produced by the checkvisor runtime.
///
/// These represent failures in the orchestration system itself, never the
/// outcome of an individual check (that is a [`State`](crate::State)).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some checks were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Ids of the checks that did not settle in time.
        stuck: Vec<String>,
    },

    /// The driving task of a check panicked or was aborted.
    #[error("check {id} task failed: {error}")]
    Join {
        /// Check id.
        id: String,
        /// Join error description.
        error: String,
    },

    /// OS signal handlers could not be installed.
    #[error("unable to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use checkvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Join { .. } => "runtime_join",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}
