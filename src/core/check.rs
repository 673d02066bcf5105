//! # Check description and final outcome.
//!
//! [`Check`] is what callers submit; it is immutable once handed to the
//! runtime. [`CheckOutcome`] is what they get back.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use checkvisor::Check;
//!
//! let check = Check::new("vulcansec/vulcan-nmap:1", "example.com")
//!     .with_asset_type("Hostname")
//!     .with_timeout(Duration::from_secs(600))
//!     .with_options(r#"{"ports":[22]}"#)
//!     .with_metadata("team", "security");
//!
//! assert_eq!(check.timeout, Some(Duration::from_secs(600)));
//! assert_eq!(check.metadata["team"], "security");
//! ```

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::backend::RunParams;
use crate::checktype::{Checktype, ImageRef};
use crate::states::State;

/// A containerized scan job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Check {
    /// Container image reference.
    pub image: String,
    /// Scan target.
    pub target: String,
    /// Asset type of the target.
    pub asset_type: Option<String>,
    /// Maximum run duration; falls back to `Config::timeout`.
    pub timeout: Option<Duration>,
    /// Check options (JSON text).
    pub options: Option<String>,
    /// Environment variables copied from the host into the container.
    pub required_vars: Vec<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
    /// Checktype name; derived from `image` when unset.
    pub checktype_name: Option<String>,
    /// Checktype version; derived from `image` when unset.
    pub checktype_version: Option<String>,
}

impl Check {
    /// Creates a check of `image` against `target`.
    pub fn new(image: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    /// Sets the asset type.
    pub fn with_asset_type(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = Some(asset_type.into());
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the options (JSON text).
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    /// Adds a required environment variable.
    pub fn with_required_var(mut self, var: impl Into<String>) -> Self {
        self.required_vars.push(var.into());
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Fills unset fields from `ct`.
    ///
    /// Timeout and options are only taken from the checktype when the check
    /// does not set them. Required variables of the checktype are added.
    pub fn with_checktype_defaults(mut self, ct: &Checktype) -> Self {
        if self.timeout.is_none() {
            self.timeout = ct.timeout;
        }
        if self.options.is_none() {
            self.options = ct.options.clone();
        }
        for var in &ct.required_vars {
            if !self.required_vars.contains(var) {
                self.required_vars.push(var.clone());
            }
        }
        self.checktype_name.get_or_insert_with(|| ct.name.clone());
        self.checktype_version.get_or_insert_with(|| ct.version.clone());
        self
    }

    /// Backend parameters for running this check as `id`.
    pub fn run_params(&self, id: &str, push_address: &str) -> RunParams {
        let parsed = ImageRef::parse(&self.image).ok();
        let name = self.checktype_name.clone().unwrap_or_else(|| {
            parsed
                .as_ref()
                .map_or_else(|| self.image.clone(), ImageRef::checktype_name)
        });
        let version = self.checktype_version.clone().unwrap_or_else(|| {
            parsed.as_ref().map(|r| r.tag.clone()).unwrap_or_default()
        });
        RunParams {
            check_id: id.to_string(),
            checktype_name: name,
            checktype_version: version,
            image: self.image.clone(),
            target: self.target.clone(),
            asset_type: self.asset_type.clone().unwrap_or_default(),
            options: self.options.clone().unwrap_or_default(),
            required_vars: self.required_vars.clone(),
            metadata: self.metadata.clone(),
            push_address: push_address.to_string(),
        }
    }
}

/// Final result of a check run.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    /// Run id.
    pub id: String,
    /// Terminal lifecycle state.
    pub state: State,
    /// Last report pushed by the check.
    pub report: Option<String>,
    /// Last raw payload pushed by the check.
    pub raw: Option<String>,
    /// Agent id reported by the check.
    pub agent_id: Option<String>,
    /// Last progress reported by the check.
    pub progress: Option<f32>,
    /// Output captured by the backend.
    pub output: Vec<u8>,
    /// Backend error that decided the outcome, if any.
    pub error: Option<String>,
    /// When the run was created.
    pub started_at: SystemTime,
    /// When the terminal state was assigned.
    pub finished_at: SystemTime,
    /// Every state the run went through, in order.
    pub history: Vec<State>,
}
