//! # Checktype manifest.
//!
//! TOML document shipped inside a checktype image (label
//! `com.adevinta.vulcan.manifest`):
//!
//! ```toml
//! Description = "Scans open ports"
//! Timeout = 600
//! Options = '{"ports": [22, 443]}'
//! RequiredVars = ["NMAP_TOKEN"]
//! AssetTypes = ["Hostname", "IP"]
//! ```
//!
//! `Description` is mandatory. `Options`, when present, must be a JSON object.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ChecktypeError;

/// Kind of asset a checktype accepts as target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum AssetType {
    /// Single IP address.
    #[serde(rename = "IP")]
    Ip,
    /// Host name.
    Hostname,
    /// Domain name.
    DomainName,
    /// AWS account.
    #[serde(rename = "AWSAccount")]
    AwsAccount,
    /// IP range (CIDR).
    #[serde(rename = "IPRange")]
    IpRange,
    /// Container image.
    DockerImage,
    /// URL.
    WebAddress,
    /// Git repository.
    GitRepository,
    /// GCP project.
    #[serde(rename = "GCPProject")]
    GcpProject,
}

impl AssetType {
    /// Name used in manifests and in `CHECK_ASSET_TYPE`.
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Ip => "IP",
            AssetType::Hostname => "Hostname",
            AssetType::DomainName => "DomainName",
            AssetType::AwsAccount => "AWSAccount",
            AssetType::IpRange => "IPRange",
            AssetType::DockerImage => "DockerImage",
            AssetType::WebAddress => "WebAddress",
            AssetType::GitRepository => "GitRepository",
            AssetType::GcpProject => "GCPProject",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed checktype manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    /// Human-readable description.
    pub description: String,
    /// Timeout in seconds (`0` = none).
    #[serde(default)]
    pub timeout: u64,
    /// Default options (JSON object text).
    #[serde(default)]
    pub options: String,
    /// Environment variables the check needs.
    #[serde(default)]
    pub required_vars: Vec<String>,
    /// Queue the check is scheduled on.
    #[serde(default)]
    pub queue_name: String,
    /// Accepted asset types.
    #[serde(default)]
    pub asset_types: Vec<AssetType>,
}

impl Manifest {
    /// Parses the manifest text.
    pub fn parse(content: &str) -> Result<Self, ChecktypeError> {
        let m: Manifest =
            toml::from_str(content).map_err(|e| ChecktypeError::Manifest(e.to_string()))?;
        if !m.options.is_empty() {
            m.options_json().map_err(|e| {
                ChecktypeError::Manifest(format!("the options field is not a valid json: {e}"))
            })?;
        }
        Ok(m)
    }

    /// Options decoded as a JSON object; `None` when the manifest has none.
    pub fn options_json(
        &self,
    ) -> Result<Option<serde_json::Map<String, serde_json::Value>>, serde_json::Error> {
        if self.options.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&self.options).map(Some)
    }

    /// Timeout as a duration; `None` when unset.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}
