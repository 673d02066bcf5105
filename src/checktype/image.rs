//! Checktype metadata stored in image labels.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::manifest::Manifest;
use crate::error::ChecktypeError;

/// When the checktype code was last modified (RFC 822, e.g. `02 Jan 06 15:04 UTC`).
pub const LAST_MODIFIED_LABEL: &str = "com.adevinta.vulcan.last_modified_file";
/// Name of the checktype packaged in the image.
pub const NAME_LABEL: &str = "com.adevinta.vulcan.name";
/// Checktype manifest (TOML).
pub const MANIFEST_LABEL: &str = "com.adevinta.vulcan.manifest";

const RFC822_NO_ZONE: &str = "%d %b %y %H:%M";

/// Checktype metadata read from an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Image reference as given.
    pub name: String,
    /// Checktype name.
    pub checktype_name: String,
    /// Checktype manifest.
    pub manifest: Manifest,
    /// Last modification of the checktype code.
    pub last_modified: DateTime<Utc>,
}

impl Image {
    /// Builds the metadata of `name` from its labels.
    ///
    /// Any missing or invalid label yields [`ChecktypeError::NoChecktypeImage`].
    pub fn from_labels(
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<Self, ChecktypeError> {
        let no_checktype = |reason: String| ChecktypeError::NoChecktypeImage {
            image: name.to_string(),
            reason,
        };
        let label = |key: &str| {
            labels
                .get(key)
                .ok_or_else(|| no_checktype(format!("label {key} not found")))
        };

        let raw = label(LAST_MODIFIED_LABEL)?;
        let last_modified = parse_rfc822(raw).ok_or_else(|| {
            no_checktype(format!("invalid time {raw} defined in the label {LAST_MODIFIED_LABEL}"))
        })?;
        let checktype_name = label(NAME_LABEL)?.clone();
        let manifest = Manifest::parse(label(MANIFEST_LABEL)?)
            .map_err(|e| no_checktype(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            checktype_name,
            manifest,
            last_modified,
        })
    }
}

/// Parses `DD Mon YY HH:MM ZONE`. The zone abbreviation is read as UTC.
fn parse_rfc822(text: &str) -> Option<DateTime<Utc>> {
    let (stamp, zone) = text.trim().rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, RFC822_NO_ZONE)
        .ok()
        .map(|dt| dt.and_utc())
}
