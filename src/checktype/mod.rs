//! # Checktype discovery.
//!
//! A *checktype* describes a check image: its name, version, timeout, default
//! options and required environment. It is read from image labels through a
//! [`LabelSource`] and used to fill a [`Check`](crate::Check)'s defaults.
//!
//! ```text
//! Checktype::from_image_ref(source, "vulcansec/vulcan-nmap:1")
//!     ├─ ImageRef::parse            → name/version fallback
//!     ├─ source.image_labels(image) → labels
//!     └─ Image::from_labels         → manifest, name
//!           ├─ Ok                   → full checktype (version = tag)
//!           └─ NoChecktypeImage     → name/version from the reference only
//! ```

mod image;
mod manifest;
mod reference;

pub use image::{Image, LAST_MODIFIED_LABEL, MANIFEST_LABEL, NAME_LABEL};
pub use manifest::{AssetType, Manifest};
pub use reference::ImageRef;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ChecktypeError;

/// Reads the labels of a container image.
#[async_trait]
pub trait LabelSource: Send + Sync {
    /// Returns the labels of `image` (empty if it has none).
    async fn image_labels(&self, image: &str) -> Result<HashMap<String, String>, ChecktypeError>;
}

#[async_trait]
impl LabelSource for HashMap<String, HashMap<String, String>> {
    async fn image_labels(&self, image: &str) -> Result<HashMap<String, String>, ChecktypeError> {
        Ok(self.get(image).cloned().unwrap_or_default())
    }
}

/// Descriptor of a check image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checktype {
    /// Checktype name.
    pub name: String,
    /// Version (the image tag).
    pub version: String,
    /// Description from the manifest.
    pub description: String,
    /// Image reference.
    pub image: String,
    /// Default timeout.
    pub timeout: Option<Duration>,
    /// Default options (JSON object text).
    pub options: Option<String>,
    /// Environment variables the check needs.
    pub required_vars: Vec<String>,
    /// Accepted asset types.
    pub assets: Vec<AssetType>,
}

impl Checktype {
    /// Resolves the checktype packaged in `reference`.
    ///
    /// Images without checktype labels still resolve, with only the name and
    /// version derived from the reference.
    pub async fn from_image_ref(
        source: &dyn LabelSource,
        reference: &str,
    ) -> Result<Self, ChecktypeError> {
        let parsed = ImageRef::parse(reference)?;
        let labels = source.image_labels(reference).await?;
        match Image::from_labels(reference, &labels) {
            Ok(image) => Ok(Self::from_image(image, parsed.tag)),
            Err(ChecktypeError::NoChecktypeImage { reason, .. }) => {
                debug!(image = reference, %reason, "image has no checktype metadata");
                Ok(Self::from_ref(&parsed, reference))
            }
            Err(err) => Err(err),
        }
    }

    /// Checktype carrying only what the reference encodes.
    pub fn from_ref(parsed: &ImageRef, reference: &str) -> Self {
        Self {
            name: parsed.checktype_name(),
            version: parsed.tag.clone(),
            image: reference.to_string(),
            ..Self::default()
        }
    }

    /// Checktype described by image metadata.
    pub fn from_image(image: Image, version: String) -> Self {
        let timeout = image.manifest.timeout();
        let Manifest {
            description,
            options,
            required_vars,
            asset_types,
            ..
        } = image.manifest;
        Self {
            name: image.checktype_name,
            version,
            description,
            image: image.name,
            timeout,
            options: (!options.is_empty()).then_some(options),
            required_vars,
            assets: asset_types,
        }
    }
}
