//! # Container image references.
//!
//! [`ImageRef::parse`] normalizes a reference the way docker does:
//!
//! ```text
//! nmap                         → docker.io / nmap                  : latest
//! vulcansec/vulcan-nmap:1      → docker.io / vulcansec/vulcan-nmap : 1
//! ghcr.io/acme/check@sha256:…  → ghcr.io   / acme/check            : (digest only)
//! localhost:5000/check:edge    → localhost:5000 / check            : edge
//! ```
//!
//! `library/` is stripped from docker.io paths; checks are not expected to
//! live in the official library namespace.

use std::fmt;

use crate::error::ChecktypeError;

const DEFAULT_DOMAIN: &str = "docker.io";
const LEGACY_DOMAIN: &str = "index.docker.io";
const OFFICIAL_PREFIX: &str = "library/";
const DEFAULT_TAG: &str = "latest";
const MAX_TAG_LEN: usize = 128;

/// A normalized image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry domain (`docker.io` when omitted).
    pub domain: String,
    /// Repository path inside the registry.
    pub path: String,
    /// Tag; `latest` when neither tag nor digest is given, empty for digest-only refs.
    pub tag: String,
    /// Content digest (`sha256:…`), if pinned.
    pub digest: Option<String>,
}

impl ImageRef {
    /// Parses and normalizes `reference`.
    pub fn parse(reference: &str) -> Result<Self, ChecktypeError> {
        let invalid = |reason: &str| ChecktypeError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };
        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (rest, digest) = match reference.split_once('@') {
            Some((rest, digest)) => {
                if !valid_digest(digest) {
                    return Err(invalid("invalid digest"));
                }
                (rest, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A ':' after the last '/' separates the tag; an earlier one is a port.
        let name_end = rest.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match rest[name_end..].rfind(':') {
            Some(i) => {
                let tag = &rest[name_end + i + 1..];
                if !valid_tag(tag) {
                    return Err(invalid("invalid tag"));
                }
                (&rest[..name_end + i], Some(tag))
            }
            None => (rest, None),
        };

        let (domain, path) = split_domain(name);
        if domain.is_empty() || path.is_empty() {
            return Err(invalid("missing repository name"));
        }
        if path.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid("repository name must be lowercase"));
        }
        if !path.split('/').all(valid_component) {
            return Err(invalid("invalid repository name"));
        }

        let path = if domain == DEFAULT_DOMAIN {
            path.strip_prefix(OFFICIAL_PREFIX).unwrap_or(path).to_string()
        } else {
            path.to_string()
        };
        let tag = match (tag, &digest) {
            (Some(tag), _) => tag.to_string(),
            (None, Some(_)) => String::new(),
            (None, None) => DEFAULT_TAG.to_string(),
        };

        Ok(Self {
            domain: domain.to_string(),
            path,
            tag,
            digest,
        })
    }

    /// Checktype name derived from the reference: `path` for docker.io,
    /// `domain/path` otherwise.
    pub fn checktype_name(&self) -> String {
        if self.domain == DEFAULT_DOMAIN {
            self.path.clone()
        } else {
            format!("{}/{}", self.domain, self.path)
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.path)?;
        if !self.tag.is_empty() {
            write!(f, ":{}", self.tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn split_domain(name: &str) -> (&str, &str) {
    match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            let domain = if first == LEGACY_DOMAIN { DEFAULT_DOMAIN } else { first };
            (domain, rest)
        }
        _ => (DEFAULT_DOMAIN, name),
    }
}

/// `[a-z0-9]+` groups joined by `.`, `_`, `__` or runs of `-`.
fn valid_component(c: &str) -> bool {
    let bytes = c.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return false;
    }
    let mut prev_sep: Option<u8> = None;
    let mut underscores = 0;
    for &b in bytes {
        match b {
            b'a'..=b'z' | b'0'..=b'9' => {
                prev_sep = None;
                underscores = 0;
            }
            b'.' if prev_sep.is_none() => prev_sep = Some(b'.'),
            b'_' if matches!(prev_sep, None | Some(b'_')) && underscores < 2 => {
                prev_sep = Some(b'_');
                underscores += 1;
            }
            b'-' if matches!(prev_sep, None | Some(b'-')) => prev_sep = Some(b'-'),
            _ => return false,
        }
    }
    true
}

fn valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    tag.len() <= MAX_TAG_LEN
        && (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn valid_digest(digest: &str) -> bool {
    let Some((algo, hex)) = digest.split_once(':') else {
        return false;
    };
    !algo.is_empty()
        && algo
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '_' | '-'))
        && hex.len() >= 32
        && hex.chars().all(|c| c.is_ascii_hexdigit())
}
