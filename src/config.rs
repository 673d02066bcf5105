//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the runtime and [`PushConfig`]
//! for the push bridge.
//!
//! Config can be built in code (`Config::default()` plus field updates) or
//! loaded from TOML with [`Config::from_toml_str`]. Durations use humantime
//! notation (`"10s"`, `"1m 30s"`):
//!
//! ```toml
//! grace = "30s"
//! timeout = "10m"
//!
//! [push]
//! listen = "0.0.0.0:8080"
//! address = "http://host.docker.internal:8080"
//! shutdown_grace = "10s"
//! ```
//!
//! ## Sentinel values
//! - `timeout = 0s` → no default per-check timeout
//! - `bus_capacity = 0` / `push.buffer = 0` → clamped to 1

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Global configuration for the check runtime.
///
/// ## Field semantics
/// - `grace`: Maximum wait for in-flight checks to settle on shutdown
/// - `timeout`: Default per-check timeout when the check sets none (`0s` = none)
/// - `backend_grace`: Wait for the backend result once the terminal state is decided
/// - `bus_capacity`: Event bus ring buffer size (min 1)
/// - `push`: Push bridge settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum time to wait for in-flight checks on shutdown.
    ///
    /// When shutdown is requested:
    /// - Every check run is cancelled (settles in `KILLED`)
    /// - The runtime waits up to `grace` for runs to deregister
    /// - If exceeded, returns `RuntimeError::GraceExceeded`
    #[serde(with = "humantime_serde")]
    pub grace: Duration,

    /// Default check timeout.
    ///
    /// - `Duration::ZERO` = no timeout
    /// - `> 0` = applied to checks that do not carry their own timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// How long to wait for the backend after the run already reached a
    /// terminal state (push-reported or timeout/cancel), to salvage its output.
    #[serde(with = "humantime_serde")]
    pub backend_grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Push bridge settings.
    pub push: PushConfig,
}

/// Push bridge configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Socket address the push server binds to.
    pub listen: String,

    /// URL the checks use to reach the push server.
    ///
    /// `None` derives `http://{bound address}` once the server is started.
    pub address: Option<String>,

    /// Per-check stream capacity.
    pub buffer: usize,

    /// Maximum wait for space in a check's stream before answering 500.
    #[serde(with = "humantime_serde")]
    pub deliver_timeout: Duration,

    /// Drain window for in-flight requests when the server stops.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Config {
    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(doc)?)
    }

    /// Returns the default per-check timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → timeout applied to checks without their own
    #[inline]
    pub fn default_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl PushConfig {
    /// Returns a stream capacity clamped to a minimum of 1.
    #[inline]
    pub fn buffer_clamped(&self) -> usize {
        self.buffer.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 60s`
    /// - `timeout = 0s` (no timeout)
    /// - `backend_grace = 2s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            timeout: Duration::ZERO,
            backend_grace: Duration::from_secs(2),
            bus_capacity: 1024,
            push: PushConfig::default(),
        }
    }
}

impl Default for PushConfig {
    /// Default push configuration:
    ///
    /// - `listen = 127.0.0.1:8080`
    /// - `buffer = 64`
    /// - `deliver_timeout = 5s`
    /// - `shutdown_grace = 10s`
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            address: None,
            buffer: 64,
            deliver_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.default_timeout(), None);
        assert_eq!(cfg.push.shutdown_grace, Duration::from_secs(10));
        assert_eq!(cfg.push.buffer_clamped(), 64);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg = Config::from_toml_str(
            r#"
            timeout = "90s"
            bus_capacity = 0

            [push]
            listen = "0.0.0.0:9000"
            address = "http://agent:9000"
            deliver_timeout = "250ms"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.default_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(cfg.grace, Duration::from_secs(60));
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.push.listen, "0.0.0.0:9000");
        assert_eq!(cfg.push.address.as_deref(), Some("http://agent:9000"));
        assert_eq!(cfg.push.deliver_timeout, Duration::from_millis(250));
        assert_eq!(cfg.push.shutdown_grace, Duration::from_secs(10));
    }

    #[test]
    fn rejects_bad_durations() {
        let err = Config::from_toml_str("grace = \"soon\"").unwrap_err();
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
