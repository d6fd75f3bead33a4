//! Anonymizing transport configuration.
//!
//! Controls whether outbound SMTP sessions may be routed through a local
//! SOCKS5 proxy (normally a Tor daemon), how long a dial may take, and how
//! often fresh circuits should be requested.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Longest accepted circuit rotation interval, one year in minutes.
pub const MAX_CIRCUIT_RESET_MINS: u64 = 365 * 24 * 60;

/// Settings for the SOCKS5 anonymizing transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorConfig {
    /// Whether the anonymizing transport may be used at all.
    ///
    /// Default: `false`
    #[serde(default)]
    pub enabled: bool,

    /// Abort startup when the proxy cannot be reached.
    ///
    /// When `false`, an unreachable proxy degrades the process to direct
    /// delivery for ordinary recipients.
    ///
    /// Default: `false`
    #[serde(default)]
    pub required: bool,

    /// `host:port` of the SOCKS5 proxy.
    ///
    /// Default: `127.0.0.1:9050`
    #[serde(default = "defaults::socks_proxy")]
    pub socks_proxy: String,

    /// Bound on each dial and SMTP step, in seconds. `0` means the default.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,

    /// Minutes between forced circuit rotations. `0` disables rotation.
    /// At most [`MAX_CIRCUIT_RESET_MINS`].
    ///
    /// Default: 0
    #[serde(default)]
    pub circuit_reset_mins: u64,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            required: false,
            socks_proxy: defaults::socks_proxy(),
            timeout_secs: defaults::timeout_secs(),
            circuit_reset_mins: 0,
        }
    }
}

impl TorConfig {
    /// The I/O bound applied to dials and SMTP steps.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        if self.timeout_secs == 0 {
            Duration::from_secs(defaults::timeout_secs())
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }

    /// The proxy endpoint, falling back to the default when left blank.
    #[must_use]
    pub fn proxy(&self) -> &str {
        if self.socks_proxy.trim().is_empty() {
            defaults::SOCKS_PROXY
        } else {
            self.socks_proxy.trim()
        }
    }

    /// Interval between circuit rotations, if rotation applies.
    ///
    /// Values above [`MAX_CIRCUIT_RESET_MINS`] are clamped to it.
    #[must_use]
    pub const fn rotation_interval(&self) -> Option<Duration> {
        if !self.enabled || self.circuit_reset_mins == 0 {
            return None;
        }

        let mins = if self.circuit_reset_mins > MAX_CIRCUIT_RESET_MINS {
            MAX_CIRCUIT_RESET_MINS
        } else {
            self.circuit_reset_mins
        };
        Some(Duration::from_secs(mins * 60))
    }
}

mod defaults {
    pub const SOCKS_PROXY: &str = "127.0.0.1:9050";

    pub fn socks_proxy() -> String {
        SOCKS_PROXY.to_string()
    }

    pub const fn timeout_secs() -> u64 {
        30
    }
}
