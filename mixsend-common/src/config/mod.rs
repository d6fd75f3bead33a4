//! Configuration for mixsend.
//!
//! Loaded once at startup from a RON file and shared read-only afterwards.
//! Every field carries a default, so a partial file is valid:
//!
//! ```ron
//! Config (
//!     tor: (
//!         enabled: true,
//!         required: true,
//!         circuit_reset_mins: 10,
//!     ),
//!     mail: (
//!         smtp_relay: "mail.example.net",
//!         smtp_port: 587,
//!         mx_relay: true,
//!     ),
//!     pool: (
//!         directory: "/var/spool/mixsend/pool",
//!         max_age_days: 28,
//!     ),
//!     remailer: (
//!         address: "mix@example.net",
//!     ),
//! )
//! ```
//!
//! ## Modules
//!
//! - [`tor`]: SOCKS5 transport and circuit rotation settings
//! - [`mail`]: relay, TLS, identity and alternate sink settings

pub mod mail;
pub mod tor;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use self::{mail::MailConfig, tor::TorConfig};
use crate::{address::Address, error::ConfigError};

/// Complete delivery configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tor: TorConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub remailer: RemailerConfig,
}

/// Outbound pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Directory holding spooled outbound messages.
    ///
    /// Default: `pool`
    #[serde(default = "defaults::pool_directory")]
    pub directory: PathBuf,

    /// Messages pooled longer than this many days are discarded unsent.
    ///
    /// Default: 28
    #[serde(default = "defaults::max_age_days")]
    pub max_age_days: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            directory: defaults::pool_directory(),
            max_age_days: defaults::max_age_days(),
        }
    }
}

/// Identity of the remailer itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemailerConfig {
    /// The remailer's own address, used as the default envelope sender.
    ///
    /// Default: `remailer@domain.invalid`
    #[serde(default = "defaults::remailer_address")]
    pub address: String,
}

impl Default for RemailerConfig {
    fn default() -> Self {
        Self {
            address: defaults::remailer_address(),
        }
    }
}

impl Config {
    /// Parses a configuration from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed RON and
    /// [`ConfigError::Invalid`] when a value fails validation.
    pub fn from_ron(source: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&source, path)
    }

    /// Renders the effective configuration as pretty RON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// The envelope sender: the explicit override, else the remailer address.
    #[must_use]
    pub fn envelope_sender(&self) -> &str {
        if self.mail.sender.is_empty() {
            &self.remailer.address
        } else {
            &self.mail.sender
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        Address::parse(&self.remailer.address).map_err(|e| ConfigError::Invalid {
            field: "remailer.address",
            reason: e.to_string(),
        })?;

        if !self.mail.pipe.is_empty() && self.mail.pipe.split_whitespace().next().is_none() {
            return Err(ConfigError::Invalid {
                field: "mail.pipe",
                reason: "command is blank".to_string(),
            });
        }

        if self.tor.circuit_reset_mins > tor::MAX_CIRCUIT_RESET_MINS {
            return Err(ConfigError::Invalid {
                field: "tor.circuit_reset_mins",
                reason: format!("must be at most {}", tor::MAX_CIRCUIT_RESET_MINS),
            });
        }

        if self.mail.smtp_port == 0 {
            return Err(ConfigError::Invalid {
                field: "mail.smtp_port",
                reason: "port must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn pool_directory() -> PathBuf {
        PathBuf::from("pool")
    }

    pub const fn max_age_days() -> u32 {
        28
    }

    pub fn remailer_address() -> String {
        "remailer@domain.invalid".to_string()
    }
}
