//! Error types for the mixsend-common crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// A recipient address that cannot be split into local part and domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedAddress {
    /// The address has no `@` at all.
    #[error("{0}: Email address contains no '@'")]
    MissingSeparator(String),

    /// The address has more than one `@`.
    #[error("{0}: Malformed email address")]
    TooManySeparators(String),
}

impl MalformedAddress {
    /// The offending address as it was supplied.
    #[must_use]
    pub fn address(&self) -> &str {
        match self {
            Self::MissingSeparator(address) | Self::TooManySeparators(address) => address,
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid RON.
    #[error("Failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
