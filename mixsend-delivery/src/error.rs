//! Typed error handling for delivery operations.
//!
//! Errors fall into two groups:
//! - Failures of a single delivery attempt (address, transport, protocol and
//!   sink errors). The pool entry is kept so a later flush can retry it.
//! - Problems with the pool entry itself (expired, unparsable, or without
//!   recipients). The entry is deleted; retrying cannot help.

use std::{fmt, io, time::Duration};

use mixsend_common::MalformedAddress;
use mixsend_smtp::ClientError;
use thiserror::Error;

/// Point in the delivery pipeline at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Pool,
    Resolve,
    Connect,
    Greeting,
    Ehlo,
    StartTls,
    Auth,
    MailFrom,
    RcptTo,
    Data,
    Sink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pool => "pool",
            Self::Resolve => "resolve",
            Self::Connect => "connect",
            Self::Greeting => "greeting",
            Self::Ehlo => "ehlo",
            Self::StartTls => "starttls",
            Self::Auth => "auth",
            Self::MailFrom => "mail-from",
            Self::RcptTo => "rcpt-to",
            Self::Data => "data",
            Self::Sink => "sink",
        })
    }
}

/// Failure to establish or keep a byte stream to the relay.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No TCP connection could be made to the SOCKS5 proxy itself.
    #[error("SOCKS5 proxy {proxy} unreachable: {source}")]
    ProxyUnreachable {
        proxy: String,
        #[source]
        source: io::Error,
    },

    /// The proxy answered but refused or failed the request.
    #[error("SOCKS5 proxy {proxy} could not reach {target}: {reason}")]
    ProxyRejected {
        proxy: String,
        target: String,
        reason: String,
    },

    /// Direct TCP connect failed.
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// A dial or SMTP step exceeded the configured bound.
    #[error("{stage} with {target} timed out after {after:?}")]
    Timeout {
        stage: Stage,
        target: String,
        after: Duration,
    },
}

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    MalformedAddress(#[from] MalformedAddress),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The relay refused a command, or the session broke mid-conversation.
    #[error("Protocol failure during {stage} with {relay}: {reason}")]
    Protocol {
        stage: Stage,
        relay: String,
        reason: String,
    },

    /// The entry sat in the pool longer than allowed.
    #[error("Pool entry is {age_days} days old, exceeding the maximum of {max_age_days}")]
    Expired { age_days: i64, max_age_days: u32 },

    #[error("Unparsable pool entry: {0}")]
    Unparsable(String),

    #[error("No email recipients found")]
    NoRecipients,

    /// The pooled-date marker is present but not in the short-date format.
    #[error("Failed to parse pooled date {0:?}")]
    PooledDate(String),

    /// The pool entry could not be read from disk.
    #[error("Failed to read pool entry: {0}")]
    PoolRead(#[source] io::Error),

    /// An alternate sink (outfile or pipe) failed.
    #[error("{sink} sink failed: {reason}")]
    Sink { sink: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DeliveryError {
    /// Builds a [`DeliveryError::Protocol`] from an SMTP client failure.
    pub fn protocol(stage: Stage, relay: &str, error: &ClientError) -> Self {
        Self::Protocol {
            stage,
            relay: relay.to_string(),
            reason: error.to_string(),
        }
    }

    /// Builds a [`DeliveryError::Protocol`] from an unexpected reply.
    pub fn rejected(stage: Stage, relay: &str, code: u16, message: &str) -> Self {
        Self::Protocol {
            stage,
            relay: relay.to_string(),
            reason: format!("{code} {message}"),
        }
    }

    /// Whether the pool entry that produced this error should be deleted.
    ///
    /// Only problems with the entry itself qualify. Transport, protocol and
    /// address failures leave the entry in place.
    #[must_use]
    pub const fn deletes_entry(&self) -> bool {
        matches!(
            self,
            Self::Expired { .. } | Self::Unparsable(_) | Self::NoRecipients
        )
    }

    /// The pipeline stage this failure is attributed to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::MalformedAddress(_) => Stage::Resolve,
            Self::Transport(TransportError::Timeout { stage, .. }) | Self::Protocol { stage, .. } => {
                *stage
            }
            Self::Transport(_) => Stage::Connect,
            Self::Expired { .. }
            | Self::Unparsable(_)
            | Self::NoRecipients
            | Self::PooledDate(_)
            | Self::PoolRead(_)
            | Self::Configuration(_) => Stage::Pool,
            Self::Sink { .. } => Stage::Sink,
        }
    }
}
