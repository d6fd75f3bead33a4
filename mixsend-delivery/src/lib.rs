//! Outbound delivery for the mixsend remailer.
//!
//! This crate provides functionality to:
//! - Decide per session whether to use the anonymizing SOCKS5 transport
//! - Resolve relay hosts, keeping hidden-service names out of public DNS
//! - Drive SMTP sessions over direct or proxied connections
//! - Rotate anonymity circuits on a schedule
//! - Age, rewrite and flush messages waiting in the outbound pool

mod dialer;
mod dns;
mod error;
mod mailer;
pub mod message;
pub mod policy;
pub mod pool;
mod rotation;
mod sink;
mod smtp_transaction;

pub use dialer::{Dialer, PROBE_TIMEOUT, TransportStatus, probe_proxy};
pub use dns::{DnsError, HickoryMxLookup, HostResolver, MxLookup, ResolvedRelay, SMTP_PORT};
pub use error::{DeliveryError, Stage, TransportError};
pub use mailer::Mailer;
pub use pool::{FlushReport, PoolOutcome, PreparedMessage, flush};
pub use rotation::{CircuitRotation, ISOLATION_USERNAME, RotationMarker};
pub use sink::OUTFILE_PREFIX;
pub use smtp_transaction::{Envelope, QUIT_GRACE, SmtpTransaction};
