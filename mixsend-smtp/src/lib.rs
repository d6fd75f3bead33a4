//! SMTP client used by mixsend to hand messages to relays.
//!
//! The client is transport-agnostic: it runs over anything implementing
//! [`client::AsyncStream`], so the same session code drives a plain TCP
//! connection or a SOCKS5 tunnel, and can upgrade either with STARTTLS.

pub mod client;

pub use client::{AsyncStream, BoxedStream, ClientError, Response, SmtpClient};
