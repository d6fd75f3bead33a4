//! Outbound mail configuration.
//!
//! Relay selection, TLS behaviour, credentials, outbound identity and the
//! alternate delivery sinks.

use serde::{Deserialize, Serialize};

/// Settings for outbound SMTP and the alternate sinks.
#[allow(
    clippy::struct_excessive_bools,
    reason = "Each flag maps to an independent operator switch"
)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailConfig {
    /// Smarthost used unless direct MX relaying applies.
    ///
    /// Default: `127.0.0.1`
    #[serde(default = "defaults::smtp_relay")]
    pub smtp_relay: String,

    /// Port of the smarthost.
    ///
    /// Default: 25
    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,

    /// Name announced in EHLO. Empty announces the relay host itself.
    #[serde(default)]
    pub helo_name: String,

    /// Upgrade with STARTTLS whenever the relay offers it.
    ///
    /// Default: `true`
    #[serde(default = "defaults::enabled")]
    pub use_tls: bool,

    /// Skip STARTTLS when the relay is a hidden service.
    ///
    /// Default: `true`
    #[serde(default = "defaults::enabled")]
    pub disable_tls_onion: bool,

    /// Accept relay certificates that fail validation.
    ///
    /// Default: `true`
    #[serde(default = "defaults::enabled")]
    pub accept_invalid_certs: bool,

    /// AUTH username. Authentication is attempted only with both halves set.
    #[serde(default)]
    pub username: String,

    /// AUTH password.
    #[serde(default)]
    pub password: String,

    /// Envelope sender override. Empty means the remailer address.
    #[serde(default)]
    pub sender: String,

    /// Display name placed in rewritten `From` headers.
    ///
    /// Default: `Anonymous Remailer`
    #[serde(default = "defaults::outbound_name")]
    pub outbound_name: String,

    /// Address placed in rewritten `From` headers.
    ///
    /// Default: `remailer@domain.invalid`
    #[serde(default = "defaults::outbound_addy")]
    pub outbound_addy: String,

    /// Keep the original `From` display name and address.
    #[serde(default)]
    pub custom_from: bool,

    /// Deliver single-recipient mail straight to the recipient's MX.
    #[serde(default)]
    pub mx_relay: bool,

    /// Allow hidden-service hosts advertised in MX answers.
    #[serde(default)]
    pub onion_relay: bool,

    /// Route every SMTP session through the anonymizing transport.
    #[serde(default)]
    pub force_tor_smtp: bool,

    /// Write each message to a file in the pool directory instead of sending.
    #[serde(default)]
    pub outfile: bool,

    /// Pipe each message to this command instead of sending.
    #[serde(default)]
    pub pipe: String,

    /// Use the legacy direct-send path to the smarthost.
    #[serde(default)]
    pub sendmail: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_relay: defaults::smtp_relay(),
            smtp_port: defaults::smtp_port(),
            helo_name: String::new(),
            use_tls: true,
            disable_tls_onion: true,
            accept_invalid_certs: true,
            username: String::new(),
            password: String::new(),
            sender: String::new(),
            outbound_name: defaults::outbound_name(),
            outbound_addy: defaults::outbound_addy(),
            custom_from: false,
            mx_relay: false,
            onion_relay: false,
            force_tor_smtp: false,
            outfile: false,
            pipe: String::new(),
            sendmail: false,
        }
    }
}

impl MailConfig {
    /// Username and password, when both are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }

    /// Name to announce in EHLO when talking to `relay`.
    #[must_use]
    pub fn ehlo_name<'a>(&'a self, relay: &'a str) -> &'a str {
        if self.helo_name.is_empty() {
            relay
        } else {
            &self.helo_name
        }
    }

    /// `Name <address>` used whenever the outbound identity replaces `From`.
    #[must_use]
    pub fn outbound_from(&self) -> String {
        format!("{} <{}>", self.outbound_name, self.outbound_addy)
    }
}

mod defaults {
    pub fn smtp_relay() -> String {
        "127.0.0.1".to_string()
    }

    pub const fn smtp_port() -> u16 {
        25
    }

    pub const fn enabled() -> bool {
        true
    }

    pub fn outbound_name() -> String {
        "Anonymous Remailer".to_string()
    }

    pub fn outbound_addy() -> String {
        "remailer@domain.invalid".to_string()
    }
}
