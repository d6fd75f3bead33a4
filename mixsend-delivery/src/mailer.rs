//! The delivery entry point.
//!
//! [`Mailer`] ties the pieces together: it chooses a sink, decides the
//! transport, resolves the relay, dials it and runs the SMTP transaction.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use mixsend_common::{Config, HIDDEN_SERVICE_SUFFIX, internal};
use mixsend_smtp::SmtpClient;
use tracing::{error, info, warn};

use crate::{
    dialer::{Dialer, PROBE_TIMEOUT, TransportStatus, probe_proxy},
    dns::{DnsError, HickoryMxLookup, HostResolver, MxLookup, ResolvedRelay, SMTP_PORT},
    error::DeliveryError,
    policy::session_uses_anonymizing_transport,
    pool::{PoolOutcome, prepare},
    rotation::RotationMarker,
    sink,
    smtp_transaction::{Envelope, SmtpTransaction},
};

/// Stand-in used when the system resolver configuration cannot be loaded.
/// Every lookup fails, so relays fall back to the recipient's domain.
struct UnavailableLookup(String);

#[async_trait]
impl MxLookup for UnavailableLookup {
    async fn mx_hosts(&self, _domain: &str) -> Result<Vec<String>, DnsError> {
        Err(DnsError::Unavailable(self.0.clone()))
    }
}

/// Sends pooled messages and raw payloads.
pub struct Mailer {
    config: Arc<Config>,
    dialer: Dialer,
    resolver: HostResolver,
}

impl Mailer {
    /// Creates a mailer using the system DNS resolver for MX lookups.
    pub fn new(config: Arc<Config>, marker: Arc<RotationMarker>) -> Self {
        let lookup: Arc<dyn MxLookup> = match HickoryMxLookup::new(config.tor.timeout()) {
            Ok(lookup) => Arc::new(lookup),
            Err(e) => {
                warn!("DNS resolver unavailable, MX relaying will use recipient domains: {e}");
                Arc::new(UnavailableLookup(e.to_string()))
            }
        };

        Self {
            dialer: Dialer::new(&config.tor, marker),
            resolver: HostResolver::new(lookup, config.mail.onion_relay),
            config,
        }
    }

    /// Replaces the MX lookup.
    #[must_use]
    pub fn with_lookup(mut self, lookup: Arc<dyn MxLookup>) -> Self {
        self.resolver = HostResolver::new(lookup, self.config.mail.onion_relay);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Checks that the SOCKS5 proxy is reachable.
    ///
    /// # Errors
    ///
    /// Fails only when the proxy is unreachable and the transport is
    /// required. When it is optional the failure is logged and
    /// [`TransportStatus::Degraded`] is returned.
    pub async fn validate_transport(&self) -> Result<TransportStatus, DeliveryError> {
        let tor = &self.config.tor;
        if !tor.enabled {
            info!("Tor routing disabled - using direct connections");
            return Ok(TransportStatus::Disabled);
        }

        info!("Tor routing enabled - validating configuration");
        match probe_proxy(tor.proxy(), PROBE_TIMEOUT).await {
            Ok(()) => Ok(TransportStatus::Validated),
            Err(e) if tor.required => {
                error!("Tor is required but validation failed: {e}");
                Err(e.into())
            }
            Err(e) => {
                warn!("Tor validation failed, continuing with direct connections: {e}");
                Ok(TransportStatus::Degraded)
            }
        }
    }

    /// Reads a pool file and mails it.
    ///
    /// The outcome says whether the file should be deleted. Successful sends
    /// are left for the caller to remove.
    pub async fn mail_pool_file(&self, path: &Path) -> PoolOutcome {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(file = %path.display(), "Failed to read file for mailing: {e}");
                return PoolOutcome::failed(DeliveryError::PoolRead(e));
            }
        };

        let prepared = match prepare(&raw, &self.config, Utc::now()) {
            Ok(prepared) => prepared,
            Err(e) => {
                info!(file = %path.display(), "Refusing to mail pool file: {e}");
                return PoolOutcome::failed(e);
            }
        };

        match self
            .mail_bytes(&prepared.payload, &prepared.recipients)
            .await
        {
            Ok(()) => PoolOutcome::sent(),
            Err(e) => PoolOutcome::failed(e),
        }
    }

    /// Sends `payload` to `recipients` through the configured sink.
    ///
    /// Sinks are tried in order: outfile, pipe, legacy sendmail, SMTP.
    ///
    /// # Errors
    ///
    /// Returns the failure of the selected sink.
    pub async fn mail_bytes(
        &self,
        payload: &[u8],
        recipients: &[String],
    ) -> Result<(), DeliveryError> {
        internal!("Message recipients are: {}", recipients.join(","));
        let mail = &self.config.mail;

        if mail.outfile {
            sink::write_outfile(&self.config.pool.directory, payload).await?;
            return Ok(());
        }

        if !mail.pipe.is_empty() {
            return sink::pipe(&mail.pipe, payload).await;
        }

        if mail.sendmail {
            return self.legacy_sendmail(payload, recipients).await;
        }

        self.smtp_relay(payload, recipients).await
    }

    /// Chooses the relay for a session.
    ///
    /// The configured smarthost, unless direct MX relaying applies: a single
    /// clearnet recipient on a session that does not use the proxy.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::MalformedAddress`] when the recipient cannot
    /// be split for an MX lookup.
    pub async fn select_relay(
        &self,
        recipients: &[String],
        anonymized: bool,
    ) -> Result<ResolvedRelay, DeliveryError> {
        let mail = &self.config.mail;
        let configured = ResolvedRelay::new(mail.smtp_relay.clone(), mail.smtp_port);

        match recipients {
            [recipient]
                if mail.mx_relay
                    && !anonymized
                    && !recipient
                        .to_ascii_lowercase()
                        .contains(HIDDEN_SERVICE_SUFFIX) =>
            {
                internal!("DNS lookup of MX record for {}", recipient);
                let host = self.resolver.resolve(recipient).await?;
                internal!("Doing direct relay for {} to {}:{}", recipient, host, SMTP_PORT);
                Ok(ResolvedRelay::new(host, SMTP_PORT))
            }
            _ => Ok(configured),
        }
    }

    async fn smtp_relay(&self, payload: &[u8], recipients: &[String]) -> Result<(), DeliveryError> {
        let anonymized =
            session_uses_anonymizing_transport(recipients, &self.config.tor, &self.config.mail);
        let relay = self.select_relay(recipients, anonymized).await?;

        self.send(
            &relay,
            anonymized,
            Envelope {
                sender: self.config.envelope_sender(),
                recipients,
                payload,
            },
        )
        .await?;

        if anonymized {
            internal!("Email sent via Tor to {}", relay);
        } else {
            internal!("Email sent directly to {}", relay);
        }
        Ok(())
    }

    /// Plain SMTP to the smarthost, as the remailer itself.
    ///
    /// Whenever the anonymizing transport is enabled this defers to the
    /// regular SMTP path so nothing bypasses the proxy.
    async fn legacy_sendmail(
        &self,
        payload: &[u8],
        recipients: &[String],
    ) -> Result<(), DeliveryError> {
        if self.config.tor.enabled {
            info!("Tor enabled - routing through SMTP relay instead of direct sendmail");
            return self.smtp_relay(payload, recipients).await;
        }

        let mail = &self.config.mail;
        let relay = ResolvedRelay::new(mail.smtp_relay.clone(), mail.smtp_port);

        self.send(
            &relay,
            false,
            Envelope {
                sender: &self.config.remailer.address,
                recipients,
                payload,
            },
        )
        .await
    }

    async fn send(
        &self,
        relay: &ResolvedRelay,
        anonymized: bool,
        envelope: Envelope<'_>,
    ) -> Result<(), DeliveryError> {
        let mail = &self.config.mail;

        let stream = self.dialer.dial(relay, anonymized).await.inspect_err(|e| {
            warn!(
                relay = %relay,
                recipients = %envelope.recipients.join(","),
                "SMTP dial error: {e}"
            );
        })?;

        if mail.accept_invalid_certs && mail.use_tls {
            internal!(
                level = DEBUG,
                "TLS certificate validation is disabled for {}",
                relay
            );
        }

        let client =
            SmtpClient::new(stream, relay.host.clone()).accept_invalid_certs(mail.accept_invalid_certs);

        SmtpTransaction::new(relay, mail, self.dialer.timeout())
            .execute(client, envelope)
            .await
    }
}
