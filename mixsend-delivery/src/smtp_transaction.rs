//! SMTP transaction execution module
//!
//! Drives one SMTP session over an already dialed stream:
//! greeting, EHLO, optional STARTTLS (followed by a second EHLO), optional
//! AUTH PLAIN, MAIL FROM, one RCPT TO per recipient, DATA and QUIT.
//!
//! Every network step is bounded by the same timeout. QUIT is attempted on
//! the way out whether or not the transaction succeeded; after a timeout it
//! only gets [`QUIT_GRACE`], so a stalled session is abandoned promptly.

use std::{future::Future, time::Duration};

use mixsend_common::config::MailConfig;
use mixsend_smtp::{ClientError, Response, SmtpClient};
use tracing::{debug, warn};

use crate::{
    dns::ResolvedRelay,
    error::{DeliveryError, Stage, TransportError},
    policy::{should_authenticate, should_starttls},
};

/// Bound on QUIT once a step has already timed out.
pub const QUIT_GRACE: Duration = Duration::from_millis(500);

/// What to send and to whom.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    pub sender: &'a str,
    pub recipients: &'a [String],
    pub payload: &'a [u8],
}

/// A single SMTP transaction against one relay.
pub struct SmtpTransaction<'a> {
    relay: &'a ResolvedRelay,
    mail: &'a MailConfig,
    timeout: Duration,
}

impl<'a> SmtpTransaction<'a> {
    #[must_use]
    pub const fn new(relay: &'a ResolvedRelay, mail: &'a MailConfig, timeout: Duration) -> Self {
        Self {
            relay,
            mail,
            timeout,
        }
    }

    /// Runs the transaction to completion over `client`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Protocol`] when the relay refuses a step or the
    /// session breaks, and [`TransportError::Timeout`] when a step stalls.
    pub async fn execute(
        &self,
        mut client: SmtpClient,
        envelope: Envelope<'_>,
    ) -> Result<(), DeliveryError> {
        let result = self.converse(&mut client, envelope).await;

        let quit_bound = match &result {
            Err(DeliveryError::Transport(TransportError::Timeout { .. })) => {
                QUIT_GRACE.min(self.timeout)
            }
            _ => self.timeout,
        };

        match tokio::time::timeout(quit_bound, client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(relay = %self.relay, "QUIT failed: {e}"),
            Err(_) => warn!(
                relay = %self.relay,
                timeout = ?quit_bound,
                "QUIT timed out"
            ),
        }

        result
    }

    async fn converse(
        &self,
        client: &mut SmtpClient,
        envelope: Envelope<'_>,
    ) -> Result<(), DeliveryError> {
        let greeting = self.step(Stage::Greeting, client.read_greeting()).await?;
        self.expect(Stage::Greeting, &greeting, Response::is_success)?;

        self.ehlo(client).await?;

        if should_starttls(self.relay, client.has_extension("STARTTLS"), self.mail) {
            let reply = self.step(Stage::StartTls, client.starttls()).await?;
            self.expect(Stage::StartTls, &reply, Response::is_success)?;
            debug!(relay = %self.relay, "STARTTLS negotiated");
            self.ehlo(client).await?;
        }

        if should_authenticate(client.has_extension("AUTH"), self.mail)
            && let Some((username, password)) = self.mail.credentials()
        {
            let reply = self
                .step(Stage::Auth, client.auth_plain(username, password))
                .await?;
            self.expect(Stage::Auth, &reply, Response::is_success)?;
        }

        let reply = self
            .step(Stage::MailFrom, client.mail_from(envelope.sender))
            .await?;
        self.expect(Stage::MailFrom, &reply, Response::is_success)?;

        for recipient in envelope.recipients {
            let reply = self.step(Stage::RcptTo, client.rcpt_to(recipient)).await?;
            if !reply.is_success() {
                warn!(
                    recipient = %recipient,
                    relay = %self.relay,
                    code = reply.code,
                    "SMTP RCPT error"
                );
                return Err(DeliveryError::rejected(
                    Stage::RcptTo,
                    &self.relay.to_string(),
                    reply.code,
                    &reply.message(),
                ));
            }
        }

        let reply = self.step(Stage::Data, client.data()).await?;
        self.expect(Stage::Data, &reply, Response::is_intermediate)?;

        let reply = self
            .step(Stage::Data, client.send_data(envelope.payload))
            .await?;
        self.expect(Stage::Data, &reply, Response::is_success)?;

        Ok(())
    }

    async fn ehlo(&self, client: &mut SmtpClient) -> Result<(), DeliveryError> {
        let name = self.mail.ehlo_name(&self.relay.host);
        let reply = self.step(Stage::Ehlo, client.ehlo(name)).await?;
        self.expect(Stage::Ehlo, &reply, Response::is_success)
    }

    async fn step<T>(
        &self,
        stage: Stage,
        operation: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, DeliveryError> {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(relay = %self.relay, stage = %stage, "SMTP error: {e}");
                Err(DeliveryError::protocol(stage, &self.relay.to_string(), &e))
            }
            Err(_) => Err(TransportError::Timeout {
                stage,
                target: self.relay.to_string(),
                after: self.timeout,
            }
            .into()),
        }
    }

    fn expect(
        &self,
        stage: Stage,
        reply: &Response,
        accepted: fn(&Response) -> bool,
    ) -> Result<(), DeliveryError> {
        if accepted(reply) {
            return Ok(());
        }

        warn!(
            relay = %self.relay,
            stage = %stage,
            code = reply.code,
            "Unexpected SMTP reply"
        );
        Err(DeliveryError::rejected(
            stage,
            &self.relay.to_string(),
            reply.code,
            &reply.message(),
        ))
    }
}
