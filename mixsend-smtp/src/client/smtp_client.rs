//! SMTP client session over an arbitrary stream, with STARTTLS and AUTH PLAIN.

use std::sync::Arc;

use base64::Engine;
use mixsend_common::{incoming, outgoing, tracing};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{
        ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::{
    error::{ClientError, Result},
    response::Response,
    stream::BoxedStream,
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

enum ClientConnection {
    Plain(BoxedStream),
    Tls(Box<TlsStream<BoxedStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Self::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        };

        let config = if accept_invalid_certs {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        } else {
            let mut root_store = RootCertStore::empty();
            let certs = rustls_native_certs::load_native_certs();
            if !certs.errors.is_empty() {
                tracing::warn!(?certs.errors, "Some certificates could not be loaded");
            }
            let (added, ignored) = root_store.add_parsable_certificates(certs.certs);
            tracing::debug!(added, ignored, "Loaded native root certificates");

            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };

        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid server name {domain}: {e}")))?;

        let tls_stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        Ok(Self::Tls(Box::new(tls_stream)))
    }
}

/// Certificate verifier that accepts any relay certificate.
///
/// Relays reached through the overlay network routinely present self-signed
/// certificates; in that mode the TLS layer only protects the hop.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

/// Encodes a message body for the DATA phase.
///
/// Every line ends in CRLF, lines starting with `.` gain an extra leading
/// dot, and the terminating `.` line is appended.
#[must_use]
pub fn encode_data(payload: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(payload.len() + payload.len() / 64 + 5);

    let body = payload.strip_suffix(b"\n").unwrap_or(payload);
    if !payload.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                encoded.push(b'.');
            }
            encoded.extend_from_slice(line);
            encoded.extend_from_slice(b"\r\n");
        }
    }

    encoded.extend_from_slice(b".\r\n");
    encoded
}

/// A client-side SMTP session.
///
/// Every command method returns the server's reply as-is; interpreting reply
/// codes is left to the caller. Errors are reserved for I/O, TLS and
/// malformed replies.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    responses: Vec<Response>,
    capabilities: Option<Response>,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Wraps an already-connected stream.
    ///
    /// `server_domain` is the name used for TLS server name indication when
    /// the session is upgraded.
    pub fn new(stream: BoxedStream, server_domain: impl Into<String>) -> Self {
        Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            responses: Vec::new(),
            capabilities: None,
            server_domain: server_domain.into(),
            accept_invalid_certs: false,
        }
    }

    /// Sets whether STARTTLS accepts certificates that fail validation.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(format!("{line}\r\n").as_bytes())
            .await
    }

    /// Sends a raw command and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.send_line(command).await?;
        self.read_response().await
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        let response = self.command(&format!("EHLO {domain}")).await?;
        self.capabilities = response.is_success().then(|| response.clone());
        Ok(response)
    }

    /// Whether the last successful EHLO advertised `keyword`.
    #[must_use]
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|ehlo| ehlo.has_extension(keyword))
    }

    /// Sends STARTTLS and, on a 2xx reply, upgrades the connection.
    ///
    /// Extensions learned before the upgrade are discarded; EHLO must be
    /// issued again.
    ///
    /// # Errors
    ///
    /// Returns an error if the command or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let old = self.connection.take().ok_or(ClientError::ConnectionClosed)?;
            self.connection = Some(
                old.upgrade_to_tls(&self.server_domain, self.accept_invalid_certs)
                    .await?,
            );
            // Anything buffered before the handshake was not protected by it.
            self.buffer_pos = 0;
            self.capabilities = None;
        }

        Ok(response)
    }

    /// Authenticates with the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("\0{username}\0{password}"));

        outgoing!("AUTH PLAIN <redacted>");
        self.send_line(&format!("AUTH PLAIN {token}")).await?;
        self.read_response().await
    }

    /// Sends MAIL FROM.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// Sends RCPT TO.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Sends DATA.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message body, dot-stuffed, followed by the end-of-data line.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn send_data(&mut self, payload: &[u8]) -> Result<Response> {
        let encoded = encode_data(payload);
        outgoing!("<{} bytes of message data>", encoded.len());

        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(&encoded)
            .await?;

        self.read_response().await
    }

    /// Sends QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Every reply received so far, in order.
    #[must_use]
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                self.responses.push(response.clone());

                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}
