//! Mock SMTP server for testing delivery scenarios
//!
//! This module provides a configurable mock SMTP server that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Advertise STARTTLS and AUTH and answer them
//! - Reject individual recipients
//! - Delay the greeting to exercise timeouts
//! - Track received commands for verification
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_auth()
//!     .rejecting_recipient("bob@example.com")
//!     .build()
//!     .await?;
//!
//! // Server is now running on server.addr()
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    StartTls,
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content (after DATA), dot-stuffing intact
    MessageContent(Vec<u8>),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct SmtpResponse {
    code: u16,
    message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    capabilities: Vec<String>,
    rejected_recipients: Vec<String>,
    data_end_response: SmtpResponse,
    connection_delay: Option<Duration>,
}

impl MockServerConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.capabilities.len() - 1;

        for (i, cap) in self.capabilities.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "250{separator}{cap}\r\n");
        }

        response.into_bytes()
    }

    fn advertises(&self, keyword: &str) -> bool {
        self.capabilities
            .iter()
            .skip(1)
            .any(|cap| cap.split_whitespace().next() == Some(keyword))
    }
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            capabilities: vec!["mock.test".to_string(), "SIZE 10000".to_string()],
            rejected_recipients: Vec::new(),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            connection_delay: None,
        }
    }
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get all commands received by the server
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Number of connections accepted so far
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// The message bodies received, in order
    pub async fn messages(&self) -> Vec<Vec<u8>> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(delay) = config.connection_delay {
            tokio::time::sleep(delay).await;
        }

        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();

            let Ok(read) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }

            let cmd_line = line.trim();
            tracing::debug!("Mock server received: {}", cmd_line);

            let (verb, argument) = cmd_line
                .split_once(' ')
                .map_or((cmd_line, ""), |(verb, rest)| (verb, rest));

            let (response, smtp_cmd) = match verb.to_uppercase().as_str() {
                "EHLO" => (config.ehlo_bytes(), SmtpCommand::Ehlo(argument.to_string())),
                "STARTTLS" if config.advertises("STARTTLS") => {
                    // The peer now expects a TLS handshake this server cannot
                    // perform, so the session ends here.
                    commands.write().await.push(SmtpCommand::StartTls);
                    writer
                        .write_all(&SmtpResponse::new(220, "Ready to start TLS").to_bytes())
                        .await?;
                    writer.flush().await?;
                    return Ok(());
                }
                "AUTH" if config.advertises("AUTH") => (
                    SmtpResponse::new(235, "Authentication successful").to_bytes(),
                    SmtpCommand::Auth(argument.to_string()),
                ),
                "MAIL" => (
                    SmtpResponse::new(250, "OK").to_bytes(),
                    SmtpCommand::MailFrom(argument.to_string()),
                ),
                "RCPT" => {
                    let rejected = config
                        .rejected_recipients
                        .iter()
                        .any(|address| argument.contains(&format!("<{address}>")));
                    let response = if rejected {
                        SmtpResponse::new(550, "User unknown")
                    } else {
                        SmtpResponse::new(250, "OK")
                    };
                    (
                        response.to_bytes(),
                        SmtpCommand::RcptTo(argument.to_string()),
                    )
                }
                "DATA" => (
                    SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>").to_bytes(),
                    SmtpCommand::Data,
                ),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer
                        .write_all(&SmtpResponse::new(221, "Bye").to_bytes())
                        .await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => (
                    SmtpResponse::new(502, "Command not implemented").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            commands.write().await.push(smtp_cmd.clone());
            writer.write_all(&response).await?;
            writer.flush().await?;

            if smtp_cmd == SmtpCommand::Data {
                // Read message content until we see <CRLF>.<CRLF>
                let mut message_content = Vec::new();
                let mut data_line = Vec::new();

                loop {
                    data_line.clear();
                    if reader.read_until(b'\n', &mut data_line).await? == 0 {
                        return Ok(());
                    }

                    if data_line == b".\r\n" {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(message_content));
                        writer
                            .write_all(&config.data_end_response.to_bytes())
                            .await?;
                        writer.flush().await?;
                        break;
                    }

                    message_content.extend_from_slice(&data_line);
                }
            }
        }
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Advertise STARTTLS. The server hangs up after accepting it.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.config.capabilities.push("STARTTLS".to_string());
        self
    }

    /// Advertise `AUTH PLAIN` and accept any credentials.
    #[must_use]
    pub fn with_auth(mut self) -> Self {
        self.config.capabilities.push("AUTH PLAIN".to_string());
        self
    }

    /// Answer `RCPT TO:<address>` with 550.
    #[must_use]
    pub fn rejecting_recipient(mut self, address: impl Into<String>) -> Self {
        self.config.rejected_recipients.push(address.into());
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Hold back the greeting
    #[must_use]
    pub const fn with_connection_delay(mut self, delay: Duration) -> Self {
        self.config.connection_delay = Some(delay);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(AtomicUsize::new(0));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);
        let connections_clone = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept connection with timeout to allow checking shutdown flag
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    connections_clone.fetch_add(1, Ordering::Relaxed);
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await
                        {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
            connections,
        })
    }
}
