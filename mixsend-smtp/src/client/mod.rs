//! SMTP client implementation.
//!
//! This module provides the client half of an SMTP conversation:
//!
//! - Greeting and EHLO with capability tracking
//! - STARTTLS upgrade over any stream, with optional certificate validation
//! - AUTH PLAIN
//! - MAIL FROM / RCPT TO / DATA with dot-stuffing
//! - QUIT
//!
//! # Examples
//!
//! ```no_run
//! use mixsend_smtp::client::SmtpClient;
//! use tokio::net::TcpStream;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:2525").await?;
//! let mut client = SmtpClient::new(Box::new(stream), "mail.example.com");
//!
//! client.read_greeting().await?;
//! client.ehlo("localhost").await?;
//! client.mail_from("sender@example.com").await?;
//! client.rcpt_to("recipient@example.com").await?;
//! client.data().await?;
//! client.send_data(b"Subject: Test\n\nHello World\n").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod response;
mod smtp_client;
mod stream;

pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::{SmtpClient, encode_data};
pub use stream::{AsyncStream, BoxedStream};
