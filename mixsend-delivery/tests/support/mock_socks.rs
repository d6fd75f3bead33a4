//! Minimal SOCKS5 proxy for testing anonymized delivery
//!
//! Speaks just enough of RFC 1928 and RFC 1929 to accept a CONNECT request,
//! records what the client asked for, and splices the connection onto a fixed
//! upstream (normally a `MockSmtpServer`) whatever the requested target.
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::RwLock,
};

const VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const USER_PASS: u8 = 0x02;
const CONNECT: u8 = 0x01;

/// One CONNECT request as seen by the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    /// Requested host, exactly as sent
    pub host: String,
    pub port: u16,
    /// Username and password, when the client authenticated
    pub credentials: Option<(String, String)>,
}

pub struct MockSocksProxy {
    addr: SocketAddr,
    requests: Arc<RwLock<Vec<SocksRequest>>>,
}

impl MockSocksProxy {
    /// Starts a proxy forwarding every request to `upstream`
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy fails to bind to a port
    pub async fn start(upstream: SocketAddr) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(RwLock::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    if let Err(e) = Self::handle_client(stream, upstream, recorded).await {
                        tracing::debug!("Mock proxy client error: {}", e);
                    }
                });
            }
        });

        Ok(Self { addr, requests })
    }

    #[must_use]
    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    pub async fn requests(&self) -> Vec<SocksRequest> {
        self.requests.read().await.clone()
    }

    async fn handle_client(
        mut client: TcpStream,
        upstream: SocketAddr,
        requests: Arc<RwLock<Vec<SocksRequest>>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Method negotiation
        let mut header = [0u8; 2];
        client.read_exact(&mut header).await?;
        let mut methods = vec![0u8; usize::from(header[1])];
        client.read_exact(&mut methods).await?;

        let credentials = if methods.contains(&USER_PASS) {
            client.write_all(&[VERSION, USER_PASS]).await?;
            Some(Self::read_credentials(&mut client).await?)
        } else {
            client.write_all(&[VERSION, NO_AUTH]).await?;
            None
        };

        // Request
        let mut request = [0u8; 4];
        client.read_exact(&mut request).await?;
        if request[1] != CONNECT {
            return Err("unsupported SOCKS5 command".into());
        }

        let host = match request[3] {
            0x01 => {
                let mut octets = [0u8; 4];
                client.read_exact(&mut octets).await?;
                std::net::Ipv4Addr::from(octets).to_string()
            }
            0x03 => {
                let len = client.read_u8().await?;
                let mut name = vec![0u8; usize::from(len)];
                client.read_exact(&mut name).await?;
                String::from_utf8(name)?
            }
            0x04 => {
                let mut octets = [0u8; 16];
                client.read_exact(&mut octets).await?;
                std::net::Ipv6Addr::from(octets).to_string()
            }
            other => return Err(format!("unknown address type {other}").into()),
        };
        let port = client.read_u16().await?;

        requests.write().await.push(SocksRequest {
            host,
            port,
            credentials,
        });

        let mut server = TcpStream::connect(upstream).await?;
        client
            .write_all(&[VERSION, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 0])
            .await?;

        tokio::io::copy_bidirectional(&mut client, &mut server).await?;
        Ok(())
    }

    async fn read_credentials(
        client: &mut TcpStream,
    ) -> Result<(String, String), Box<dyn std::error::Error + Send + Sync>> {
        let _version = client.read_u8().await?;

        let len = client.read_u8().await?;
        let mut username = vec![0u8; usize::from(len)];
        client.read_exact(&mut username).await?;

        let len = client.read_u8().await?;
        let mut password = vec![0u8; usize::from(len)];
        client.read_exact(&mut password).await?;

        client.write_all(&[0x01, 0x00]).await?;
        Ok((String::from_utf8(username)?, String::from_utf8(password)?))
    }
}
