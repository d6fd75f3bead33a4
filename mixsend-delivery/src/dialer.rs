//! Opening byte streams to relays, directly or through the SOCKS5 proxy.

use std::{sync::Arc, time::Duration};

use fast_socks5::{
    AuthenticationMethod, Socks5Command,
    client::{Config as SocksConfig, Socks5Stream},
    util::target_addr::TargetAddr,
};
use mixsend_common::{config::TorConfig, outgoing};
use mixsend_smtp::BoxedStream;
use tokio::{net::TcpStream, time::timeout};
use tracing::{info, warn};

use crate::{
    dns::ResolvedRelay,
    error::{Stage, TransportError},
    rotation::RotationMarker,
};

/// Bound on the startup reachability probe of the proxy.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How the anonymizing transport fared at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// The transport is not enabled.
    Disabled,
    /// The proxy accepted a TCP connection.
    Validated,
    /// The proxy was unreachable but is not required. Ordinary recipients
    /// go direct; hidden-service recipients will fail at dial time.
    Degraded,
}

/// Checks that the proxy at `proxy` accepts TCP connections within `within`.
///
/// # Errors
///
/// Returns [`TransportError::ProxyUnreachable`] if the connection is refused,
/// or [`TransportError::Timeout`] if it does not complete in time.
pub async fn probe_proxy(proxy: &str, within: Duration) -> Result<(), TransportError> {
    match timeout(within, TcpStream::connect(proxy)).await {
        Ok(Ok(_)) => {
            info!(proxy, "Tor proxy validated");
            Ok(())
        }
        Ok(Err(source)) => Err(TransportError::ProxyUnreachable {
            proxy: proxy.to_string(),
            source,
        }),
        Err(_) => Err(TransportError::Timeout {
            stage: Stage::Connect,
            target: proxy.to_string(),
            after: within,
        }),
    }
}

/// Opens streams to relays, bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct Dialer {
    proxy: String,
    timeout: Duration,
    marker: Arc<RotationMarker>,
}

impl Dialer {
    pub fn new(tor: &TorConfig, marker: Arc<RotationMarker>) -> Self {
        Self {
            proxy: tor.proxy().to_string(),
            timeout: tor.timeout(),
            marker,
        }
    }

    /// The bound applied to every dial.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connects to `relay`, through the proxy when `anonymized` is set.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] describing why no stream could be opened.
    /// Failed dials are not retried.
    pub async fn dial(
        &self,
        relay: &ResolvedRelay,
        anonymized: bool,
    ) -> Result<BoxedStream, TransportError> {
        let dial = async {
            if anonymized {
                self.anonymized(relay).await
            } else {
                self.direct(relay).await
            }
        };

        timeout(self.timeout, dial)
            .await
            .map_err(|_| TransportError::Timeout {
                stage: Stage::Connect,
                target: relay.to_string(),
                after: self.timeout,
            })?
    }

    async fn direct(&self, relay: &ResolvedRelay) -> Result<BoxedStream, TransportError> {
        outgoing!("Dialing {relay} directly");

        let stream = TcpStream::connect((relay.host.as_str(), relay.port))
            .await
            .map_err(|source| {
                warn!(relay = %relay, "Direct SMTP dial error: {source}");
                TransportError::Connect {
                    target: relay.to_string(),
                    source,
                }
            })?;

        Ok(Box::new(stream))
    }

    async fn anonymized(&self, relay: &ResolvedRelay) -> Result<BoxedStream, TransportError> {
        outgoing!("Dialing {relay} through SOCKS5 proxy {}", self.proxy);

        let socket = TcpStream::connect(self.proxy.as_str())
            .await
            .map_err(|source| {
                warn!(proxy = %self.proxy, "SOCKS5 proxy unreachable: {source}");
                TransportError::ProxyUnreachable {
                    proxy: self.proxy.clone(),
                    source,
                }
            })?;

        let rejected = |reason: String| {
            warn!(proxy = %self.proxy, relay = %relay, "Tor SMTP dial error: {reason}");
            TransportError::ProxyRejected {
                proxy: self.proxy.clone(),
                target: relay.to_string(),
                reason,
            }
        };

        let auth = self
            .marker
            .socks_credentials()
            .map(|(username, password)| AuthenticationMethod::Password { username, password });

        let mut socks = Socks5Stream::use_stream(socket, auth, SocksConfig::default())
            .await
            .map_err(|e| rejected(e.to_string()))?;

        // The hostname goes to the proxy unresolved so hidden services work.
        socks
            .request(
                Socks5Command::TCPConnect,
                TargetAddr::Domain(relay.host.clone(), relay.port),
            )
            .await
            .map_err(|e| rejected(e.to_string()))?;

        Ok(Box::new(socks.get_socket()))
    }
}
