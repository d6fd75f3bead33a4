//! Relay host resolution for direct MX delivery.
//!
//! Hidden-service domains are never looked up in public DNS: the overlay
//! network resolves them inside the SOCKS5 proxy. For everything else the
//! recipient's MX records are consulted, and any lookup failure falls back to
//! the domain itself rather than failing the delivery.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use hickory_resolver::{
    TokioResolver, config::ResolverOpts, name_server::TokioConnectionProvider,
};
use mixsend_common::{Address, MalformedAddress, internal, is_hidden_service};
use thiserror::Error;
use tracing::{debug, info};

/// Port used when delivering straight to an MX host.
pub const SMTP_PORT: u16 = 25;

/// Errors that can occur during an MX lookup.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DNS lookup failed: {0}")]
    LookupFailed(#[from] hickory_resolver::ResolveError),

    #[error("DNS lookup for {0} timed out")]
    Timeout(String),

    #[error("DNS resolver unavailable: {0}")]
    Unavailable(String),
}

/// The SMTP endpoint for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelay {
    pub host: String,
    pub port: u16,
}

impl ResolvedRelay {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Whether the relay is a hidden service.
    pub fn is_hidden_service(&self) -> bool {
        is_hidden_service(&self.host)
    }
}

impl fmt::Display for ResolvedRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Source of MX answers.
#[async_trait]
pub trait MxLookup: Send + Sync {
    /// MX exchange hosts for `domain`, most preferred first.
    async fn mx_hosts(&self, domain: &str) -> Result<Vec<String>, DnsError>;
}

/// [`MxLookup`] backed by the system resolver configuration.
#[derive(Debug)]
pub struct HickoryMxLookup {
    resolver: TokioResolver,
}

impl HickoryMxLookup {
    /// Creates a lookup using the system resolver with the given query timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new(timeout: Duration) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?
            .with_options(opts)
            .build();

        Ok(Self { resolver })
    }
}

#[async_trait]
impl MxLookup for HickoryMxLookup {
    async fn mx_hosts(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let lookup = self.resolver.mx_lookup(domain).await?;

        let mut records: Vec<(u16, String)> = lookup
            .iter()
            .map(|mx| (mx.preference(), mx.exchange().to_utf8()))
            .collect();
        records.sort_by_key(|(preference, _)| *preference);

        Ok(records.into_iter().map(|(_, host)| host).collect())
    }
}

/// Picks the host to contact for a recipient.
#[derive(Clone)]
pub struct HostResolver {
    lookup: Arc<dyn MxLookup>,
    onion_relay: bool,
}

impl HostResolver {
    /// `onion_relay` allows hidden-service hosts found in MX answers.
    pub fn new(lookup: Arc<dyn MxLookup>, onion_relay: bool) -> Self {
        Self {
            lookup,
            onion_relay,
        }
    }

    /// Returns the relay host for `recipient`.
    ///
    /// DNS failures never surface as errors: the recipient's domain is used
    /// instead.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedAddress`] if `recipient` is not a valid address.
    pub async fn resolve(&self, recipient: &str) -> Result<String, MalformedAddress> {
        let address = Address::parse(recipient)?;

        if address.is_hidden_service() {
            internal!(
                "Detected hidden service address {}, skipping DNS",
                address.domain
            );
            return Ok(address.domain);
        }

        let hosts = match self.lookup.mx_hosts(&address.domain).await {
            Ok(hosts) => hosts,
            Err(e) => {
                info!(domain = %address.domain, "MX lookup failed ({e}), using domain as relay");
                return Ok(address.domain);
            }
        };

        let relay = hosts
            .iter()
            .filter(|host| self.onion_relay || !is_hidden_service(host))
            .map(|host| host.trim_end_matches('.'))
            .find(|host| !host.is_empty());

        match relay {
            Some(relay) => {
                debug!(domain = %address.domain, relay, "Resolved MX relay");
                Ok(relay.to_string())
            }
            None => {
                info!(domain = %address.domain, "No usable MX records, using domain as relay");
                Ok(address.domain)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct StaticLookup {
        answer: Option<Vec<&'static str>>,
        queries: AtomicUsize,
    }

    impl StaticLookup {
        fn answering(hosts: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                answer: Some(hosts.to_vec()),
                queries: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: None,
                queries: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MxLookup for StaticLookup {
        async fn mx_hosts(&self, domain: &str) -> Result<Vec<String>, DnsError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.answer.as_ref().map_or_else(
                || Err(DnsError::Timeout(domain.to_string())),
                |hosts| Ok(hosts.iter().map(ToString::to_string).collect()),
            )
        }
    }

    #[tokio::test]
    async fn test_onion_never_queries_dns() {
        let lookup = StaticLookup::answering(&["mx.example.com."]);
        let resolver = HostResolver::new(lookup.clone(), false);

        let relay = resolver.resolve("user@abcdefgh.onion").await.unwrap();
        assert_eq!(relay, "abcdefgh.onion");
        assert_eq!(lookup.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_mx_wins() {
        let resolver = HostResolver::new(
            StaticLookup::answering(&["mx1.example.com.", "mx2.example.com."]),
            false,
        );
        assert_eq!(
            resolver.resolve("user@example.com").await.unwrap(),
            "mx1.example.com"
        );
    }

    #[tokio::test]
    async fn test_onion_mx_skipped_unless_allowed() {
        let lookup = StaticLookup::answering(&["hidden.onion.", "mx.example.com."]);

        let resolver = HostResolver::new(lookup.clone(), false);
        assert_eq!(
            resolver.resolve("user@example.com").await.unwrap(),
            "mx.example.com"
        );

        let resolver = HostResolver::new(lookup, true);
        assert_eq!(
            resolver.resolve("user@example.com").await.unwrap(),
            "hidden.onion"
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_falls_back_to_domain() {
        let resolver = HostResolver::new(StaticLookup::failing(), false);
        assert_eq!(
            resolver.resolve("user@example.com").await.unwrap(),
            "example.com"
        );
    }

    #[tokio::test]
    async fn test_only_onion_mx_falls_back_to_domain() {
        let resolver = HostResolver::new(StaticLookup::answering(&["hidden.onion."]), false);
        assert_eq!(
            resolver.resolve("user@example.com").await.unwrap(),
            "example.com"
        );

        let resolver = HostResolver::new(StaticLookup::answering(&[]), false);
        assert_eq!(
            resolver.resolve("user@example.com").await.unwrap(),
            "example.com"
        );
    }

    #[tokio::test]
    async fn test_malformed_address_propagates() {
        let resolver = HostResolver::new(StaticLookup::failing(), false);
        assert_eq!(
            resolver.resolve("no-at-sign").await,
            Err(MalformedAddress::MissingSeparator("no-at-sign".to_string()))
        );
        assert!(resolver.resolve("a@b@c").await.is_err());
    }

    #[test]
    fn test_relay_display() {
        let relay = ResolvedRelay::new("mx.example.com", SMTP_PORT);
        assert_eq!(relay.to_string(), "mx.example.com:25");
        assert!(!relay.is_hidden_service());
        assert!(ResolvedRelay::new("abc.onion", 25).is_hidden_service());
    }
}
