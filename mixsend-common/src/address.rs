use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::MalformedAddress;

/// Domain suffix of hidden services that are only reachable through the
/// anonymizing overlay, and never through public DNS.
pub const HIDDEN_SERVICE_SUFFIX: &str = ".onion";

/// Returns `true` if `host` names a hidden service.
///
/// A trailing root dot (as returned in MX answers) is ignored, and the
/// comparison is case-insensitive.
pub fn is_hidden_service(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    host.len() >= HIDDEN_SERVICE_SUFFIX.len()
        && host.is_char_boundary(host.len() - HIDDEN_SERVICE_SUFFIX.len())
        && host[host.len() - HIDDEN_SERVICE_SUFFIX.len()..]
            .eq_ignore_ascii_case(HIDDEN_SERVICE_SUFFIX)
}

/// An email address split into its local part and domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub local_part: String,
    pub domain: String,
}

impl Address {
    /// Splits `raw` on its single `@` separator.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedAddress`] if `raw` contains no `@`, or more than one.
    pub fn parse(raw: &str) -> Result<Self, MalformedAddress> {
        let mut parts = raw.split('@');

        match (parts.next(), parts.next(), parts.next()) {
            (Some(local_part), Some(domain), None) => Ok(Self {
                local_part: local_part.to_string(),
                domain: domain.to_string(),
            }),
            (_, None, _) => Err(MalformedAddress::MissingSeparator(raw.to_string())),
            _ => Err(MalformedAddress::TooManySeparators(raw.to_string())),
        }
    }

    /// Whether this address is hosted on a hidden service.
    pub fn is_hidden_service(&self) -> bool {
        is_hidden_service(&self.domain)
    }
}

impl FromStr for Address {
    type Err = MalformedAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}
