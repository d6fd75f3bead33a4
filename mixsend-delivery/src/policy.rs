//! Transport and TLS decisions. Everything here is pure.

use mixsend_common::{
    HIDDEN_SERVICE_SUFFIX,
    config::{MailConfig, TorConfig},
};

use crate::dns::ResolvedRelay;

/// Whether a session carrying `recipient` must go through the anonymizing
/// proxy.
///
/// Hidden-service recipients always do when the transport is enabled; other
/// recipients only when every session is forced through it.
pub fn use_anonymizing_transport(recipient: &str, tor: &TorConfig, mail: &MailConfig) -> bool {
    if !tor.enabled {
        return false;
    }

    if recipient
        .to_ascii_lowercase()
        .contains(HIDDEN_SERVICE_SUFFIX)
    {
        return true;
    }

    mail.force_tor_smtp
}

/// Whether a session to all of `recipients` must use the proxy.
///
/// One recipient requiring it is enough for the whole session.
pub fn session_uses_anonymizing_transport<S: AsRef<str>>(
    recipients: &[S],
    tor: &TorConfig,
    mail: &MailConfig,
) -> bool {
    recipients
        .iter()
        .any(|recipient| use_anonymizing_transport(recipient.as_ref(), tor, mail))
}

/// Whether to issue STARTTLS once the relay's extensions are known.
pub fn should_starttls(relay: &ResolvedRelay, advertised: bool, mail: &MailConfig) -> bool {
    if !advertised || !mail.use_tls {
        return false;
    }

    !(mail.disable_tls_onion && relay.is_hidden_service())
}

/// Whether to authenticate once the relay's extensions are known.
pub fn should_authenticate(advertised: bool, mail: &MailConfig) -> bool {
    advertised && mail.credentials().is_some()
}
