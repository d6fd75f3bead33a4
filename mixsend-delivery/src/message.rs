//! Pooled message representation and header policy.

use chrono::{DateTime, NaiveDate, TimeZone};
use mailparse::{MailAddr, addrparse};
use mixsend_common::{config::MailConfig, internal};
use tracing::warn;
use ulid::Ulid;

use crate::error::DeliveryError;

/// Marker recording the day a message entered the pool.
pub const POOLED_DATE_HEADER: &str = "Yamn-Pooled-Date";

/// Prefix of bookkeeping headers that must never leave the remailer.
pub const INTERNAL_HEADER_PREFIX: &str = "Yamn-";

const SHORT_DATE_PARSE: &str = "%d %b %Y";
const SHORT_DATE_FORMAT: &str = "%-d %b %Y";
const RFC5322_DATE_FORMAT: &str = "%a, %-d %b %Y %H:%M:%S %z";

/// Parses a pooled-date marker such as `2 Jan 2006`.
///
/// # Errors
///
/// Returns [`DeliveryError::PooledDate`] if `value` is not a short date.
pub fn parse_short_date(value: &str) -> Result<NaiveDate, DeliveryError> {
    NaiveDate::parse_from_str(value.trim(), SHORT_DATE_PARSE)
        .map_err(|_| DeliveryError::PooledDate(value.to_string()))
}

pub fn format_short_date(date: NaiveDate) -> String {
    date.format(SHORT_DATE_FORMAT).to_string()
}

/// Formats `at` for a `Date` header.
pub fn rfc5322_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(RFC5322_DATE_FORMAT).to_string()
}

/// A fresh `Message-Id` value under `domain`.
pub fn message_id(domain: &str) -> String {
    format!("<{}@{domain}>", Ulid::new().to_string().to_ascii_lowercase())
}

fn is_internal(name: &str) -> bool {
    name.get(..INTERNAL_HEADER_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(INTERNAL_HEADER_PREFIX))
}

/// Flattens groups and returns `(display name, address)` pairs.
fn mailboxes(value: &str) -> Option<Vec<(Option<String>, String)>> {
    let list = addrparse(value).ok()?;

    Some(
        list.iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(single) => vec![(single.display_name.clone(), single.addr.clone())],
                MailAddr::Group(group) => group
                    .addrs
                    .iter()
                    .map(|single| (single.display_name.clone(), single.addr.clone()))
                    .collect(),
            })
            .collect(),
    )
}

/// The `From` header to send, given the original one.
///
/// - Missing, empty or unparsable: the outbound identity.
/// - `custom_from` set: the original display name and address.
/// - No display name: the outbound identity.
/// - Otherwise: the original display name with the outbound address.
pub fn outbound_from(original: Option<&str>, mail: &MailConfig) -> String {
    let first = original
        .and_then(mailboxes)
        .and_then(|list| list.into_iter().next());

    match first {
        None => mail.outbound_from(),
        Some((name, addr)) if mail.custom_from => {
            format!("{} <{addr}>", name.unwrap_or_default())
        }
        Some((None, _)) => mail.outbound_from(),
        Some((Some(name), _)) if name.is_empty() => mail.outbound_from(),
        Some((Some(name), _)) => format!("{name} <{}>", mail.outbound_addy),
    }
}

/// A message as stored in the outbound pool: ordered headers and a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMessage {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl PoolMessage {
    /// Splits `raw` into unfolded headers and the body.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Unparsable`] if the header block is malformed
    /// or missing.
    pub fn parse(raw: &[u8]) -> Result<Self, DeliveryError> {
        let (parsed, body_offset) =
            mailparse::parse_headers(raw).map_err(|e| DeliveryError::Unparsable(e.to_string()))?;

        if parsed.is_empty() {
            return Err(DeliveryError::Unparsable(
                "message has no headers".to_string(),
            ));
        }

        let headers = parsed
            .iter()
            .map(|header| {
                let value: String = String::from_utf8_lossy(header.get_value_raw())
                    .chars()
                    .filter(|c| *c != '\r' && *c != '\n')
                    .collect();
                (header.get_key(), value.trim().to_string())
            })
            .collect();

        Ok(Self {
            headers,
            body: raw.get(body_offset..).unwrap_or_default().to_vec(),
        })
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Replaces every `name` header with a single one carrying `value`.
    ///
    /// The header keeps the position of its first occurrence, or is appended.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(index) => {
                self.headers[index] = (name.to_string(), value);
                let mut seen = 0usize;
                self.headers.retain(|(key, _)| {
                    if key.eq_ignore_ascii_case(name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.headers.push((name.to_string(), value)),
        }
    }

    /// Removes every `name` header, returning the first value.
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let first = self.header(name).map(ToString::to_string);
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        first
    }

    /// Envelope recipients collected from `To` and then `Cc`.
    pub fn recipients(&self) -> Vec<String> {
        let mut recipients = Vec::new();

        for name in ["To", "Cc"] {
            for (key, value) in &self.headers {
                if !key.eq_ignore_ascii_case(name) {
                    continue;
                }

                match mailboxes(value) {
                    Some(list) => recipients.extend(
                        list.into_iter()
                            .map(|(_, addr)| addr)
                            .filter(|addr| !addr.is_empty()),
                    ),
                    None => warn!("Failed to parse header: {name}"),
                }
            }
        }

        recipients
    }

    /// Renders the message for sending, dropping internal headers.
    pub fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 64 * self.headers.len());

        for (name, value) in &self.headers {
            if is_internal(name) {
                internal!(
                    level = WARN,
                    "Ignoring internal mail header in assemble phase: {}",
                    name
                );
                continue;
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.push(b'\n');
        }

        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    const RAW: &[u8] = b"Yamn-Pooled-Date: 2 Jan 2006\n\
        From: Alice <alice@example.org>\n\
        To: bob@example.com, Carol <carol@example.net>\n\
        Cc: dave@abcdef.onion\n\
        Subject: folded\n  subject line\n\
        Yamn-Internal: secret\n\
        \n\
        Body line one\n\
        .leading dot\n";

    fn mail(custom_from: bool) -> MailConfig {
        MailConfig {
            outbound_name: "Mix".to_string(),
            outbound_addy: "mix@example.net".to_string(),
            custom_from,
            ..MailConfig::default()
        }
    }

    #[test]
    fn test_parse_keeps_order_and_unfolds() {
        let message = PoolMessage::parse(RAW).unwrap();
        let names: Vec<&str> = message.headers().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["Yamn-Pooled-Date", "From", "To", "Cc", "Subject", "Yamn-Internal"]
        );
        assert_eq!(message.header("subject"), Some("folded  subject line"));
        assert_eq!(message.body(), b"Body line one\n.leading dot\n");
    }

    #[test]
    fn test_unparsable_entries() {
        assert!(matches!(
            PoolMessage::parse(b""),
            Err(DeliveryError::Unparsable(_))
        ));
        assert!(matches!(
            PoolMessage::parse(b"\nbody only\n"),
            Err(DeliveryError::Unparsable(_))
        ));
    }

    #[test]
    fn test_recipients_from_to_and_cc() {
        let message = PoolMessage::parse(RAW).unwrap();
        assert_eq!(
            message.recipients(),
            vec!["bob@example.com", "carol@example.net", "dave@abcdef.onion"]
        );
    }

    #[test]
    fn test_group_recipients_are_flattened() {
        let message =
            PoolMessage::parse(b"To: friends: a@example.com, b@example.com;\n\nhi\n").unwrap();
        assert_eq!(message.recipients(), vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_no_recipients() {
        let message = PoolMessage::parse(b"Subject: nobody\n\nhi\n").unwrap();
        assert!(message.recipients().is_empty());
    }

    #[test]
    fn test_assemble_reparse_drops_internal_headers() {
        let message = PoolMessage::parse(RAW).unwrap();
        let reparsed = PoolMessage::parse(&message.assemble()).unwrap();

        let expected: Vec<(&str, &str)> = message
            .headers()
            .filter(|(name, _)| !name.starts_with(INTERNAL_HEADER_PREFIX))
            .collect();
        let actual: Vec<(&str, &str)> = reparsed.headers().collect();

        assert_eq!(actual, expected);
        assert_eq!(reparsed.body(), message.body());
    }

    #[test]
    fn test_set_and_remove_header() {
        let mut message =
            PoolMessage::parse(b"Date: old\nTo: a@example.com\nDate: older\n\nhi\n").unwrap();

        message.set_header("Date", "new");
        message.set_header("Message-Id", "<id@example.net>");
        let headers: Vec<(&str, &str)> = message.headers().collect();
        assert_eq!(
            headers,
            vec![
                ("Date", "new"),
                ("To", "a@example.com"),
                ("Message-Id", "<id@example.net>"),
            ]
        );

        assert_eq!(message.remove_header("date"), Some("new".to_string()));
        assert_eq!(message.header("Date"), None);
        assert_eq!(message.remove_header("Date"), None);
    }

    #[test]
    fn test_from_policy() {
        assert_eq!(outbound_from(None, &mail(false)), "Mix <mix@example.net>");
        assert_eq!(outbound_from(Some(""), &mail(false)), "Mix <mix@example.net>");
        assert_eq!(
            outbound_from(Some("alice@example.org"), &mail(false)),
            "Mix <mix@example.net>"
        );
        assert_eq!(
            outbound_from(Some("Alice <alice@example.org>"), &mail(false)),
            "Alice <mix@example.net>"
        );
        assert_eq!(
            outbound_from(Some("Alice <alice@example.org>"), &mail(true)),
            "Alice <alice@example.org>"
        );
    }

    #[test]
    fn test_short_date_round_trip() {
        let date = parse_short_date("2 Jan 2006").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2006, 1, 2).unwrap());
        assert_eq!(format_short_date(date), "2 Jan 2006");
        assert_eq!(
            parse_short_date("12 Oct 2026").unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()
        );
        assert!(matches!(
            parse_short_date("2006-01-02"),
            Err(DeliveryError::PooledDate(_))
        ));
    }

    #[test]
    fn test_rfc5322_date() {
        let at = FixedOffset::west_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2006, 1, 2, 15, 4, 5)
            .unwrap();
        assert_eq!(rfc5322_date(&at), "Mon, 2 Jan 2006 15:04:05 -0700");

        let utc = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        assert_eq!(rfc5322_date(&utc), "Mon, 19 Oct 2026 08:00:00 +0000");
    }

    #[test]
    fn test_message_id_shape() {
        let id = message_id("example.net");
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.net>"));
        assert_ne!(id, message_id("example.net"));
    }
}
