//! Outbound pool handling: ageing, header rewriting and flushing.

use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, Utc};
use mixsend_common::{Address, Config, internal};
use tracing::{error, info, warn};

use crate::{
    error::DeliveryError,
    mailer::Mailer,
    message::{
        POOLED_DATE_HEADER, PoolMessage, message_id, outbound_from, parse_short_date, rfc5322_date,
    },
    sink::OUTFILE_PREFIX,
};

/// Result of handing one pool file to the mailer.
#[derive(Debug)]
pub struct PoolOutcome {
    /// Whether the caller should delete the pool file.
    ///
    /// Set for entries that can never be delivered. A successful send leaves
    /// it unset; deleting delivered entries is the caller's decision.
    pub delete: bool,
    pub result: Result<(), DeliveryError>,
}

impl PoolOutcome {
    pub(crate) const fn sent() -> Self {
        Self {
            delete: false,
            result: Ok(()),
        }
    }

    pub(crate) fn failed(error: DeliveryError) -> Self {
        Self {
            delete: error.deletes_entry(),
            result: Err(error),
        }
    }
}

/// A pool entry rewritten and ready for a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMessage {
    pub payload: Vec<u8>,
    pub recipients: Vec<String>,
}

/// Whole days between `pooled` and `today`.
pub fn age_in_days(pooled: NaiveDate, today: NaiveDate) -> i64 {
    (today - pooled).num_days()
}

/// Turns a raw pool entry into a sendable payload.
///
/// Checks the pooled-date marker against `max_age_days`, stamps fresh `Date`
/// and `Message-Id` headers, applies the `From` policy and collects the
/// recipients.
///
/// # Errors
///
/// - [`DeliveryError::Unparsable`] when the entry has no valid header block.
/// - [`DeliveryError::PooledDate`] when the marker cannot be parsed.
/// - [`DeliveryError::Expired`] when the entry is too old to send.
/// - [`DeliveryError::NoRecipients`] when `To` and `Cc` yield no address.
pub fn prepare(
    raw: &[u8],
    config: &Config,
    now: DateTime<Utc>,
) -> Result<PreparedMessage, DeliveryError> {
    let mut message = PoolMessage::parse(raw)?;

    let pooled = message
        .header(POOLED_DATE_HEADER)
        .map(parse_short_date)
        .transpose()?;

    match pooled {
        None => warn!("No {POOLED_DATE_HEADER} header in message"),
        Some(pooled) => {
            let age_days = age_in_days(pooled, now.date_naive());
            let max_age_days = config.pool.max_age_days;

            if age_days > i64::from(max_age_days) {
                return Err(DeliveryError::Expired {
                    age_days,
                    max_age_days,
                });
            }
            if age_days > 0 {
                internal!("Mailing pooled file that's {} days old", age_days);
            }
            message.remove_header(POOLED_DATE_HEADER);
        }
    }

    let domain = Address::parse(&config.remailer.address)
        .map(|address| address.domain)
        .map_err(|e| DeliveryError::Configuration(e.to_string()))?;

    message.set_header("Date", rfc5322_date(&now));
    message.set_header("Message-Id", message_id(&domain));
    let from = outbound_from(message.header("From"), &config.mail);
    message.set_header("From", from);

    let recipients = message.recipients();
    if recipients.is_empty() {
        return Err(DeliveryError::NoRecipients);
    }

    Ok(PreparedMessage {
        payload: message.assemble(),
        recipients,
    })
}

/// Tally of one pass over the pool directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub discarded: usize,
    pub retained: usize,
}

fn is_pool_entry(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| !name.starts_with('.') && !name.starts_with(OUTFILE_PREFIX))
}

async fn pool_entries(directory: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(directory).await?;

    while let Some(entry) = dir.next_entry().await? {
        if entry.file_type().await?.is_file() && is_pool_entry(&entry.path()) {
            entries.push(entry.path());
        }
    }

    entries.sort();
    Ok(entries)
}

/// Mails every entry in `directory` once.
///
/// Delivered and undeliverable entries are deleted; everything else stays
/// for the next pass. A failure on one entry never stops the others.
///
/// # Errors
///
/// Returns an error only if the directory itself cannot be listed.
pub async fn flush(mailer: &Mailer, directory: &Path) -> io::Result<FlushReport> {
    let mut report = FlushReport::default();

    for path in pool_entries(directory).await? {
        let outcome = mailer.mail_pool_file(&path).await;

        let remove = match &outcome.result {
            Ok(()) => {
                report.sent += 1;
                true
            }
            Err(e) if outcome.delete => {
                info!(file = %path.display(), "Discarding pool entry: {e}");
                report.discarded += 1;
                true
            }
            Err(e) => {
                warn!(
                    file = %path.display(),
                    stage = %e.stage(),
                    "Pool entry retained: {e}"
                );
                report.retained += 1;
                false
            }
        };

        if remove && let Err(e) = tokio::fs::remove_file(&path).await {
            error!(file = %path.display(), "Failed to delete pool entry: {e}");
        }
    }

    if report != FlushReport::default() {
        info!(
            sent = report.sent,
            discarded = report.discarded,
            retained = report.retained,
            "Pool flush complete"
        );
    }

    Ok(report)
}
