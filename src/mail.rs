//! IMAP implementation of the [`MailFetcher`] contract.
//!
//! Connects over TLS, selects the inbox and searches `SINCE <date>` — IMAP
//! search is calendar-date granular, which is exactly what the collection
//! window wants. Each match is fetched in full (RFC822) and its headers
//! parsed into a [`MailSummary`]; retention filtering happens upstream in the
//! collection pipeline.

use async_trait::async_trait;
use chrono::NaiveDate;
use mailparse::{MailAddr, MailHeaderMap};
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::sources::{CollectError, FetchedMessage, MailFetcher, MailSummary};

pub struct ImapMailFetcher {
    config: MailConfig,
}

impl ImapMailFetcher {
    pub fn new(config: MailConfig) -> Self {
        ImapMailFetcher { config }
    }
}

#[async_trait]
impl MailFetcher for ImapMailFetcher {
    async fn fetch_since(&self, since: NaiveDate) -> Result<Vec<FetchedMessage>, CollectError> {
        // The IMAP session is blocking; the run is sequential end to end, so
        // it holds the pipeline the same way every other collector call does.
        let host = self.config.host.as_str();
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| CollectError::Provider(format!("tls setup failed: {e}")))?;
        let client = imap::connect((host, self.config.port), host, &tls)
            .map_err(|e| CollectError::Provider(format!("imap connect to {host} failed: {e}")))?;
        let mut session = client
            .login(&self.config.user, &self.config.password)
            .map_err(|(e, _)| CollectError::Provider(format!("imap login failed: {e}")))?;

        session
            .select("INBOX")
            .map_err(|e| CollectError::Provider(format!("imap select failed: {e}")))?;

        let criteria = format!("SINCE {}", since.format("%d-%b-%Y"));
        let mut uids: Vec<u32> = session
            .uid_search(&criteria)
            .map_err(|e| CollectError::Provider(format!("imap search failed: {e}")))?
            .into_iter()
            .collect();
        uids.sort_unstable();
        info!(host = %host, criteria = %criteria, matches = uids.len(), "Searched inbox");

        let mut messages = Vec::new();
        if !uids.is_empty() {
            let set = uids
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let fetches = session
                .uid_fetch(set, "RFC822")
                .map_err(|e| CollectError::Provider(format!("imap fetch failed: {e}")))?;
            for fetch in fetches.iter() {
                let (Some(uid), Some(raw)) = (fetch.uid, fetch.body()) else {
                    continue;
                };
                messages.push(FetchedMessage {
                    uid,
                    raw: raw.to_vec(),
                    summary: summarize(uid, raw),
                });
            }
        }

        session.logout().ok();
        Ok(messages)
    }
}

/// Parse headers into a summary. A message that fails to parse is kept with
/// an empty summary rather than dropped: the raw bytes are still evidence.
pub fn summarize(uid: u32, raw: &[u8]) -> MailSummary {
    let parsed = match mailparse::parse_mail(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(uid, error = %e, "Failed to parse message headers");
            return MailSummary {
                uid,
                subject: None,
                from: None,
                to: Vec::new(),
                date: None,
            };
        }
    };

    let mut to = Vec::new();
    for value in parsed.headers.get_all_values("To") {
        match mailparse::addrparse(&value) {
            Ok(list) => {
                for addr in list.iter() {
                    match addr {
                        MailAddr::Single(single) => to.push(single.addr.to_lowercase()),
                        MailAddr::Group(group) => {
                            to.extend(group.addrs.iter().map(|a| a.addr.to_lowercase()))
                        }
                    }
                }
            }
            // Unparseable address list: fall back to the raw header value so
            // the filter still has something to match on.
            Err(_) => to.push(value.trim().to_lowercase()),
        }
    }

    MailSummary {
        uid,
        subject: parsed.headers.get_first_value("Subject"),
        from: parsed.headers.get_first_value("From"),
        to,
        date: parsed.headers.get_first_value("Date"),
    }
}
