//! Collector contracts: one async trait per evidentiary source capability.
//!
//! The traits are the seam between the pipelines and the protocol clients
//! (IMAP, SMS provider, MDM API). Real clients live in [`crate::mail`],
//! [`crate::sms`] and [`crate::devices`]; tests plug in mockall mocks.
//! Persistence into the run workspace is the pipeline's job, not the
//! clients': a client only speaks its protocol and returns records.

use async_trait::async_trait;
use chrono::NaiveDate;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Parsed header summary of one inbound message. Recipient addresses are
/// lowercased so the retention filter can match case-insensitively.
#[derive(Debug, Clone, Serialize)]
pub struct MailSummary {
    pub uid: u32,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub date: Option<String>,
}

/// One fetched message: the verbatim raw bytes for persistence plus the
/// parsed summary for filtering and indexing.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub uid: u32,
    pub raw: Vec<u8>,
    pub summary: MailSummary,
}

/// One SMS record as listed by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsMessage {
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub date_sent: Option<String>,
}

/// Failure of a mail or SMS collector. The pipeline catches these, logs them
/// with provider context and continues with an empty result for that source.
#[derive(Debug)]
pub enum CollectError {
    Provider(String),
    Io(std::io::Error),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Provider(message) => write!(f, "{message}"),
            CollectError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// Failure of the device-inventory fetch. Unlike mail and SMS this is kept
/// structured: "fetch failed" must stay distinguishable from "no devices",
/// both in the index and in the persisted artifact.
#[derive(Debug)]
pub enum DeviceFetchError {
    Status { status: u16, body: String },
    Transport(String),
    Payload(String),
}

impl DeviceFetchError {
    /// The error object persisted to `devices.json` in place of a list.
    pub fn artifact(&self) -> Value {
        match self {
            DeviceFetchError::Status { status, body } => {
                json!({ "error": format!("status {status}"), "body": body })
            }
            DeviceFetchError::Transport(message) | DeviceFetchError::Payload(message) => {
                json!({ "error": message })
            }
        }
    }
}

impl std::fmt::Display for DeviceFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFetchError::Status { status, .. } => write!(f, "status {status}"),
            DeviceFetchError::Transport(message) => write!(f, "transport error: {message}"),
            DeviceFetchError::Payload(message) => write!(f, "payload error: {message}"),
        }
    }
}

impl std::error::Error for DeviceFetchError {}

/// Fetches full raw messages received since a calendar date (date
/// granularity, not timestamp) with parsed header summaries.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MailFetcher: Send + Sync {
    async fn fetch_since(&self, since: NaiveDate) -> Result<Vec<FetchedMessage>, CollectError>;
}

/// Lists messages sent to one number since a calendar date.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SmsLister: Send + Sync {
    async fn list_messages(
        &self,
        to: &str,
        since: NaiveDate,
    ) -> Result<Vec<SmsMessage>, CollectError>;
}

/// Lists all managed devices in one authenticated call.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DeviceInventory: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Value>, DeviceFetchError>;
}

/// The set of configured collectors for one run. `None` means the source has
/// no configuration and is deliberately skipped.
pub struct Collectors<'a> {
    pub mail: Option<&'a dyn MailFetcher>,
    pub sms: Option<&'a dyn SmsLister>,
    pub devices: Option<&'a dyn DeviceInventory>,
}

impl<'a> Collectors<'a> {
    pub fn none() -> Self {
        Collectors {
            mail: None,
            sms: None,
            devices: None,
        }
    }
}
