//! Collection pipeline: gather from each configured source into the dated
//! run workspace, aggregate counts into the index, optionally ship the index
//! to the archive endpoint.
//!
//! Failure semantics: a collector's failure is caught, logged with provider
//! context and recorded as an empty result (mail, SMS) or an explicit error
//! artifact (devices). Sibling collectors and the run itself always continue;
//! only workspace/report IO aborts the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::config::ArchiveConfig;
use crate::sources::{Collectors, DeviceFetchError, MailSummary, SmsMessage};
use crate::workspace::{write_json, AuditLog, RunWorkspace};

/// Always polled in addition to any configured numbers. Fixed business
/// requirement, not a default.
pub const OPERATIONS_NUMBER: &str = "2704018770";

const INDEX_FILE: &str = "index.json";
const SMS_FILE: &str = "sms.json";
const DEVICES_FILE: &str = "devices.json";

#[derive(Debug, Clone)]
pub struct CollectArgs {
    pub output_dir: PathBuf,
    /// Lowercased recipient addresses mail is retained for.
    pub targets: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub since: NaiveDate,
}

/// Per-source counts for one run; the self-describing `index.json` document.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionIndex {
    pub run_from: String,
    pub generated_ts: String,
    pub emails_count: usize,
    pub sms_count: usize,
    pub devices_count: usize,
}

/// Device-inventory outcome as seen by the aggregator.
#[derive(Debug)]
pub enum DeviceOutcome {
    Skipped,
    Inventory(Vec<Value>),
    Failed(DeviceFetchError),
}

pub async fn run_collection(
    args: &CollectArgs,
    collectors: Collectors<'_>,
    archive: Option<&ArchiveConfig>,
) -> Result<CollectionIndex> {
    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("failed to create output directory {}", args.output_dir.display())
    })?;
    let audit = AuditLog::new(args.output_dir.join("audit.log"));
    let workspace = RunWorkspace::create(&args.output_dir, args.since)?;
    audit.line(&format!(
        "Collection run starting from {} into {}",
        args.since,
        workspace.root().display()
    ));

    let emails = collect_mail(&collectors, args, &workspace, &audit).await;
    let sms = collect_sms(&collectors, args, &workspace, &audit).await?;
    let devices = collect_devices(&collectors, &workspace, &audit).await?;

    let index = build_index(args.since, &emails, &sms, &devices);
    write_json(&workspace.path(INDEX_FILE), &index)?;
    audit.line(&format!(
        "Wrote {INDEX_FILE} ({})",
        workspace.path(INDEX_FILE).display()
    ));

    if let Some(archive) = archive {
        upload_index(archive, &workspace.path(INDEX_FILE), &audit).await;
    }

    Ok(index)
}

async fn collect_mail(
    collectors: &Collectors<'_>,
    args: &CollectArgs,
    workspace: &RunWorkspace,
    audit: &AuditLog,
) -> Vec<MailSummary> {
    let Some(fetcher) = collectors.mail else {
        audit.line("Skipping mail collection: mailbox not configured");
        return Vec::new();
    };
    match fetcher.fetch_since(args.since).await {
        Ok(messages) => {
            let total = messages.len();
            let mut retained = Vec::new();
            for message in messages {
                if !recipients_match(&message.summary.to, &args.targets) {
                    continue;
                }
                let path = workspace.path(&format!("{}.eml", message.uid));
                if let Err(e) = fs::write(&path, &message.raw) {
                    error!(uid = message.uid, error = %e, path = %path.display(), "Failed to persist raw message");
                    audit.line(&format!("Failed to persist message {}: {e}", message.uid));
                    continue;
                }
                retained.push(message.summary);
            }
            info!(fetched = total, retained = retained.len(), "Mail collection done");
            audit.line(&format!(
                "Mail collection retained {} of {} message(s)",
                retained.len(),
                total
            ));
            retained
        }
        Err(e) => {
            error!(error = %e, "Mail collection failed");
            audit.line(&format!("Mail collection failed: {e}"));
            Vec::new()
        }
    }
}

async fn collect_sms(
    collectors: &Collectors<'_>,
    args: &CollectArgs,
    workspace: &RunWorkspace,
    audit: &AuditLog,
) -> Result<Vec<SmsMessage>> {
    let Some(lister) = collectors.sms else {
        audit.line("Skipping SMS collection: provider credentials not set");
        return Ok(Vec::new());
    };

    let mut numbers = args.phone_numbers.clone();
    if !numbers.iter().any(|n| n == OPERATIONS_NUMBER) {
        numbers.push(OPERATIONS_NUMBER.to_string());
    }

    let mut flattened = Vec::new();
    for number in &numbers {
        match lister.list_messages(number, args.since).await {
            Ok(mut messages) => flattened.append(&mut messages),
            Err(e) => {
                error!(number = %number, error = %e, "SMS listing failed");
                audit.line(&format!("SMS collection failed for {number}: {e}"));
            }
        }
    }

    write_json(&workspace.path(SMS_FILE), &flattened)?;
    audit.line(&format!(
        "SMS collection wrote {} message(s) across {} number(s)",
        flattened.len(),
        numbers.len()
    ));
    Ok(flattened)
}

async fn collect_devices(
    collectors: &Collectors<'_>,
    workspace: &RunWorkspace,
    audit: &AuditLog,
) -> Result<DeviceOutcome> {
    let Some(inventory) = collectors.devices else {
        audit.line("Skipping device inventory: MDM not configured");
        return Ok(DeviceOutcome::Skipped);
    };
    match inventory.list_devices().await {
        Ok(devices) => {
            write_json(&workspace.path(DEVICES_FILE), &devices)?;
            audit.line(&format!(
                "Device inventory wrote {} device(s)",
                devices.len()
            ));
            Ok(DeviceOutcome::Inventory(devices))
        }
        Err(e) => {
            error!(error = %e, "Device inventory fetch failed");
            write_json(&workspace.path(DEVICES_FILE), &e.artifact())?;
            audit.line(&format!("Device inventory failed: {e}"));
            Ok(DeviceOutcome::Failed(e))
        }
    }
}

fn recipients_match(recipients: &[String], targets: &[String]) -> bool {
    recipients
        .iter()
        .any(|recipient| targets.iter().any(|target| recipient == target))
}

/// Pure reduction of the three collection results into the index document.
/// A failed or skipped device fetch counts zero devices; counts are the
/// literal number of retained records.
pub fn build_index(
    since: NaiveDate,
    emails: &[MailSummary],
    sms: &[SmsMessage],
    devices: &DeviceOutcome,
) -> CollectionIndex {
    CollectionIndex {
        run_from: since.format("%Y-%m-%d").to_string(),
        generated_ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        emails_count: emails.len(),
        sms_count: sms.len(),
        devices_count: match devices {
            DeviceOutcome::Inventory(list) => list.len(),
            DeviceOutcome::Skipped | DeviceOutcome::Failed(_) => 0,
        },
    }
}

async fn upload_index(archive: &ArchiveConfig, index_path: &Path, audit: &AuditLog) {
    let bytes = match fs::read(index_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, path = %index_path.display(), "Failed to read index for archive upload");
            audit.line(&format!("Archive upload failed: {e}"));
            return;
        }
    };
    let part = reqwest::multipart::Part::bytes(bytes).file_name("index.json");
    let form = reqwest::multipart::Form::new().part("file", part);
    let result = reqwest::Client::new()
        .post(&archive.url)
        .bearer_auth(&archive.key)
        .multipart(form)
        .timeout(Duration::from_secs(30))
        .send()
        .await;
    match result {
        Ok(response) => audit.line(&format!("Archive upload status {}", response.status())),
        Err(e) => audit.line(&format!("Archive upload failed: {e}")),
    }
}
