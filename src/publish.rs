//! Publish pipeline: build per-target payloads from the ledger and
//! enterprise identifiers and POST them to the configured procurement and
//! registration systems.
//!
//! The identifier gate runs before anything leaves the process: missing
//! required identifiers abort the run with a minimal error report and no
//! target is attempted. Per-target failures are captured into that target's
//! result and never abort sibling targets. Exactly one attempt per configured
//! target per run; retry policy belongs to the operator or scheduler.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{AppConfig, Endpoint, PublishTargets};
use crate::identifiers::EnterpriseIdentifiers;
use crate::ledger::{self, LedgerRow};
use crate::workspace::{write_json, AuditLog};

const REPORT_FILE: &str = "integrations_report.json";
const LOG_FILE: &str = "integrations.log";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The three publish targets, iterated over with one shared payload/post
/// contract instead of hand-written per-target flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Coupa,
    Piee,
    Sam,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::Coupa, Target::Piee, Target::Sam];

    /// Key under `results` in the report.
    pub fn key(self) -> &'static str {
        match self {
            Target::Coupa => "coupa",
            Target::Piee => "piee",
            Target::Sam => "sam",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Target::Coupa => "Coupa",
            Target::Piee => "PIEE",
            Target::Sam => "SAM.gov",
        }
    }

    fn endpoint(self, targets: &PublishTargets) -> Option<&Endpoint> {
        match self {
            Target::Coupa => targets.coupa.as_ref(),
            Target::Piee => targets.piee.as_ref(),
            Target::Sam => targets.sam.as_ref(),
        }
    }

    /// Target-specific payload from the ledger and identifier snapshot.
    pub fn build_payload(
        self,
        rows: &[LedgerRow],
        enterprise: &EnterpriseIdentifiers,
        run_ts: &str,
    ) -> Value {
        match self {
            // Per-row minimal summary plus the enterprise block.
            Target::Coupa => {
                let items: Vec<Value> = rows
                    .iter()
                    .map(|row| {
                        json!({
                            "message_id": row.message_id,
                            "vendor": row.from,
                            "amount": row.amount,
                            "currency": row.currency,
                            "subject": row.subject,
                        })
                    })
                    .collect();
                json!({
                    "summary_ts": run_ts,
                    "source": "audit-bucket",
                    "enterprise": enterprise,
                    "items": items,
                })
            }
            // Aggregate counts and amount sum plus the enterprise block.
            Target::Piee => json!({
                "report_ts": run_ts,
                "enterprise": enterprise,
                "items_count": rows.len(),
                "total_amount": ledger::total_amount(rows),
            }),
            // Identifiers and row count only, no line items.
            Target::Sam => json!({
                "uei": enterprise.uei,
                "cage": enterprise.cage,
                "dodaac_contracting": enterprise.dodaac_contracting,
                "dodaac_funding": enterprise.dodaac_funding,
                "paying_dodaac": enterprise.paying_dodaac,
                "fedstrip": enterprise.fedstrip,
                "finance_unitid": enterprise.finance_unitid,
                "cag_code": enterprise.cag_code,
                "ba_codes": enterprise.ba_codes,
                "scf_code": enterprise.scf_code,
                "district_cd": enterprise.district_cd,
                "eps": enterprise.eps,
                "items": rows.len(),
                "timestamp": run_ts,
            }),
        }
    }
}

/// Attempt outcome for one target. `Skipped` is a first-class state so
/// reports and tests can assert on it, distinct from both success and
/// failure.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetResult {
    Skipped,
    Success { status: u16, body: String },
    HttpFailure { status: u16, body: String },
    TransportFailure { error: String },
}

impl fmt::Display for TargetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetResult::Skipped => write!(f, "skipped"),
            TargetResult::Success { status, .. } => write!(f, "success (status {status})"),
            TargetResult::HttpFailure { status, body } => {
                write!(f, "http failure (status {status}): {body}")
            }
            TargetResult::TransportFailure { error } => write!(f, "transport failure: {error}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Counts {
    pub ledger_rows: usize,
}

/// The full-run report, written only after the gate passes. A gate rejection
/// writes the minimal error document instead; the two shapes are mutually
/// exclusive within one run.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub run_ts: String,
    pub counts: Counts,
    pub enterprise: EnterpriseIdentifiers,
    pub results: BTreeMap<String, TargetResult>,
}

#[derive(Debug)]
pub enum PublishOutcome {
    /// Gate rejected the run; the named required identifiers were missing.
    MissingIdentifiers(Vec<&'static str>),
    Completed(PublishReport),
}

pub async fn run_publish(config: &AppConfig, input: &Path) -> Result<PublishOutcome> {
    fs::create_dir_all(input)
        .with_context(|| format!("failed to create input directory {}", input.display()))?;
    let audit = AuditLog::new(input.join(LOG_FILE));
    let report_path = input.join(REPORT_FILE);

    let rows = ledger::load_ledger(input)?;
    let clearing = ledger::load_clearing(input);
    debug!(clearing_present = clearing.is_some(), "Probed clearing report");

    let run_ts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let enterprise = config.enterprise.clone();

    let gate = enterprise.check();
    if !gate.passed() {
        audit.line(&format!(
            "Missing required enterprise identifiers: {}. Aborting integrations.",
            gate.missing_required.join(", ")
        ));
        write_json(
            &report_path,
            &json!({
                "error": "missing_identifiers",
                "missing": gate.missing_required,
                "run_ts": run_ts,
            }),
        )?;
        return Ok(PublishOutcome::MissingIdentifiers(gate.missing_required));
    }
    if !gate.missing_recommended.is_empty() {
        audit.line(&format!(
            "Warning: recommended enterprise identifiers missing: {}. Reports will proceed but may be incomplete.",
            gate.missing_recommended.join(", ")
        ));
    }

    let client = reqwest::Client::new();
    let mut results = BTreeMap::new();
    for target in Target::ALL {
        let result = match target.endpoint(&config.publish) {
            Some(endpoint) => {
                audit.line(&format!("Posting to {}...", target.display_name()));
                let payload = target.build_payload(&rows, &enterprise, &run_ts);
                let result = post_payload(&client, endpoint, &payload).await;
                audit.line(&format!("{} response: {}", target.display_name(), result));
                result
            }
            None => {
                audit.line(&format!(
                    "Skipping {}: credentials or URL not set",
                    target.display_name()
                ));
                TargetResult::Skipped
            }
        };
        results.insert(target.key().to_string(), result);
    }

    let report = PublishReport {
        run_ts,
        counts: Counts {
            ledger_rows: rows.len(),
        },
        enterprise,
        results,
    };
    write_json(&report_path, &report)?;
    audit.line(&format!("Wrote {REPORT_FILE} ({})", report_path.display()));
    info!(ledger_rows = report.counts.ledger_rows, "Publish run complete");
    Ok(PublishOutcome::Completed(report))
}

/// One POST, bearer-authorized, fixed timeout, no retries. A transport error
/// and a non-success response are classified separately.
async fn post_payload(client: &reqwest::Client, endpoint: &Endpoint, payload: &Value) -> TargetResult {
    let response = client
        .post(&endpoint.url)
        .bearer_auth(&endpoint.key)
        .timeout(REQUEST_TIMEOUT)
        .json(payload)
        .send()
        .await;
    match response {
        Ok(response) => {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<failed to decode response body>"));
            if status.is_success() {
                TargetResult::Success {
                    status: status.as_u16(),
                    body,
                }
            } else {
                TargetResult::HttpFailure {
                    status: status.as_u16(),
                    body,
                }
            }
        }
        Err(e) => TargetResult::TransportFailure {
            error: e.to_string(),
        },
    }
}
