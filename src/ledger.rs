//! Ledger and clearing-report readers for the publish pipeline.
//!
//! The ledger is a flat CSV with header-named columns; a missing file is an
//! empty ledger, not an error. The clearing report is an opaque JSON document
//! consumed only for its presence.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// One ledger record. All columns are optional: downstream payload builders
/// pass the values through as-is and the amount aggregation coerces
/// missing or unparseable amounts to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerRow {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

pub fn load_ledger(input: &Path) -> Result<Vec<LedgerRow>> {
    let path = input.join("ledger.csv");
    if !path.exists() {
        info!(path = %path.display(), "No ledger file present, treating ledger as empty");
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(&path)
        .with_context(|| format!("failed to open ledger {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: LedgerRow =
            record.with_context(|| format!("failed to parse ledger row in {}", path.display()))?;
        rows.push(row);
    }
    info!(rows = rows.len(), path = %path.display(), "Loaded ledger");
    Ok(rows)
}

/// Load `clearing/clearing_report.json` if present. Reserved for future
/// payload enrichment; only its existence is consumed today.
pub fn load_clearing(input: &Path) -> Option<Value> {
    let path = input.join("clearing").join("clearing_report.json");
    let raw = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => {
            info!(path = %path.display(), "Loaded clearing report");
            Some(value)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Clearing report present but unreadable");
            None
        }
    }
}

/// Amount of one row, coerced to zero when blank or unparseable.
pub fn amount_of(row: &LedgerRow) -> f64 {
    row.amount
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(0.0)
}

pub fn total_amount(rows: &[LedgerRow]) -> f64 {
    rows.iter().map(amount_of).sum()
}
