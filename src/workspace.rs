//! Run workspace, audit log and report writer.
//!
//! A collection run owns one date-keyed directory under `<base>/daily/`.
//! Creation is idempotent; re-running for the same start date reuses the
//! directory and overwrites its files. Callers needing immutable history must
//! pass a distinguishing start date or archive before re-running.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct RunWorkspace {
    root: PathBuf,
}

impl RunWorkspace {
    /// Derive `<base>/daily/from-<ISO date>` and create it with all
    /// ancestors. No error when the directory already exists.
    pub fn create(base: &Path, since: NaiveDate) -> Result<Self> {
        let root = base
            .join("daily")
            .join(format!("from-{}", since.format("%Y-%m-%d")));
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create run workspace {}", root.display()))?;
        debug!(root = %root.display(), "Run workspace ready");
        Ok(RunWorkspace { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

/// Serialize one top-level document pretty-printed to its well-known path,
/// overwriting any prior file.
pub fn write_json<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(document)
        .with_context(|| format!("failed to serialize document for {}", path.display()))?;
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "Wrote JSON document");
    Ok(())
}

/// Append-only line sink shared by both pipelines. Every call appends one
/// UTC-timestamped line to a fixed file and echoes it to stdout. No rotation,
/// no level filtering; call sites decide what is worth a line.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        AuditLog { path }
    }

    pub fn line(&self, message: &str) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let line = format!("{timestamp} {message}\n");
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = appended {
            error!(error = %e, path = %self.path.display(), "Failed to append audit log line");
        }
        print!("{line}");
    }
}
