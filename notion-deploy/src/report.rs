//! Run summary and JSON report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;
use crate::loader::SkippedFile;
use crate::state::{DeploymentState, ErrorRecord, RunStats};

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFileReport {
    pub path: PathBuf,
    pub reason: String,
}

impl From<&SkippedFile> for SkippedFileReport {
    fn from(file: &SkippedFile) -> Self {
        Self {
            path: file.path.clone(),
            reason: file.reason.clone(),
        }
    }
}

/// Everything written to `--report`
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: RunStats,
    pub created_pages: BTreeMap<String, String>,
    pub created_databases: BTreeMap<String, String>,
    /// Database title -> number of rows recorded
    pub created_rows: BTreeMap<String, usize>,
    pub pending_properties: usize,
    pub pending_links: usize,
    pub errors: Vec<ErrorRecord>,
    pub skipped_files: Vec<SkippedFileReport>,
    pub warnings: Vec<String>,
}

impl DeployReport {
    pub fn new(
        state: &DeploymentState,
        dry_run: bool,
        skipped: &[SkippedFile],
        warnings: Vec<String>,
    ) -> Self {
        Self {
            dry_run,
            started_at: state.started_at,
            finished_at: Utc::now(),
            stats: state.stats.clone(),
            created_pages: state.created_pages.clone(),
            created_databases: state.created_databases.clone(),
            created_rows: state
                .created_rows
                .iter()
                .map(|(db, rows)| (db.clone(), rows.len()))
                .collect(),
            pending_properties: state.pending_count(),
            pending_links: state.pending_link_count(),
            errors: state.errors.clone(),
            skipped_files: skipped.iter().map(SkippedFileReport::from).collect(),
            warnings,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Report written");
        Ok(())
    }
}

/// Log the end-of-run summary.
pub fn log_summary(state: &DeploymentState, dry_run: bool) {
    let stats = &state.stats;
    info!(
        dry_run,
        created = stats.created(),
        existing = stats.existing(),
        failed = stats.failed(),
        "Deployment finished"
    );
    info!(
        pages = stats.pages_created,
        databases = stats.databases_created,
        rows = stats.rows_created,
        relations = stats.relations_patched,
        rollups = stats.rollups_patched,
        links = stats.links_created,
        "Created"
    );

    let pending = state.pending_count();
    if pending > 0 {
        warn!(pending, "Deferred properties still pending; re-run to retry");
    }
    let links = state.pending_link_count();
    if links > 0 {
        warn!(links, "Page links still waiting for their targets; re-run to retry");
    }
    for error in &state.errors {
        warn!(kind = ?error.kind, entity = %error.name, "{}", error.message);
    }
}
