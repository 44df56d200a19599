//! Deployment state and checkpointing
//!
//! The state is the single source of truth for idempotent re-runs: anything
//! recorded here is never created again. It is threaded by `&mut` through
//! every phase and written to disk after each one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

use notion_client::ObjectKind;

use crate::error::{DeployError, Result};

/// What a recorded failure was about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Page,
    Database,
    Row,
    Relation,
    Rollup,
    Link,
}

/// A per-entity failure; the run continues past it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: EntityKind,
    pub name: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// A `link_to_page` block held back because its target did not exist yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLink {
    pub kind: ObjectKind,
    pub title: String,
}

/// Counters for the current run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub pages_created: usize,
    pub pages_existing: usize,
    pub pages_failed: usize,
    pub databases_created: usize,
    pub databases_existing: usize,
    pub databases_failed: usize,
    pub rows_created: usize,
    pub rows_existing: usize,
    pub rows_failed: usize,
    pub relations_patched: usize,
    pub rollups_patched: usize,
    pub patches_failed: usize,
    pub links_created: usize,
}

impl RunStats {
    pub fn created(&self) -> usize {
        self.pages_created + self.databases_created + self.rows_created
    }

    pub fn existing(&self) -> usize {
        self.pages_existing + self.databases_existing + self.rows_existing
    }

    pub fn failed(&self) -> usize {
        self.pages_failed + self.databases_failed + self.rows_failed + self.patches_failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Page title -> page id
    #[serde(default)]
    pub created_pages: BTreeMap<String, String>,
    /// Database title -> database id
    #[serde(default)]
    pub created_databases: BTreeMap<String, String>,
    /// Database title -> (row title -> row id)
    #[serde(default)]
    pub created_rows: BTreeMap<String, BTreeMap<String, String>>,
    /// Database title -> (property -> raw definition) still to be patched
    #[serde(default)]
    pub pending_relations: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    pub pending_rollups: BTreeMap<String, BTreeMap<String, Value>>,
    /// Pages whose `database_link` block has been appended
    #[serde(default)]
    pub linked_pages: BTreeSet<String>,
    /// Page title -> title links to append once their targets exist
    #[serde(default)]
    pub pending_links: BTreeMap<String, Vec<PendingLink>>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for DeploymentState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_pages: BTreeMap::new(),
            created_databases: BTreeMap::new(),
            created_rows: BTreeMap::new(),
            pending_relations: BTreeMap::new(),
            pending_rollups: BTreeMap::new(),
            linked_pages: BTreeSet::new(),
            pending_links: BTreeMap::new(),
            errors: Vec::new(),
            stats: RunStats::default(),
            started_at: now,
            updated_at: now,
        }
    }
}

impl DeploymentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a checkpoint; a missing file yields a fresh state.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No checkpoint, starting fresh");
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path).map_err(|e| DeployError::State {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| DeployError::State {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write the checkpoint through a temporary file so a crash never leaves
    /// a truncated state behind.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Checkpoint written");
        Ok(())
    }

    /// Reset per-run data (errors, stats) while keeping created IDs.
    pub fn begin_run(&mut self) {
        self.errors.clear();
        self.stats = RunStats::default();
        self.started_at = Utc::now();
    }

    pub fn record_error(&mut self, kind: EntityKind, name: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(kind = ?kind, entity = %name, error = %message, "Deployment error");
        self.errors.push(ErrorRecord {
            kind,
            name: name.to_string(),
            message,
            at: Utc::now(),
        });
    }

    pub fn page_id(&self, title: &str) -> Option<&str> {
        self.created_pages.get(title).map(String::as_str)
    }

    pub fn database_id(&self, title: &str) -> Option<&str> {
        self.created_databases.get(title).map(String::as_str)
    }

    pub fn row_id(&self, database: &str, title: &str) -> Option<&str> {
        self.created_rows
            .get(database)
            .and_then(|rows| rows.get(title))
            .map(String::as_str)
    }

    pub fn record_row(&mut self, database: &str, title: &str, id: &str) {
        self.created_rows
            .entry(database.to_string())
            .or_default()
            .insert(title.to_string(), id.to_string());
    }

    /// Number of relation and rollup properties still waiting for a patch.
    pub fn pending_count(&self) -> usize {
        let count = |m: &BTreeMap<String, BTreeMap<String, Value>>| {
            m.values().map(BTreeMap::len).sum::<usize>()
        };
        count(&self.pending_relations) + count(&self.pending_rollups)
    }

    /// Number of `link_to_page` blocks still waiting for their target.
    pub fn pending_link_count(&self) -> usize {
        self.pending_links.values().map(Vec::len).sum()
    }
}

/// Load the checkpoint unless `fresh`; an unreadable checkpoint is fatal.
pub fn load_state(path: &Path, fresh: bool) -> Result<DeploymentState> {
    if fresh {
        if path.exists() {
            warn!(path = %path.display(), "Ignoring existing checkpoint (--fresh)");
        }
        return Ok(DeploymentState::new());
    }
    DeploymentState::load(path)
}
