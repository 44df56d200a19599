//! YAML directory loader and merger

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{DeployError, Result};
use crate::model::Document;
use crate::vars::{UnresolvedPolicy, Variables};

/// A file that could not be loaded
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Raw merge result
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub merged: Map<String, Value>,
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

/// Typed load result
#[derive(Debug, Default)]
pub struct Loaded {
    pub document: Document,
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
    pub warnings: Vec<String>,
}

/// `*.yaml` / `*.yml` files directly inside `dir`, sorted by file name.
pub fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DeployError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Parse and merge every YAML file in `dir`.
///
/// A file that fails to read or parse is skipped and recorded; only a
/// missing directory is an error.
pub fn load_directory(dir: &Path) -> Result<LoadOutcome> {
    let mut outcome = LoadOutcome::default();

    for path in yaml_files(dir)? {
        match parse_file(&path) {
            Ok(Some(doc)) => {
                debug!(file = %path.display(), keys = doc.len(), "Loaded YAML file");
                merge_maps(&mut outcome.merged, doc);
                outcome.files.push(path);
            }
            Ok(None) => {
                debug!(file = %path.display(), "Empty YAML file");
                outcome.files.push(path);
            }
            Err(reason) => {
                warn!(file = %path.display(), error = %reason, "Skipping YAML file");
                outcome.skipped.push(SkippedFile { path, reason });
            }
        }
    }

    info!(
        files = outcome.files.len(),
        skipped = outcome.skipped.len(),
        "Loaded YAML directory {}",
        dir.display()
    );
    Ok(outcome)
}

fn parse_file(path: &Path) -> std::result::Result<Option<Map<String, Value>>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let value: Value = serde_yaml::from_str(&content).map_err(|e| e.to_string())?;
    match value {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        _ => Err("top level is not a mapping".to_string()),
    }
}

/// Merge `incoming` into `target`: lists concatenate, maps merge
/// recursively, anything else is replaced.
pub fn merge_maps(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match target.get_mut(&key) {
            Some(existing) => merge_value(existing, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}

fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Array(a), Value::Array(b)) => a.extend(b),
        (Value::Object(a), Value::Object(b)) => merge_maps(a, b),
        (slot, value) => *slot = value,
    }
}

/// Load, substitute variables and decode a YAML directory.
pub fn load_document(dir: &Path, policy: UnresolvedPolicy) -> Result<Loaded> {
    let LoadOutcome {
        merged,
        files,
        skipped,
    } = load_directory(dir)?;

    let globals = match merged.get("globals") {
        Some(Value::Object(g)) => g.clone(),
        _ => Map::new(),
    };
    let vars = Variables::new(policy).with_globals(&globals);
    let mut merged = Value::Object(merged);
    vars.substitute_value(&mut merged);

    let merged = match merged {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    let (document, warnings) = Document::from_merged(&merged);

    Ok(Loaded {
        document,
        files,
        skipped,
        warnings,
    })
}
