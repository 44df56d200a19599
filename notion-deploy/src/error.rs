//! Error types for notion-deploy

use std::path::PathBuf;
use thiserror::Error;

/// Fatal deployment errors.
///
/// Per-entity failures never surface here; they are recorded in
/// [`crate::state::DeploymentState::errors`] and the run continues.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("NOTION_TOKEN is not set")]
    MissingToken,

    #[error("No parent page ID: set NOTION_PARENT_PAGEID or pass --parent-id")]
    MissingParent,

    #[error("YAML directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State file error ({path}): {message}")]
    State { path: PathBuf, message: String },

    #[error("API client error: {0}")]
    Client(#[from] notion_client::NotionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DeployError>;
