//! Deployment configuration
//!
//! Layered the usual way: defaults, then an optional TOML file, then
//! environment variables and CLI flags (applied in `main`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use notion_client::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_NOTION_VERSION};

use crate::error::{DeployError, Result};
use crate::vars::UnresolvedPolicy;

/// Default config file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "notion-deploy.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Directory holding the YAML files
    #[serde(default = "default_yaml_dir")]
    pub yaml_dir: PathBuf,

    /// Page under which root pages and databases are created
    #[serde(default)]
    pub parent_page_id: Option<String>,

    /// Checkpoint file for idempotent resume
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Optional JSON report written at the end of a run
    #[serde(default)]
    pub report_file: Option<PathBuf>,

    /// Title of the page letters go under when they declare no parent
    #[serde(default)]
    pub letters_parent: Option<String>,

    /// Search the workspace by title before creating pages and databases
    #[serde(default)]
    pub lookup_before_create: bool,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub limits: Limits,

    /// What to do with `${VAR}` placeholders that resolve to nothing
    #[serde(default)]
    pub unresolved_variables: UnresolvedPolicy,
}

/// Wire-level policy for the API client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_notion_version")]
    pub notion_version: String,

    /// Sustained request rate (2.5 = one request every 400ms)
    #[serde(default = "default_rps")]
    pub requests_per_second: f64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay, doubled per attempt
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Payload-size policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Longest rich-text segment; longer text is split into segments
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Blocks sent per create/append request
    #[serde(default = "default_max_children")]
    pub max_children_per_request: usize,

    /// Cap on properties per database (None = unlimited)
    #[serde(default)]
    pub max_properties_per_database: Option<usize>,
}

fn default_yaml_dir() -> PathBuf { PathBuf::from("yaml") }
fn default_state_file() -> PathBuf { PathBuf::from(".deploy_state.json") }
fn default_base_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_notion_version() -> String { DEFAULT_NOTION_VERSION.to_string() }
fn default_rps() -> f64 { 2.5 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_base_delay() -> u64 { 1000 }
fn default_timeout() -> u64 { 30 }
fn default_max_text_chars() -> usize { 2000 }
fn default_max_children() -> usize { 100 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            notion_version: default_notion_version(),
            requests_per_second: default_rps(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
            max_children_per_request: default_max_children(),
            max_properties_per_database: None,
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            yaml_dir: default_yaml_dir(),
            parent_page_id: None,
            state_file: default_state_file(),
            report_file: None,
            letters_parent: None,
            lookup_before_create: false,
            api: ApiConfig::default(),
            limits: Limits::default(),
            unresolved_variables: UnresolvedPolicy::default(),
        }
    }
}

impl DeployConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeployError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DeployError::Config(e.to_string()))
    }

    /// Build the HTTP client config for the given token.
    pub fn client_config(&self, token: &str) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            token: token.to_string(),
            notion_version: self.api.notion_version.clone(),
            requests_per_second: self.api.requests_per_second,
            max_retries: self.api.max_retries,
            base_delay_ms: self.api.retry_base_delay_ms,
            timeout_secs: self.api.timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = DeployConfig::from_toml("").unwrap();
        assert_eq!(config.state_file, PathBuf::from(".deploy_state.json"));
        assert_eq!(config.api.requests_per_second, 2.5);
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.limits.max_text_chars, 2000);
        assert_eq!(config.limits.max_children_per_request, 100);
        assert!(config.limits.max_properties_per_database.is_none());
        assert_eq!(config.unresolved_variables, UnresolvedPolicy::Keep);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = DeployConfig::from_toml(
            r#"
yaml_dir = "content"
lookup_before_create = true
unresolved_variables = "empty"

[api]
requests_per_second = 3.0

[limits]
max_properties_per_database = 15
"#,
        )
        .unwrap();
        assert_eq!(config.yaml_dir, PathBuf::from("content"));
        assert!(config.lookup_before_create);
        assert_eq!(config.unresolved_variables, UnresolvedPolicy::Empty);
        assert_eq!(config.api.requests_per_second, 3.0);
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.limits.max_properties_per_database, Some(15));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            DeployConfig::from_toml("api = 5"),
            Err(DeployError::Config(_))
        ));
    }

    #[test]
    fn test_client_config_carries_policy() {
        let config = DeployConfig::default();
        let client = config.client_config("secret_abc");
        assert_eq!(client.token, "secret_abc");
        assert_eq!(client.base_delay_ms, 1000);
        assert_eq!(client.notion_version, "2022-06-28");
    }
}
