//! Types for the Notion REST API client

use serde::{Deserialize, Serialize};

use crate::error::{NotionError, Result};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";

/// Default `Notion-Version` header value
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Prefixes accepted for integration tokens
pub const TOKEN_PREFIXES: [&str; 2] = ["secret_", "ntn_"];

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for the REST API
    pub base_url: String,
    /// Integration token (sent as bearer)
    pub token: String,
    /// Value of the `Notion-Version` header
    pub notion_version: String,
    /// Maximum sustained request rate
    pub requests_per_second: f64,
    /// Retries after the first attempt for 429/5xx and transport errors
    pub max_retries: u32,
    /// First backoff delay in milliseconds, doubled per attempt
    pub base_delay_ms: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: String::new(),
            notion_version: DEFAULT_NOTION_VERSION.to_string(),
            requests_per_second: 2.5,
            max_retries: 3,
            base_delay_ms: 1000,
            timeout_secs: 30,
        }
    }
}

/// Check that a token carries one of the known integration prefixes.
pub fn validate_token(token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(NotionError::InvalidToken("token is empty".to_string()));
    }
    if TOKEN_PREFIXES.iter().any(|p| token.starts_with(p)) {
        Ok(())
    } else {
        Err(NotionError::InvalidToken(format!(
            "token must start with one of {:?}",
            TOKEN_PREFIXES
        )))
    }
}

/// Kind of object addressed by a title search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Page,
    Database,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Page => "page",
            ObjectKind::Database => "database",
        }
    }
}

/// Minimal view of any object returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Error body returned by the API on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Search request body
#[derive(Debug, Serialize)]
pub(crate) struct SearchRequest<'a> {
    pub query: &'a str,
    pub filter: SearchFilter,
    pub page_size: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchFilter {
    pub property: &'static str,
    pub value: &'static str,
}

/// Search response body
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

/// Extract the plain-text title of a page or database search result.
pub fn object_title(object: &serde_json::Value) -> Option<String> {
    // Databases carry `title` at the top level
    if let Some(parts) = object.get("title").and_then(|t| t.as_array()) {
        return Some(plain_text(parts));
    }

    // Pages carry it in whichever property has type "title"
    object
        .get("properties")?
        .as_object()?
        .values()
        .find(|p| p.get("type").and_then(|t| t.as_str()) == Some("title"))
        .and_then(|p| p.get("title"))
        .and_then(|t| t.as_array())
        .map(|parts| plain_text(parts))
}

fn plain_text(parts: &[serde_json::Value]) -> String {
    parts
        .iter()
        .filter_map(|p| {
            p.get("plain_text")
                .or_else(|| p.get("text").and_then(|t| t.get("content")))
                .and_then(|s| s.as_str())
        })
        .collect()
}
