//! Deployment phases
//!
//! - [`pages`]: parent ordering and page creation
//! - [`databases`]: two-pass database creation, seed rows and database links

pub mod databases;
pub mod pages;

use serde_json::{json, Value};

use crate::blocks::icon_json;
use crate::config::{DeployConfig, Limits};
use crate::text::{is_http_url, rich_text};

pub use databases::{deploy_databases, deploy_rows, link_databases, patch_pending};
pub use pages::{
    append_pending_links, deploy_pages, hoist_child_pages, plan_page_order, PageBody, PagePlan,
    ParentRef, PlannedPage,
};

/// Options shared by every phase
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Page that root pages and databases are created under
    pub root_parent_id: String,
    pub limits: Limits,
    pub lookup_before_create: bool,
}

impl DeployOptions {
    pub fn from_config(config: &DeployConfig, root_parent_id: impl Into<String>) -> Self {
        Self {
            root_parent_id: root_parent_id.into(),
            limits: config.limits.clone(),
            lookup_before_create: config.lookup_before_create,
        }
    }

    pub(crate) fn title(&self, text: &str) -> Value {
        rich_text(text, self.limits.max_text_chars)
    }

    /// Children per request, never zero.
    pub(crate) fn chunk_size(&self) -> usize {
        self.limits.max_children_per_request.max(1)
    }
}

/// `{"type": "external", ...}` cover for an http(s) URL.
pub(crate) fn cover_json(url: &str) -> Option<Value> {
    is_http_url(url).then(|| json!({"type": "external", "external": {"url": url.trim()}}))
}

pub(crate) fn icon_value(icon: &str) -> Value {
    icon_json(icon.trim())
}
