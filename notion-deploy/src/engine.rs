//! Deployment orchestration
//!
//! Runs the phases in order against any [`NotionApi`]:
//! pages, databases, deferred relation/rollup patches, seed rows, database
//! links and title links held back at page creation. The state is checkpointed after each phase when a checkpoint path
//! is set.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use notion_client::NotionApi;

use crate::config::DeployConfig;
use crate::error::Result;
use crate::model::{AcceptanceRow, Document, PageDef};
use crate::resolver::{
    append_pending_links, deploy_databases, deploy_pages, deploy_rows, hoist_child_pages,
    link_databases, patch_pending, DeployOptions,
};
use crate::state::DeploymentState;
use crate::validate::{validate, Issue, Severity};

/// Title of the page collecting acceptance rows
pub const ACCEPTANCE_PAGE_TITLE: &str = "Acceptance Checklist";

/// Deploys a [`Document`] through a [`NotionApi`].
pub struct Deployer {
    api: Arc<dyn NotionApi>,
    config: DeployConfig,
    options: DeployOptions,
    checkpoint: Option<PathBuf>,
}

impl Deployer {
    pub fn new(
        api: Arc<dyn NotionApi>,
        config: DeployConfig,
        root_parent_id: impl Into<String>,
    ) -> Self {
        let options = DeployOptions::from_config(&config, root_parent_id);
        Self {
            api,
            config,
            options,
            checkpoint: None,
        }
    }

    /// Write the state to `path` after every phase.
    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Pages, letters, the acceptance checklist and `child_page` sub-pages as
    /// one page list.
    pub fn collect_pages(&self, document: &Document, state: &DeploymentState) -> Vec<PageDef> {
        let mut pages = document.pages.clone();

        let letters_parent = self.config.letters_parent.as_deref().filter(|parent| {
            let known = document.pages.iter().any(|p| p.title == *parent)
                || state.created_pages.contains_key(*parent);
            if !known && !document.letters.is_empty() {
                warn!(parent = %parent, "letters_parent page not found, letters go to the top level");
            }
            known
        });
        pages.extend(
            document
                .letters
                .iter()
                .cloned()
                .map(|letter| letter.into_page(letters_parent)),
        );

        if let Some(checklist) = acceptance_page(&document.acceptance) {
            pages.push(checklist);
        }
        hoist_child_pages(pages)
    }

    /// Run every phase. Per-entity failures end up in `state.errors`; only
    /// checkpoint I/O errors are returned.
    pub async fn deploy(&self, document: &Document, state: &mut DeploymentState) -> Result<Vec<Issue>> {
        state.begin_run();
        let api = self.api.as_ref();
        let pages = self.collect_pages(document, state);

        let issues = validate(
            &pages,
            &document.databases,
            &state.created_pages,
            &state.created_databases,
        );
        for issue in &issues {
            match issue.severity {
                Severity::Error => error!("{}", issue),
                Severity::Warning => warn!("{}", issue),
            }
        }

        info!(
            pages = pages.len(),
            databases = document.databases.len(),
            "Starting deployment"
        );

        deploy_pages(api, &pages, document, state, &self.options).await;
        self.save(state, "pages")?;

        deploy_databases(api, &document.databases, state, &self.options).await;
        self.save(state, "databases")?;

        patch_pending(api, state).await;
        self.save(state, "patches")?;

        deploy_rows(api, &document.databases, state, &self.options).await;
        self.save(state, "rows")?;

        link_databases(api, &pages, state).await;
        append_pending_links(api, state, &self.options).await;
        self.save(state, "links")?;

        Ok(issues)
    }

    fn save(&self, state: &mut DeploymentState, phase: &str) -> Result<()> {
        match &self.checkpoint {
            Some(path) => {
                state.save(path)?;
                debug!(phase, "Phase checkpointed");
            }
            None => debug!(phase, "Phase complete"),
        }
        Ok(())
    }
}

/// One page of `to_do` blocks for all acceptance rows.
pub fn acceptance_page(rows: &[AcceptanceRow]) -> Option<PageDef> {
    if rows.is_empty() {
        return None;
    }
    let blocks = rows
        .iter()
        .map(|row| {
            let mut text = row.check.clone();
            if let Some(role) = &row.role {
                text = format!("[{}] {}", role, text);
            }
            if let Some(expected) = &row.expected {
                text = format!("{} (expected: {})", text, expected);
            }
            serde_json::json!({"type": "to_do", "content": text, "checked": row.done})
        })
        .collect();

    Some(PageDef {
        title: ACCEPTANCE_PAGE_TITLE.to_string(),
        icon: Some("✅".to_string()),
        blocks,
        ..Default::default()
    })
}
