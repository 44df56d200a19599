//! Page ordering and creation
//!
//! Planning is pure: roots first in input order, then every child after its
//! parent (depth-first). Cycles are detected with a "currently resolving"
//! stack; every page on a cycle fails, and so does everything beneath it.
//! Execution then walks the plan, skipping pages already in state.
//!
//! Title links to pages or databases that do not exist yet are held back
//! in state and appended by [`append_pending_links`] once the targets have
//! been created.

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

use notion_client::{NotionApi, ObjectKind};

use super::{cover_json, icon_value, DeployOptions};
use crate::blocks::{decode_list, Block, BlockBuilder, LinkTarget};
use crate::model::{Document, PageDef};
use crate::state::{DeploymentState, EntityKind, PendingLink};

/// Where a planned page goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// The configured top-level parent page
    Root,
    /// Another page, by title
    Page(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPage {
    /// Index into the input slice
    pub index: usize,
    pub title: String,
    pub parent: ParentRef,
}

/// Creation order plus pages that cannot be placed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagePlan {
    pub order: Vec<PlannedPage>,
    /// `(title, reason)` in input order
    pub failed: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

struct Planner<'a> {
    pages: &'a [PageDef],
    known: &'a BTreeMap<String, String>,
    index: HashMap<&'a str, usize>,
    planned: HashSet<usize>,
    failed: HashMap<usize, String>,
    resolving: Vec<usize>,
    plan: PagePlan,
}

impl<'a> Planner<'a> {
    fn visit(&mut self, i: usize) -> bool {
        if self.planned.contains(&i) {
            return true;
        }
        if self.failed.contains_key(&i) {
            return false;
        }
        if let Some(pos) = self.resolving.iter().position(|&j| j == i) {
            for &j in &self.resolving[pos..] {
                self.failed
                    .entry(j)
                    .or_insert_with(|| "circular parent reference".to_string());
            }
            return false;
        }

        let pages = self.pages;
        let page = &pages[i];
        let parent = match page.parent.as_deref() {
            None => ParentRef::Root,
            Some(parent) => match self.index.get(parent).copied() {
                Some(j) => {
                    self.resolving.push(i);
                    let ok = self.visit(j);
                    self.resolving.pop();
                    if !ok {
                        self.failed
                            .entry(i)
                            .or_insert_with(|| format!("parent '{}' cannot be created", parent));
                        return false;
                    }
                    ParentRef::Page(parent.to_string())
                }
                None if self.known.contains_key(parent) => ParentRef::Page(parent.to_string()),
                None => {
                    self.plan.warnings.push(format!(
                        "Parent '{}' of page '{}' not found, using the top-level parent",
                        parent, page.title
                    ));
                    ParentRef::Root
                }
            },
        };

        self.planned.insert(i);
        self.plan.order.push(PlannedPage {
            index: i,
            title: page.title.clone(),
            parent,
        });
        true
    }
}

/// Plan creation order for `pages`.
///
/// `known` holds pages created by earlier runs; they are valid parents even
/// when absent from the input. Later duplicates of a title are ignored.
pub fn plan_page_order(pages: &[PageDef], known: &BTreeMap<String, String>) -> PagePlan {
    let mut planner = Planner {
        pages,
        known,
        index: HashMap::new(),
        planned: HashSet::new(),
        failed: HashMap::new(),
        resolving: Vec::new(),
        plan: PagePlan::default(),
    };

    let mut unique = Vec::with_capacity(pages.len());
    for (i, page) in pages.iter().enumerate() {
        if planner.index.contains_key(page.title.as_str()) {
            planner
                .plan
                .warnings
                .push(format!("Duplicate page title '{}', keeping the first", page.title));
            continue;
        }
        planner.index.insert(page.title.as_str(), i);
        unique.push(i);
    }

    for &i in unique.iter().filter(|&&i| pages[i].parent.is_none()) {
        planner.visit(i);
    }
    for &i in unique.iter().filter(|&&i| pages[i].parent.is_some()) {
        planner.visit(i);
    }

    let Planner {
        failed, mut plan, ..
    } = planner;
    for &i in &unique {
        if let Some(reason) = failed.get(&i) {
            plan.failed.push((pages[i].title.clone(), reason.clone()));
        }
    }
    plan
}

/// Move top-level `child_page` blocks out into pages of their own, parented
/// to the page that declared them. A sub-page's `children` (or `blocks`)
/// become its content.
pub fn hoist_child_pages(mut pages: Vec<PageDef>) -> Vec<PageDef> {
    let mut i = 0;
    while i < pages.len() {
        let blocks = std::mem::take(&mut pages[i].blocks);
        let mut kept = Vec::with_capacity(blocks.len());
        let mut hoisted = Vec::new();
        for def in blocks {
            match Block::from_value(&def) {
                Block::ChildPage { title } => hoisted.push(PageDef {
                    title,
                    parent: Some(pages[i].title.clone()),
                    icon: def.get("icon").and_then(Value::as_str).map(str::to_string),
                    blocks: ["children", "blocks"]
                        .iter()
                        .find_map(|key| def.get(*key)?.as_array().cloned())
                        .unwrap_or_default(),
                    ..Default::default()
                }),
                _ => kept.push(def),
            }
        }
        pages[i].blocks = kept;
        pages.extend(hoisted);
        i += 1;
    }
    pages
}

/// Creation request for one page
#[derive(Debug, Clone)]
pub struct PageBody {
    pub body: Value,
    /// Blocks past the per-request limit, appended after creation
    pub rest: Vec<Value>,
    /// Title links whose target does not exist yet
    pub deferred_links: Vec<PendingLink>,
}

fn pending_link(target: &LinkTarget) -> Option<PendingLink> {
    let (kind, title) = match target {
        LinkTarget::PageTitle(title) => (ObjectKind::Page, title),
        LinkTarget::DatabaseTitle(title) => (ObjectKind::Database, title),
        LinkTarget::PageId(_) | LinkTarget::DatabaseId(_) => return None,
    };
    Some(PendingLink {
        kind,
        title: title.clone(),
    })
}

fn link_target(link: &PendingLink) -> LinkTarget {
    match link.kind {
        ObjectKind::Page => LinkTarget::PageTitle(link.title.clone()),
        ObjectKind::Database => LinkTarget::DatabaseTitle(link.title.clone()),
    }
}

/// Build the creation body for a page.
pub fn page_body(
    page: &PageDef,
    parent_id: &str,
    document: &Document,
    state: &DeploymentState,
    options: &DeployOptions,
) -> PageBody {
    let builder = BlockBuilder::new(options.limits.max_text_chars)
        .with_pages(&state.created_pages)
        .with_databases(&state.created_databases);

    let mut children = metadata_blocks(page, &builder);
    let mut deferred_links = Vec::new();
    for block in decode_list(&page.blocks) {
        if let Block::LinkToPage { target } = &block {
            if builder.resolve_link(target).is_none() {
                if let Some(link) = pending_link(target) {
                    debug!(page = %page.title, link = %link.title, "Link target not created yet, deferring");
                    deferred_links.push(link);
                    continue;
                }
            }
        }
        children.push(builder.render(&block));
    }

    let mut body = json!({
        "parent": {"type": "page_id", "page_id": parent_id},
        "properties": {"title": {"title": options.title(&page.title)}},
    });

    let icon = page
        .icon
        .as_deref()
        .map(|icon| document.icon_for(icon).unwrap_or_else(|| icon.to_string()))
        .or_else(|| page.slug.as_deref().and_then(|slug| document.icon_for(slug)));
    if let Some(icon) = icon {
        body["icon"] = icon_value(&icon);
    }

    let cover = page
        .cover
        .as_deref()
        .map(|cover| document.cover_for(cover).unwrap_or_else(|| cover.to_string()))
        .or_else(|| page.slug.as_deref().and_then(|slug| document.cover_for(slug)));
    if let Some(cover) = cover {
        match cover_json(&cover) {
            Some(value) => body["cover"] = value,
            None => warn!(page = %page.title, cover = %cover, "Cover is not an http(s) URL, skipping"),
        }
    }

    let rest = if children.len() > options.chunk_size() {
        children.split_off(options.chunk_size())
    } else {
        Vec::new()
    };
    if !children.is_empty() {
        body["children"] = Value::Array(children);
    }
    PageBody {
        body,
        rest,
        deferred_links,
    }
}

/// Disclaimer and role/complexity callouts shown at the top of a page.
fn metadata_blocks(page: &PageDef, builder: &BlockBuilder<'_>) -> Vec<Value> {
    let mut blocks = Vec::new();
    if let Some(disclaimer) = &page.disclaimer {
        blocks.push(builder.build(&json!({
            "type": "callout",
            "content": disclaimer,
            "icon": "⚠️",
            "color": "yellow_background",
        })));
    }

    let meta: Vec<String> = [("Role", &page.role), ("Complexity", &page.complexity)]
        .iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}: {}", label, v)))
        .collect();
    if !meta.is_empty() {
        blocks.push(builder.build(&json!({
            "type": "callout",
            "content": meta.join(" | "),
            "icon": "ℹ️",
            "color": "gray_background",
        })));
    }
    blocks
}

/// Create every page in `pages` that is not yet in `state`.
pub async fn deploy_pages<A>(
    api: &A,
    pages: &[PageDef],
    document: &Document,
    state: &mut DeploymentState,
    options: &DeployOptions,
) where
    A: NotionApi + ?Sized,
{
    let plan = plan_page_order(pages, &state.created_pages);
    for warning in &plan.warnings {
        warn!("{}", warning);
    }
    for (title, reason) in &plan.failed {
        state.record_error(EntityKind::Page, title, reason.clone());
        state.stats.pages_failed += 1;
    }

    info!(planned = plan.order.len(), failed = plan.failed.len(), "Deploying pages");

    for planned in &plan.order {
        let page = &pages[planned.index];
        let title = page.title.as_str();

        if state.page_id(title).is_some() {
            debug!(title = %title, "Page already deployed");
            state.stats.pages_existing += 1;
            continue;
        }

        let parent_id = match &planned.parent {
            ParentRef::Root => options.root_parent_id.clone(),
            ParentRef::Page(parent) => match state.page_id(parent) {
                Some(id) => id.to_string(),
                None => {
                    state.record_error(
                        EntityKind::Page,
                        title,
                        format!("parent '{}' was not created", parent),
                    );
                    state.stats.pages_failed += 1;
                    continue;
                }
            },
        };

        if options.lookup_before_create {
            match api.find_by_title(ObjectKind::Page, title).await {
                Ok(Some(id)) => {
                    info!(title = %title, id = %id, "Found existing page");
                    state.created_pages.insert(title.to_string(), id);
                    state.stats.pages_existing += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!(title = %title, error = %e, "Lookup failed, creating"),
            }
        }

        let PageBody {
            body,
            rest,
            deferred_links,
        } = page_body(page, &parent_id, document, state, options);
        match api.create_page(body).await {
            Ok(created) => {
                info!(title = %title, id = %created.id, "Created page");
                state.created_pages.insert(title.to_string(), created.id.clone());
                state.stats.pages_created += 1;
                if !deferred_links.is_empty() {
                    state.pending_links.insert(title.to_string(), deferred_links);
                }

                for chunk in rest.chunks(options.chunk_size()) {
                    if let Err(e) = api.append_block_children(&created.id, chunk.to_vec()).await {
                        state.record_error(
                            EntityKind::Page,
                            title,
                            format!("appending blocks failed: {}", e),
                        );
                        break;
                    }
                }
            }
            Err(e) => {
                state.record_error(EntityKind::Page, title, e.to_string());
                state.stats.pages_failed += 1;
            }
        }
    }
}

/// Append the title links held back at page creation whose targets now
/// exist. Links that still cannot be resolved, or whose append fails, stay
/// pending for the next run.
pub async fn append_pending_links<A>(api: &A, state: &mut DeploymentState, options: &DeployOptions)
where
    A: NotionApi + ?Sized,
{
    let pending = std::mem::take(&mut state.pending_links);
    for (page, links) in pending {
        let Some(page_id) = state.page_id(&page).map(str::to_string) else {
            state.pending_links.insert(page, links);
            continue;
        };

        let mut blocks = Vec::new();
        let mut resolved = Vec::new();
        let mut waiting = Vec::new();
        {
            let builder = BlockBuilder::new(options.limits.max_text_chars)
                .with_pages(&state.created_pages)
                .with_databases(&state.created_databases);
            for link in links {
                match builder.resolve_link(&link_target(&link)) {
                    Some(body) => {
                        blocks.push(json!({"link_to_page": body}));
                        resolved.push(link);
                    }
                    None => waiting.push(link),
                }
            }
        }

        for link in &waiting {
            state.record_error(
                EntityKind::Link,
                &page,
                format!("link target '{}' was not created", link.title),
            );
        }

        if !blocks.is_empty() {
            match api.append_block_children(&page_id, blocks).await {
                Ok(()) => {
                    info!(page = %page, links = resolved.len(), "Appended page links");
                    state.stats.links_created += resolved.len();
                }
                Err(e) => {
                    state.record_error(EntityKind::Link, &page, e.to_string());
                    waiting.extend(resolved);
                }
            }
        }

        if !waiting.is_empty() {
            state.pending_links.insert(page, waiting);
        }
    }
}
