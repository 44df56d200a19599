//! Two-pass database creation
//!
//! Pass one creates every database with its plain properties. Rollups are
//! always held back, and relations are held back while their target
//! database does not exist. Pass two patches each database: one call for
//! its pending relations, then one call for all of its rollups. Pending
//! entries live in [`DeploymentState`] so an interrupted run resumes the
//! patching where it stopped.

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

use notion_client::{NotionApi, ObjectKind};

use super::{icon_value, DeployOptions};
use crate::model::{DatabaseDef, PageDef};
use crate::properties::{decode_properties, PropertySpec};
use crate::rows::{encode_row, row_body, RowContext};
use crate::state::{DeploymentState, EntityKind};

/// Property used when a database declares no title property
pub const DEFAULT_TITLE_PROPERTY: &str = "Name";

/// A decoded property with its raw definition
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEntry {
    pub name: String,
    pub def: Value,
    pub spec: PropertySpec,
}

/// Decode a database's properties, adding a title property when missing and
/// applying the property cap.
pub fn database_schema(db: &DatabaseDef, max_properties: Option<usize>) -> Vec<SchemaEntry> {
    let mut entries: Vec<SchemaEntry> = decode_properties(&db.properties)
        .into_iter()
        .map(|(name, def)| {
            let spec = PropertySpec::from_value(&name, &def);
            SchemaEntry { name, def, spec }
        })
        .collect();

    // Only one title property is allowed; extra ones become text
    let mut seen_title = false;
    for entry in entries.iter_mut() {
        if entry.spec == PropertySpec::Title {
            if seen_title {
                warn!(database = %db.title, property = %entry.name, "Second title property, using rich_text");
                entry.spec = PropertySpec::RichText;
            }
            seen_title = true;
        }
    }
    if !seen_title {
        entries.insert(
            0,
            SchemaEntry {
                name: DEFAULT_TITLE_PROPERTY.to_string(),
                def: json!("title"),
                spec: PropertySpec::Title,
            },
        );
    }

    if let Some(cap) = max_properties {
        let cap = cap.max(1);
        if entries.len() > cap {
            warn!(
                database = %db.title,
                properties = entries.len(),
                cap,
                "Too many properties, dropping the extras"
            );
            let mut kept_others = 0;
            entries.retain(|e| {
                if e.spec == PropertySpec::Title {
                    return true;
                }
                kept_others += 1;
                kept_others < cap
            });
        }
    }
    entries
}

/// Pass one: create databases not yet in state.
pub async fn deploy_databases<A>(
    api: &A,
    databases: &[DatabaseDef],
    state: &mut DeploymentState,
    options: &DeployOptions,
) where
    A: NotionApi + ?Sized,
{
    info!(count = databases.len(), "Creating databases");
    let mut seen = HashSet::new();

    for db in databases {
        let title = db.title.as_str();
        if !seen.insert(title) {
            warn!(database = %title, "Duplicate database title, keeping the first");
            continue;
        }
        if state.database_id(title).is_some() {
            debug!(database = %title, "Database already deployed");
            state.stats.databases_existing += 1;
            continue;
        }

        let parent_id = match db.parent.as_deref() {
            None => options.root_parent_id.clone(),
            Some(parent) => match state.page_id(parent) {
                Some(id) => id.to_string(),
                None => {
                    state.record_error(
                        EntityKind::Database,
                        title,
                        format!("parent page '{}' was not created", parent),
                    );
                    state.stats.databases_failed += 1;
                    continue;
                }
            },
        };

        if options.lookup_before_create {
            match api.find_by_title(ObjectKind::Database, title).await {
                Ok(Some(id)) => {
                    info!(database = %title, id = %id, "Found existing database");
                    state.created_databases.insert(title.to_string(), id);
                    state.stats.databases_existing += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!(database = %title, error = %e, "Lookup failed, creating"),
            }
        }

        let mut properties = Map::new();
        let mut relations = BTreeMap::new();
        let mut rollups = BTreeMap::new();
        for entry in database_schema(db, options.limits.max_properties_per_database) {
            if entry.spec.is_rollup() {
                rollups.insert(entry.name, entry.def);
                continue;
            }
            match entry.spec.to_schema(&state.created_databases) {
                Ok(schema) => {
                    properties.insert(entry.name, schema);
                }
                Err(unresolved) => {
                    debug!(database = %title, property = %entry.name, relation_target = %unresolved.0, "Deferring relation");
                    relations.insert(entry.name, entry.def);
                }
            }
        }

        let mut body = json!({
            "parent": {"type": "page_id", "page_id": parent_id},
            "title": options.title(title),
            "properties": properties,
        });
        if let Some(icon) = &db.icon {
            body["icon"] = icon_value(icon);
        }
        if let Some(description) = &db.description {
            body["description"] = options.title(description);
        }

        match api.create_database(body).await {
            Ok(created) => {
                info!(
                    database = %title,
                    id = %created.id,
                    deferred_relations = relations.len(),
                    deferred_rollups = rollups.len(),
                    "Created database"
                );
                state.created_databases.insert(title.to_string(), created.id);
                state.stats.databases_created += 1;
                if !relations.is_empty() {
                    state.pending_relations.insert(title.to_string(), relations);
                }
                if !rollups.is_empty() {
                    state.pending_rollups.insert(title.to_string(), rollups);
                }
            }
            Err(e) => {
                state.record_error(EntityKind::Database, title, e.to_string());
                state.stats.databases_failed += 1;
            }
        }
    }
}

/// Pass two: patch pending relations, then pending rollups, per database.
pub async fn patch_pending<A>(api: &A, state: &mut DeploymentState)
where
    A: NotionApi + ?Sized,
{
    let titles: BTreeSet<String> = state
        .pending_relations
        .keys()
        .chain(state.pending_rollups.keys())
        .cloned()
        .collect();
    if titles.is_empty() {
        return;
    }
    info!(databases = titles.len(), "Patching deferred properties");

    for title in titles {
        let Some(database_id) = state.database_id(&title).map(str::to_string) else {
            warn!(database = %title, "Pending properties for a database that does not exist");
            continue;
        };
        patch_relations(api, state, &title, &database_id).await;
        patch_rollups(api, state, &title, &database_id).await;
    }
}

async fn patch_relations<A>(api: &A, state: &mut DeploymentState, title: &str, database_id: &str)
where
    A: NotionApi + ?Sized,
{
    let Some(pending) = state.pending_relations.get(title).cloned() else {
        return;
    };

    let mut properties = Map::new();
    for (name, def) in &pending {
        match PropertySpec::from_value(name, def).to_schema(&state.created_databases) {
            Ok(schema) => {
                properties.insert(name.clone(), schema);
            }
            Err(unresolved) => state.record_error(
                EntityKind::Relation,
                &format!("{}.{}", title, name),
                unresolved.to_string(),
            ),
        }
    }
    if properties.is_empty() {
        return;
    }

    let patched: Vec<String> = properties.keys().cloned().collect();
    match api
        .update_database(database_id, json!({"properties": properties}))
        .await
    {
        Ok(_) => {
            info!(database = %title, count = patched.len(), "Patched relations");
            state.stats.relations_patched += patched.len();
            remove_pending(&mut state.pending_relations, title, &patched);
        }
        Err(e) => {
            state.record_error(EntityKind::Relation, title, e.to_string());
            state.stats.patches_failed += 1;
        }
    }
}

async fn patch_rollups<A>(api: &A, state: &mut DeploymentState, title: &str, database_id: &str)
where
    A: NotionApi + ?Sized,
{
    let Some(pending) = state.pending_rollups.get(title).cloned() else {
        return;
    };

    let mut properties = Map::new();
    for (name, def) in &pending {
        // Rollups never reference other databases directly
        if let Ok(schema) = PropertySpec::from_value(name, def).to_schema(&BTreeMap::new()) {
            properties.insert(name.clone(), schema);
        }
    }

    let patched: Vec<String> = pending.keys().cloned().collect();
    match api
        .update_database(database_id, json!({"properties": properties}))
        .await
    {
        Ok(_) => {
            info!(database = %title, count = patched.len(), "Patched rollups");
            state.stats.rollups_patched += patched.len();
            remove_pending(&mut state.pending_rollups, title, &patched);
        }
        Err(e) => {
            state.record_error(EntityKind::Rollup, title, e.to_string());
            state.stats.patches_failed += 1;
        }
    }
}

fn remove_pending(pending: &mut BTreeMap<String, BTreeMap<String, Value>>, title: &str, done: &[String]) {
    if let Some(props) = pending.get_mut(title) {
        for name in done {
            props.remove(name);
        }
        if props.is_empty() {
            pending.remove(title);
        }
    }
}

/// Create seed rows for every deployed database.
pub async fn deploy_rows<A>(
    api: &A,
    databases: &[DatabaseDef],
    state: &mut DeploymentState,
    options: &DeployOptions,
) where
    A: NotionApi + ?Sized,
{
    for db in databases.iter().filter(|db| !db.seed_rows.is_empty()) {
        let title = db.title.as_str();
        let Some(database_id) = state.database_id(title).map(str::to_string) else {
            debug!(database = %title, "Database not deployed, skipping rows");
            continue;
        };
        let schema: Vec<(String, PropertySpec)> =
            database_schema(db, options.limits.max_properties_per_database)
                .into_iter()
                .map(|e| (e.name, e.spec))
                .collect();

        for (i, raw) in db.seed_rows.iter().enumerate() {
            let encoded = {
                let ctx = RowContext {
                    databases: &state.created_databases,
                    rows: &state.created_rows,
                    max_text_chars: options.limits.max_text_chars,
                };
                encode_row(raw, &schema, &ctx)
            };
            let Some(row) = encoded else {
                state.record_error(
                    EntityKind::Row,
                    &format!("{} row #{}", title, i + 1),
                    "row has no title value",
                );
                state.stats.rows_failed += 1;
                continue;
            };

            if state.row_id(title, &row.title).is_some() {
                state.stats.rows_existing += 1;
                continue;
            }

            match api.create_page(row_body(&database_id, &row)).await {
                Ok(created) => {
                    debug!(database = %title, row = %row.title, id = %created.id, "Created row");
                    state.record_row(title, &row.title, &created.id);
                    state.stats.rows_created += 1;
                }
                Err(e) => {
                    state.record_error(EntityKind::Row, &format!("{}/{}", title, row.title), e.to_string());
                    state.stats.rows_failed += 1;
                }
            }
        }
        info!(database = %title, rows = db.seed_rows.len(), "Seed rows processed");
    }
}

/// Append a link to each page's `database_link` database.
pub async fn link_databases<A>(
    api: &A,
    pages: &[PageDef],
    state: &mut DeploymentState,
) where
    A: NotionApi + ?Sized,
{
    for page in pages {
        let Some(database) = page.database_link.as_deref() else {
            continue;
        };
        if state.linked_pages.contains(&page.title) {
            continue;
        }
        let Some(page_id) = state.page_id(&page.title).map(str::to_string) else {
            continue;
        };
        let Some(database_id) = state.database_id(database).map(str::to_string) else {
            state.record_error(
                EntityKind::Link,
                &page.title,
                format!("database '{}' was not created", database),
            );
            continue;
        };

        let link = json!({"link_to_page": {"type": "database_id", "database_id": database_id}});
        match api.append_block_children(&page_id, vec![link]).await {
            Ok(()) => {
                info!(page = %page.title, database = %database, "Linked database");
                state.linked_pages.insert(page.title.clone());
                state.stats.links_created += 1;
            }
            Err(e) => state.record_error(EntityKind::Link, &page.title, e.to_string()),
        }
    }
}
