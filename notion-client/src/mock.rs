//! Recording mock of the workspace API for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::api::NotionApi;
use crate::error::{NotionError, Result};
use crate::types::{object_title, ObjectKind, ObjectRef};

/// One call observed by [`MockApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreatePage(Value),
    CreateDatabase(Value),
    UpdateDatabase { database_id: String, body: Value },
    AppendChildren { block_id: String, children: Vec<Value> },
    FindByTitle { kind: ObjectKind, title: String },
}

#[derive(Default)]
struct MockInner {
    calls: Vec<MockCall>,
    next_id: u32,
    existing: HashMap<(ObjectKind, String), String>,
    failing: HashSet<String>,
    failing_updates: HashSet<String>,
}

/// Mock API for testing.
///
/// Hands out sequential IDs (`page-1`, `database-2`, ...), remembers every
/// created title so `find_by_title` sees it, and records all calls.
#[derive(Default)]
pub struct MockApi {
    inner: Mutex<MockInner>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend an object with this title already exists remotely.
    pub fn with_existing(self, kind: ObjectKind, title: &str, id: &str) -> Self {
        self.lock()
            .existing
            .insert((kind, title.to_string()), id.to_string());
        self
    }

    /// Make creation of any page/database with this title fail with a 400.
    pub fn with_failure(self, title: &str) -> Self {
        self.lock().failing.insert(title.to_string());
        self
    }

    /// Make `update_database` for this database ID fail with a 400.
    pub fn with_failing_update(self, database_id: &str) -> Self {
        self.lock().failing_updates.insert(database_id.to_string());
        self
    }

    /// All calls in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Titles of created pages (including rows) in creation order.
    pub fn created_page_titles(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                MockCall::CreatePage(body) => body_title(body),
                _ => None,
            })
            .collect()
    }

    /// Bodies sent to `create_database`.
    pub fn created_databases(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::CreateDatabase(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    /// `(database_id, body)` pairs sent to `update_database`.
    pub fn database_updates(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::UpdateDatabase { database_id, body } => Some((database_id, body)),
                _ => None,
            })
            .collect()
    }

    /// Number of create calls (pages, rows and databases).
    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::CreatePage(_) | MockCall::CreateDatabase(_)))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        // A poisoned lock only happens after a panicking test
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create(&self, kind: ObjectKind, call: MockCall, body: &Value) -> Result<ObjectRef> {
        let mut inner = self.lock();
        inner.calls.push(call);

        let title = body_title(body).unwrap_or_default();
        if inner.failing.contains(&title) {
            return Err(NotionError::Api {
                status: 400,
                code: "validation_error".to_string(),
                message: format!("mock failure for '{}'", title),
            });
        }

        inner.next_id += 1;
        let id = format!("{}-{}", kind.as_str(), inner.next_id);

        // Rows are pages too, but only top-level pages are searchable by title here
        let is_row = body
            .get("parent")
            .and_then(|p| p.get("database_id"))
            .is_some();
        if !is_row {
            inner.existing.insert((kind, title), id.clone());
        }

        Ok(ObjectRef {
            id,
            object: kind.as_str().to_string(),
            url: None,
        })
    }
}

#[async_trait]
impl NotionApi for MockApi {
    async fn create_page(&self, body: Value) -> Result<ObjectRef> {
        self.create(ObjectKind::Page, MockCall::CreatePage(body.clone()), &body)
    }

    async fn create_database(&self, body: Value) -> Result<ObjectRef> {
        self.create(
            ObjectKind::Database,
            MockCall::CreateDatabase(body.clone()),
            &body,
        )
    }

    async fn update_database(&self, database_id: &str, body: Value) -> Result<ObjectRef> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::UpdateDatabase {
            database_id: database_id.to_string(),
            body,
        });
        if inner.failing_updates.contains(database_id) {
            return Err(NotionError::Api {
                status: 400,
                code: "validation_error".to_string(),
                message: format!("mock update failure for '{}'", database_id),
            });
        }
        Ok(ObjectRef {
            id: database_id.to_string(),
            object: "database".to_string(),
            url: None,
        })
    }

    async fn append_block_children(&self, block_id: &str, children: Vec<Value>) -> Result<()> {
        self.lock().calls.push(MockCall::AppendChildren {
            block_id: block_id.to_string(),
            children,
        });
        Ok(())
    }

    async fn find_by_title(&self, kind: ObjectKind, title: &str) -> Result<Option<String>> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::FindByTitle {
            kind,
            title: title.to_string(),
        });
        Ok(inner.existing.get(&(kind, title.to_string())).cloned())
    }
}

/// Title of a page, row or database creation body.
pub fn body_title(body: &Value) -> Option<String> {
    if let Some(parts) = body.get("title").and_then(|t| t.as_array()) {
        return Some(text_of(parts));
    }
    let properties = body.get("properties")?.as_object()?;
    // Pages use a "title" key; rows use whichever property holds a title array
    if let Some(parts) = properties
        .get("title")
        .and_then(|p| p.get("title"))
        .and_then(|t| t.as_array())
    {
        return Some(text_of(parts));
    }
    properties
        .values()
        .find_map(|p| p.get("title").and_then(|t| t.as_array()))
        .map(|parts| text_of(parts))
        .or_else(|| object_title(body))
}

fn text_of(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.get("content")).and_then(|c| c.as_str()))
        .collect()
}
