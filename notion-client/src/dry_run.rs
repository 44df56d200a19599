//! Dry-run implementation: logs what would be sent and fabricates IDs.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

use crate::api::NotionApi;
use crate::error::Result;
use crate::mock::body_title;
use crate::types::{ObjectKind, ObjectRef};

/// API stand-in for `--dry-run`. Never touches the network.
#[derive(Default)]
pub struct DryRunApi {
    requests: AtomicU32,
}

impl DryRunApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests that would have been sent.
    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    fn fabricate(&self, kind: ObjectKind, body: &Value) -> ObjectRef {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let id = format!("dry-run-{}", uuid::Uuid::new_v4());
        info!(
            kind = kind.as_str(),
            title = %body_title(body).unwrap_or_default(),
            id = %id,
            "[dry-run] would create"
        );
        ObjectRef {
            id,
            object: kind.as_str().to_string(),
            url: None,
        }
    }
}

#[async_trait]
impl NotionApi for DryRunApi {
    async fn create_page(&self, body: Value) -> Result<ObjectRef> {
        Ok(self.fabricate(ObjectKind::Page, &body))
    }

    async fn create_database(&self, body: Value) -> Result<ObjectRef> {
        Ok(self.fabricate(ObjectKind::Database, &body))
    }

    async fn update_database(&self, database_id: &str, body: Value) -> Result<ObjectRef> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let properties: Vec<&String> = body
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|p| p.keys().collect())
            .unwrap_or_default();
        info!(database_id, ?properties, "[dry-run] would patch database");
        Ok(ObjectRef {
            id: database_id.to_string(),
            object: "database".to_string(),
            url: None,
        })
    }

    async fn append_block_children(&self, block_id: &str, children: Vec<Value>) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        info!(block_id, count = children.len(), "[dry-run] would append blocks");
        Ok(())
    }

    async fn find_by_title(&self, _kind: ObjectKind, _title: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
