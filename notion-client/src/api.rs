//! The `NotionApi` trait - the seam between the deploy engine and the wire.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{ObjectKind, ObjectRef};

/// Operations the deploy engine needs from the workspace API.
///
/// Implemented by [`crate::NotionClient`] for real deployments,
/// [`crate::DryRunApi`] for dry runs and [`crate::MockApi`] for tests.
#[async_trait]
pub trait NotionApi: Send + Sync {
    /// `POST /pages`. Also used for database rows (parent is a database).
    async fn create_page(&self, body: Value) -> Result<ObjectRef>;

    /// `POST /databases`
    async fn create_database(&self, body: Value) -> Result<ObjectRef>;

    /// `PATCH /databases/{id}`
    async fn update_database(&self, database_id: &str, body: Value) -> Result<ObjectRef>;

    /// `PATCH /blocks/{id}/children`
    async fn append_block_children(&self, block_id: &str, children: Vec<Value>) -> Result<()>;

    /// Look up an existing object by exact title.
    async fn find_by_title(&self, kind: ObjectKind, title: &str) -> Result<Option<String>>;
}
