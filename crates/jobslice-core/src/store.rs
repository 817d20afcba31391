//! The store abstraction the scheduler and worker depend on.
//!
//! `StoreClient` is the policy trait; `jobslice-store-es` provides the
//! Elasticsearch-style REST implementation, and `jobslice-testing` provides
//! an in-memory one for tests.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::document::Document;
use crate::error::Result;
use crate::results::UpdateByQueryResults;

/// Operations a document store must support for `JobPipeline` to function.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Upsert a document, returning the stored envelope.
    async fn index(&self, index: &str, id: &str, body: &Value) -> Result<Document>;

    /// Fetch the full document at `/index/type/id`.
    async fn get_document(&self, path: &str) -> Result<Document>;

    /// Partial/scripted update with `retry_on_conflict=3`.
    async fn update(&self, path: &str, body: &Value) -> Result<Document>;

    /// Scripted update over a filter, with `conflicts=proceed`.
    async fn update_by_query(&self, index: &str, body: &Value) -> Result<UpdateByQueryResults>;

    /// Run a query; fails if the store reports `timed_out`.
    async fn search(&self, index: &str, query: &Value) -> Result<Vec<Document>>;

    /// Read the index's visibility-refresh interval.
    async fn get_refresh_interval(&self, index: &str) -> Result<Duration>;

    /// Release the lease on a document: clear `lock_until`/`lock_owner`.
    ///
    /// Implemented in terms of `update`, so backends only need to implement
    /// the five primitives above.
    async fn unlock(&self, path: &str) -> Result<Document> {
        let body = serde_json::json!({
            "doc": {
                "lock_until": "0",
                "lock_owner": "None",
            }
        });
        self.update(path, &body).await
    }
}
