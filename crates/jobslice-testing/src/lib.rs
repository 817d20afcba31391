//! In-memory `StoreClient` for testing `jobslice-core` pipelines without a
//! live Elasticsearch-style store.
//!
//! A lightweight stand-in implementing the same trait real backends do, so
//! scheduler/worker/roster logic is unit-testable in isolation. The query
//! matcher understands the shapes `jobslice_core::queries` builders emit
//! (`term`, `bool` `filter`/`must_not`/`should`, `exists`, `range` against
//! `now`) plus `match_all`, which covers every query the scheduler itself
//! issues and any caller `Filter` built from the same small vocabulary.

mod matcher;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jobslice_core::{Document, Error, Result, Shards, StoreClient, UpdateByQueryResults};
use tokio::sync::Mutex;

use matcher::filter_matches;

#[derive(Debug, Clone)]
struct StoredDoc {
    version: i64,
    source: serde_json::Value,
}

/// An in-memory document store keyed by `index -> id`. Cheap to clone-share
/// via `Arc` the same way a real connection pool would be.
pub struct MockStore {
    indices: Mutex<HashMap<String, HashMap<String, StoredDoc>>>,
    refresh_interval: Duration,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            indices: Mutex::new(HashMap::new()),
            refresh_interval: Duration::from_millis(50),
        }
    }

    pub fn with_refresh_interval(refresh_interval: Duration) -> Self {
        Self {
            indices: Mutex::new(HashMap::new()),
            refresh_interval,
        }
    }

    /// Seeds a document directly, bypassing the `StoreClient` trait. Useful
    /// for setting up scenarios (e.g. a document with an already-expired
    /// lease, or a peer's stale roster entry).
    pub async fn seed(&self, index: &str, id: &str, source: serde_json::Value) {
        let mut indices = self.indices.lock().await;
        let idx = indices.entry(index.to_string()).or_default();
        idx.insert(id.to_string(), StoredDoc { version: 1, source });
        tracing::debug!(index, id, "seeded document");
    }

    /// Reads a document's current `source` back out, for assertions.
    pub async fn get(&self, index: &str, id: &str) -> Option<serde_json::Value> {
        let indices = self.indices.lock().await;
        indices.get(index)?.get(id).map(|doc| doc.source.clone())
    }

    /// The current version of a seeded/claimed document, for assertions
    /// about `Document::key()` churn across refreshes.
    pub async fn version(&self, index: &str, id: &str) -> Option<i64> {
        let indices = self.indices.lock().await;
        indices.get(index)?.get(id).map(|doc| doc.version)
    }

    fn to_document(index: &str, id: &str, doc: &StoredDoc) -> Document {
        Document {
            shards: Shards::default(),
            index: index.to_string(),
            r#type: "doc".to_string(),
            id: id.to_string(),
            version: doc.version,
            seq_no: 0,
            primary_term: 0,
            result: "updated".to_string(),
            found: true,
            score: 0.0,
            source: doc.source.clone(),
            status: 200,
        }
    }
}

fn parse_path(path: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if parts.len() < 3 {
        return Err(Error::Decode(format!("invalid document path: {path}")));
    }
    Ok((parts[0].to_string(), parts[2].to_string()))
}

/// A simple, stable, non-cryptographic hash (FNV-1a) used to assign a
/// document to a slice residue the same way the store's scripted `slice`
/// parameter would — deterministic across calls, so the same document
/// always lands in the same residue for a given `slice_max`.
fn fnv1a(value: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    value.bytes().fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

#[async_trait]
impl StoreClient for MockStore {
    async fn index(&self, index: &str, id: &str, body: &serde_json::Value) -> Result<Document> {
        let mut indices = self.indices.lock().await;
        let idx = indices.entry(index.to_string()).or_default();
        let entry = idx.entry(id.to_string()).or_insert(StoredDoc {
            version: 0,
            source: serde_json::json!({}),
        });
        entry.version += 1;
        entry.source = body.clone();
        Ok(Self::to_document(index, id, entry))
    }

    async fn get_document(&self, path: &str) -> Result<Document> {
        let (index, id) = parse_path(path)?;
        let indices = self.indices.lock().await;
        let doc = indices
            .get(&index)
            .and_then(|idx| idx.get(&id))
            .ok_or_else(|| Error::Status {
                status: 404,
                body: format!("document {path} not found"),
            })?;
        Ok(Self::to_document(&index, &id, doc))
    }

    async fn update(&self, path: &str, body: &serde_json::Value) -> Result<Document> {
        let (index, id) = parse_path(path)?;
        let mut indices = self.indices.lock().await;
        let idx = indices.entry(index.clone()).or_default();
        let entry = idx.get_mut(&id).ok_or_else(|| Error::Status {
            status: 404,
            body: format!("document {path} not found"),
        })?;
        if let Some(patch) = body.get("doc").and_then(|d| d.as_object()) {
            if let Some(obj) = entry.source.as_object_mut() {
                for (field, value) in patch {
                    obj.insert(field.clone(), value.clone());
                }
            }
        }
        entry.version += 1;
        Ok(Self::to_document(&index, &id, entry))
    }

    async fn update_by_query(
        &self,
        index: &str,
        body: &serde_json::Value,
    ) -> Result<UpdateByQueryResults> {
        let mut indices = self.indices.lock().await;
        let idx = indices.entry(index.to_string()).or_default();

        let query = body.get("query").cloned().unwrap_or(serde_json::json!({}));
        let script_params = body
            .get("script")
            .and_then(|s| s.get("params"))
            .cloned()
            .unwrap_or(serde_json::json!({}));
        let slice = body.get("slice").and_then(|s| s.as_object());

        let now_millis = Utc::now().timestamp_millis();
        let mut updated = 0i64;
        let ids: Vec<String> = idx.keys().cloned().collect();
        for id in ids {
            if let Some(slice_obj) = slice {
                let slice_id = slice_obj["id"].as_u64().unwrap_or(0) as u64;
                let slice_max = slice_obj["max"].as_u64().unwrap_or(1).max(1);
                if fnv1a(&id) % slice_max != slice_id {
                    continue;
                }
            }

            let doc = idx.get(&id).expect("id came from this map's own keys");
            if !filter_matches(&query, &doc.source, now_millis) {
                continue;
            }

            let doc = idx.get_mut(&id).expect("id came from this map's own keys");
            if let Some(obj) = doc.source.as_object_mut() {
                if let Some(params) = script_params.as_object() {
                    if let Some(owner) = params.get("lock_owner") {
                        obj.insert("lock_owner".to_string(), owner.clone());
                    }
                    if let Some(until) = params.get("lock_until") {
                        obj.insert("lock_until".to_string(), until.clone());
                    }
                }
            }
            doc.version += 1;
            updated += 1;
        }

        Ok(UpdateByQueryResults {
            total: updated,
            updated,
            ..Default::default()
        })
    }

    async fn search(&self, index: &str, query: &serde_json::Value) -> Result<Vec<Document>> {
        let indices = self.indices.lock().await;
        let idx = match indices.get(index) {
            Some(idx) => idx,
            None => return Ok(Vec::new()),
        };

        let q = query
            .get("query")
            .cloned()
            .unwrap_or(serde_json::json!({"match_all": {}}));
        let now_millis = Utc::now().timestamp_millis();

        let mut docs: Vec<Document> = idx
            .iter()
            .filter(|(_, doc)| filter_matches(&q, &doc.source, now_millis))
            .map(|(id, doc)| Self::to_document(index, id, doc))
            .collect();

        // The mock doesn't interpret the caller's `sort` spec; it sorts by
        // id so results are at least deterministic across calls.
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    async fn get_refresh_interval(&self, _index: &str) -> Result<Duration> {
        Ok(self.refresh_interval)
    }
}
