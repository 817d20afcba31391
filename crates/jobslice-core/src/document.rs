//! The document envelope the store returns, and the scheduler's two reserved
//! fields it reads out of `source` (`lock_owner`, `lock_until`).
//!
//! A document is addressed by `/index/type/id` and identified for queue
//! bookkeeping by `id|version`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Shards {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub successful: i64,
    #[serde(default)]
    pub skipped: i64,
    #[serde(default)]
    pub failed: i64,
}

/// A document as returned by the store. `source` is left as a dynamic JSON
/// value since its shape is defined entirely by the task author; the
/// scheduler only ever reads the two reserved lock fields out of it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Document {
    #[serde(rename = "_shards", default)]
    pub shards: Shards,
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub r#type: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_version", default)]
    pub version: i64,
    #[serde(rename = "_seq_no", default)]
    pub seq_no: i64,
    #[serde(rename = "_primary_term", default)]
    pub primary_term: i64,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub found: bool,
    #[serde(rename = "_score", default)]
    pub score: f32,
    #[serde(rename = "_source", default)]
    pub source: serde_json::Value,
    #[serde(default)]
    pub status: i64,
}

impl Document {
    /// A key unique to this id at this version, used to track in-flight
    /// jobs across refresh cycles.
    pub fn key(&self) -> String {
        format!("{}|{}", self.id, self.version)
    }

    /// The store path addressing this document: `/index/type/id`.
    pub fn path(&self) -> String {
        format!("/{}/{}/{}", self.index, self.r#type, self.id)
    }

    pub fn lock_owner(&self) -> Option<&str> {
        self.source.get("lock_owner").and_then(|v| v.as_str())
    }

    pub fn lock_until_millis(&self) -> Option<i64> {
        self.source
            .get("lock_until")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}

/// Stringified UTC milliseconds since the epoch — the wire format the store
/// expects for `lock_until`/`expires_at`. Not RFC3339: the painless scripts
/// compare these as numbers via the store's own `now`.
pub fn timestamp_millis(at: DateTime<Utc>) -> String {
    at.timestamp_millis().to_string()
}
