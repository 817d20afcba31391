//! Store response envelopes that cross the `StoreClient` trait boundary.
//!
//! Kept only where the scheduler or a caller actually inspects the shape;
//! wire-only decode types the scheduler never touches (e.g. `BulkResults`)
//! live in `jobslice-store-es` instead.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Retries {
    #[serde(default)]
    pub bulk: i64,
    #[serde(default)]
    pub search: i64,
}

/// Result of a `_update_by_query` request. The scheduler discards most of
/// this — `conflicts=proceed` already handles contested documents by
/// silently skipping them — but `updated`/`version_conflicts` are useful for
/// logging and metrics.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpdateByQueryResults {
    #[serde(default)]
    pub took: i64,
    #[serde(default)]
    pub timed_out: bool,
    pub total: i64,
    pub updated: i64,
    #[serde(default)]
    pub deleted: i64,
    #[serde(default)]
    pub batches: i64,
    #[serde(default, rename = "version_conflicts")]
    pub version_conflicts: i64,
    #[serde(default)]
    pub noops: i64,
    #[serde(default)]
    pub retries: Retries,
    #[serde(default, rename = "throttled_millis")]
    pub throttled_millis: i64,
    #[serde(default, rename = "requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default, rename = "throttled_until_millis")]
    pub throttled_until_millis: i64,
    #[serde(default)]
    pub failures: Vec<serde_json::Value>,
}
