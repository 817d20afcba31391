//! Request-body builders for the queries `refresh()` issues.
//!
//! A handful of small functions returning `serde_json::Value` is simpler to
//! reason about than a dynamic query-builder type, and keeps the exact JSON
//! shape sent to the store next to the code that constructs it.

use serde_json::{json, Value};

/// Roster upsert body for `/workers/doc/<pipeline_id>`.
pub fn roster_entry_body(task_name: &str, expires_at_millis: &str) -> Value {
    json!({
        "task": task_name,
        "expires_at": expires_at_millis,
    })
}

/// Find all live roster entries for `task_name`, sorted by `_id` ascending,
/// keys only.
pub fn roster_query(task_name: &str) -> Value {
    json!({
        "size": 10000,
        "_source": false,
        "sort": [{"_id": "asc"}],
        "query": {
            "bool": {
                "filter": [
                    {"range": {"expires_at": {"gt": "now"}}},
                    {"term": {"task": task_name}}
                ]
            }
        }
    })
}

/// Acquire new leases: documents whose lease is expired or absent, matching
/// the caller's filter, restricted to this pipeline's slice when
/// `slice_max > 1`.
pub fn lock_acquire_query(
    filter: &Value,
    lock_owner: &str,
    lock_until_millis: &str,
    slice: Option<(usize, usize)>,
) -> Value {
    let mut query = json!({
        "script": {
            "lang": "painless",
            "source": "ctx._source.lock_owner = params.lock_owner; ctx._source.lock_until = params.lock_until",
            "params": {
                "lock_owner": lock_owner,
                "lock_until": lock_until_millis,
            }
        },
        "query": {
            "bool": {
                "should": [
                    {"range": {"lock_until": {"lt": "now"}}},
                    {"bool": {"must_not": {"exists": {"field": "lock_until"}}}}
                ],
                "filter": [filter],
                "minimum_should_match": 1
            }
        }
    });
    if let Some((slice_id, slice_max)) = slice {
        query["slice"] = json!({"id": slice_id, "max": slice_max});
    }
    query
}

/// Renew leases already owned by `lock_owner`.
pub fn lock_renew_query(lock_owner: &str, lock_until_millis: &str) -> Value {
    json!({
        "script": {
            "lang": "painless",
            "source": "ctx._source.lock_owner = params.lock_owner; ctx._source.lock_until = params.lock_until",
            "params": {
                "lock_owner": lock_owner,
                "lock_until": lock_until_millis,
            }
        },
        "query": {
            "bool": {
                "filter": [
                    {"term": {"lock_owner": lock_owner}}
                ]
            }
        }
    })
}

/// Find all documents currently locked by `lock_owner`, sorted by the
/// caller's `order`, keys only.
pub fn locked_jobs_query(lock_owner: &str, order: &Value) -> Value {
    json!({
        "size": 10000,
        "_source": false,
        "sort": order,
        "query": {
            "bool": {
                "filter": [
                    {"term": {"lock_owner": lock_owner}}
                ]
            }
        }
    })
}
