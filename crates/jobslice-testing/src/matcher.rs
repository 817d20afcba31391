//! A small interpreter for the subset of Elasticsearch query DSL
//! `jobslice_core::queries` emits plus simple caller filters: `match_all`,
//! `term`, `exists`, `range` (against `"now"` only), and `bool` with
//! `filter`/`must_not`/`should` + `minimum_should_match`.

use serde_json::Value;

fn as_clause_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// `lock_until`/`expires_at` are stored as millisecond-epoch strings; `now`
/// here is the caller-supplied instant the comparison runs against.
fn field_millis(source: &Value, field: &str) -> Option<i64> {
    let value = source.get(field)?;
    if let Some(s) = value.as_str() {
        return s.parse().ok();
    }
    value.as_i64()
}

pub fn filter_matches(filter: &Value, source: &Value, now_millis: i64) -> bool {
    let Some(obj) = filter.as_object() else {
        return true;
    };

    if obj.contains_key("match_all") {
        return true;
    }

    if let Some(term) = obj.get("term").and_then(|t| t.as_object()) {
        return term
            .iter()
            .all(|(field, expected)| source.get(field) == Some(expected));
    }

    if let Some(exists) = obj.get("exists").and_then(|e| e.as_object()) {
        let field = exists.get("field").and_then(|f| f.as_str()).unwrap_or("");
        return source.get(field).is_some();
    }

    if let Some(range) = obj.get("range").and_then(|r| r.as_object()) {
        return range.iter().all(|(field, cond)| {
            let Some(actual) = field_millis(source, field) else {
                // "lt now" with a missing field is a non-match; a missing
                // field should instead be expressed via `must_not: exists`.
                return false;
            };
            let cond = match cond.as_object() {
                Some(c) => c,
                None => return false,
            };
            let lt_ok = cond
                .get("lt")
                .map(|_| actual < now_millis)
                .unwrap_or(true);
            let gt_ok = cond
                .get("gt")
                .map(|_| actual > now_millis)
                .unwrap_or(true);
            lt_ok && gt_ok
        });
    }

    if let Some(bool_query) = obj.get("bool").and_then(|b| b.as_object()) {
        if let Some(filters) = bool_query.get("filter") {
            let clauses = as_clause_list(filters);
            if !clauses.iter().all(|f| filter_matches(f, source, now_millis)) {
                return false;
            }
        }

        if let Some(must_not) = bool_query.get("must_not") {
            let clauses = as_clause_list(must_not);
            if clauses.iter().any(|f| filter_matches(f, source, now_millis)) {
                return false;
            }
        }

        if let Some(should) = bool_query.get("should") {
            let clauses = as_clause_list(should);
            let minimum = bool_query
                .get("minimum_should_match")
                .and_then(|m| m.as_u64())
                .unwrap_or(0) as usize;
            if minimum > 0 {
                let matched = clauses
                    .iter()
                    .filter(|f| filter_matches(f, source, now_millis))
                    .count();
                if matched < minimum {
                    return false;
                }
            }
        }

        return true;
    }

    // Unknown clause shape: treat conservatively as a non-match rather than
    // silently letting everything through.
    false
}
