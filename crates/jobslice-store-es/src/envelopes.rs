//! Wire-only decode shapes the scheduler itself never inspects — kept here
//! rather than in `jobslice-core` since nothing upstream of the HTTP
//! boundary needs them.

use jobslice_core::{Document, Shards};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub took: i64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, rename = "_shards")]
    pub shards: Shards,
    pub hits: Hits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: TotalHits,
    #[serde(default, rename = "max_score")]
    pub max_score: Option<f32>,
    pub hits: Vec<Document>,
}

/// Modern Elasticsearch nests `total` as `{value, relation}`; older clusters
/// return a bare integer. Accept both.
#[derive(Debug, Clone, Default)]
pub struct TotalHits(pub i64);

impl<'de> Deserialize<'de> for TotalHits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Bare(i64),
            Nested { value: i64 },
        }
        Ok(match Shape::deserialize(deserializer)? {
            Shape::Bare(v) => TotalHits(v),
            Shape::Nested { value } => TotalHits(value),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkResults {
    #[serde(default)]
    pub took: i64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<OperationResult>,
}

/// One bulk response item. Exactly one of these is set per item, keyed by
/// which action the corresponding request line used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationResult {
    pub index: Option<Document>,
    pub delete: Option<Document>,
    pub create: Option<Document>,
    pub update: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiSearchResults {
    pub responses: Vec<SearchResults>,
}

pub type IndexSettingsResults = std::collections::HashMap<String, SettingsResults>;

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsResults {
    pub settings: Settings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub index: IndexSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    #[serde(rename = "refresh_interval")]
    pub refresh_interval: String,
}
