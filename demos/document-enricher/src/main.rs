//! # Document Enricher Demo
//!
//! Shows wiring a `JobPipeline` up to an Elasticsearch-style store with no
//! adapter layer: construct the store client directly, hand it to the
//! builder, and drive the pipeline until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::Result;
use jobslice_core::{JobPipelineBuilder, Shutdown};
use jobslice_store_es::EsStoreClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let base_url =
        std::env::var("STORE_URL").unwrap_or_else(|_| "http://localhost:9200".to_string());
    let store = Arc::new(EsStoreClient::new(base_url)?);

    let mut pipeline = JobPipelineBuilder::new("document-enricher", "documents", store)
        .filter(serde_json::json!({
            "term": {"status": "pending"}
        }))
        .order(serde_json::json!([{"created_at": "asc"}]))
        .num_workers(4)
        .task(|document| {
            tracing::info!(id = %document.id, "enriching document");
            // A real task would mutate the document here (e.g. via an
            // Update script) so it stops matching `Filter` and is never
            // re-leased.
        })
        .build()?;

    let (shutdown, handle) = Shutdown::new();
    tokio::spawn(shutdown.on_signals());

    pipeline.run(handle).await;

    Ok(())
}
