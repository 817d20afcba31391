//! # jobslice-core
//!
//! A coordinator-free job pipeline scheduler over a search-and-index style
//! document store (Elasticsearch REST semantics). Multiple host processes
//! run copies of the pipeline; each locks a disjoint slice of the eligible
//! document population, drains that slice through a worker pool, then
//! refreshes the slice. Mutual exclusion across the cluster comes entirely
//! from the store's conditional-update primitives — there is no central
//! coordinator.
//!
//! ## Architecture
//!
//! ```text
//! JobPipeline::refresh()
//!     │  register in roster, compute slice, acquire + renew leases
//!     ▼
//! queue: Vec<Document>  (documents this pipeline currently leases)
//!     │
//!     ▼ process_once()
//! Worker::send_job()  ───►  Worker::run()  ───►  task(document)  ───►  unlock
//! ```
//!
//! ## Key Invariants
//!
//! 1. A job has an active lease iff `lock_until > now` and
//!    `lock_owner == this_pipeline.id`.
//! 2. At most one pipeline holds an active lease on a document at a time —
//!    guaranteed transitively by the store's conditional update.
//! 3. `queue` contains only documents this pipeline currently leases.
//! 4. `running_jobs` and `queue[queue_index:]` are always disjoint.
//!
//! See `StoreClient` for the five operations a backend must implement, and
//! `JobPipelineBuilder` for constructing a pipeline.

mod document;
mod error;
mod pipeline;
mod query;
mod results;
mod shutdown;
mod store;
mod worker;

pub use document::{timestamp_millis, Document, Shards};
pub use error::{Error, Result};
pub use pipeline::{JobPipeline, JobPipelineBuilder, PipelineConfig};
pub use results::{Retries, UpdateByQueryResults};
pub use shutdown::{Shutdown, ShutdownHandle};
pub use store::StoreClient;
pub use worker::{Task, Worker};

// Query builders are a supporting implementation detail of `refresh()`, but
// are exposed so a `StoreClient` implementation (or test) can reason about
// exactly what JSON the scheduler sends without duplicating the shapes.
pub mod queries {
    pub use crate::query::*;
}

#[cfg(test)]
mod tests;
