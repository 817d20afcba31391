//! `JobPipeline`: the scheduler. Registers itself in the cluster-wide
//! roster, computes its slice, leases jobs in that slice, maintains a local
//! FIFO queue, dispatches to workers, and renews leases.
//!
//! Every step of `refresh()` below runs in a fixed order with the same
//! policy: a failed step logs a warning and aborts the tick. No error here
//! is ever fatal — the next tick retries.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::document::{timestamp_millis, Document};
use crate::query;
use crate::shutdown::ShutdownHandle;
use crate::store::StoreClient;
use crate::worker::{Task, Worker};

const INITIAL_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const IDLE_POLL: Duration = Duration::from_millis(10);
/// Lease/roster-expiry margin, in multiples of the refresh interval. Nine
/// refresh ticks of grace before peers consider this pipeline dead.
const LEASE_MULTIPLIER: u32 = 10;

/// The fields a caller supplies at construction.
pub struct PipelineConfig<S: StoreClient + 'static> {
    pub task_name: String,
    pub index: String,
    pub filter: serde_json::Value,
    pub order: serde_json::Value,
    pub num_workers: usize,
    pub task: Task,
    pub client: Arc<S>,
}

/// Builder for `PipelineConfig`/`JobPipeline`.
pub struct JobPipelineBuilder<S: StoreClient + 'static> {
    task_name: String,
    index: String,
    filter: serde_json::Value,
    order: serde_json::Value,
    num_workers: usize,
    task: Option<Task>,
    client: Arc<S>,
    host: Option<String>,
}

impl<S: StoreClient + 'static> JobPipelineBuilder<S> {
    pub fn new(task_name: impl Into<String>, index: impl Into<String>, client: Arc<S>) -> Self {
        Self {
            task_name: task_name.into(),
            index: index.into(),
            filter: serde_json::json!({"match_all": {}}),
            order: serde_json::json!([{"_id": "asc"}]),
            num_workers: 1,
            task: None,
            client,
            host: None,
        }
    }

    pub fn filter(mut self, filter: serde_json::Value) -> Self {
        self.filter = filter;
        self
    }

    pub fn order(mut self, order: serde_json::Value) -> Self {
        self.order = order;
        self
    }

    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn task<F>(mut self, f: F) -> Self
    where
        F: Fn(Document) + Send + Sync + 'static,
    {
        self.task = Some(Arc::new(f));
        self
    }

    /// Overrides the host component of this pipeline's cluster-wide id
    /// (`<task_name>|<host>`) instead of deriving it from `HOSTNAME`/
    /// `COMPUTERNAME`. Useful in containerized deployments where the OS
    /// hostname isn't stable across restarts, and in tests that run several
    /// pipeline instances in one process and need them to look like
    /// distinct hosts.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn build(self) -> anyhow::Result<JobPipeline<S>> {
        let task = self
            .task
            .ok_or_else(|| anyhow::anyhow!("JobPipelineBuilder: task() is required"))?;
        if self.num_workers == 0 {
            anyhow::bail!("JobPipelineBuilder: num_workers must be at least 1");
        }
        Ok(JobPipeline::start_as(
            PipelineConfig {
                task_name: self.task_name,
                index: self.index,
                filter: self.filter,
                order: self.order,
                num_workers: self.num_workers,
                task,
                client: self.client,
            },
            self.host,
        ))
    }
}

/// One live instance of the scheduler on one host.
pub struct JobPipeline<S: StoreClient + 'static> {
    config: PipelineConfig<S>,
    id: String,
    refresh_interval: Duration,
    last_update: Instant,
    queue: Vec<Document>,
    queue_index: usize,
    running_jobs: HashSet<String>,
    slice_id: Option<usize>,
    slice_max: usize,
    workers: Vec<Worker<S>>,
}

impl<S: StoreClient + 'static> JobPipeline<S> {
    /// Initializes the pipeline and fires up all the workers, deriving the
    /// host component of its id from `HOSTNAME`/`COMPUTERNAME`.
    pub fn start(config: PipelineConfig<S>) -> Self {
        Self::start_as(config, None)
    }

    /// Like `start`, but with an explicit host override instead of deriving
    /// one from the environment (see `JobPipelineBuilder::host`).
    pub fn start_as(config: PipelineConfig<S>, host: Option<String>) -> Self {
        let host = host.unwrap_or_else(system_hostname);
        let id = format!("{}|{}", config.task_name, host);

        info!(task = %config.task_name, %id, "starting pipeline");

        let mut workers = Vec::with_capacity(config.num_workers);
        for _ in 0..config.num_workers {
            workers.push(Worker::start(config.client.clone(), config.task.clone()));
        }

        JobPipeline {
            id,
            refresh_interval: INITIAL_REFRESH_INTERVAL,
            last_update: Instant::now() - INITIAL_REFRESH_INTERVAL,
            queue: Vec::new(),
            queue_index: 0,
            running_jobs: HashSet::new(),
            slice_id: None,
            slice_max: 0,
            workers,
            config,
        }
    }

    /// This pipeline's cluster-wide id, `<task_name>|<host>`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn slice(&self) -> (Option<usize>, usize) {
        (self.slice_id, self.slice_max)
    }

    /// Tells all workers to stop, then waits for them to finish. Both the
    /// stop signal and the wait are fanned out concurrently rather than
    /// per-worker in sequence, so the call takes as long as the slowest
    /// worker's in-flight job, not the sum of all of them.
    pub async fn stop(&mut self) {
        info!(task = %self.config.task_name, "stopping pipeline");
        futures::future::join_all(self.workers.iter().map(|w| w.stop())).await;
        futures::future::join_all(self.workers.iter_mut().map(|w| w.wait_for_stop())).await;
        info!(task = %self.config.task_name, "pipeline stopped");
    }

    /// Attempts to assign the next job on the queue to a worker. This is the
    /// single dispatch tick a top-level driver loop calls repeatedly between
    /// `start` and `stop`.
    pub async fn process_once(&mut self) {
        if self.last_update.elapsed() > self.refresh_interval {
            self.refresh().await;
        }

        if self.queue_index >= self.queue.len() {
            tokio::time::sleep(self.refresh_interval).await;
            return;
        }

        let job = self.queue[self.queue_index].clone();
        for worker in &self.workers {
            if worker.send_job(job.clone()) {
                self.running_jobs.insert(job.key());
                self.queue_index += 1;
                return;
            }
        }

        // no worker was available
        tokio::time::sleep(IDLE_POLL).await;
    }

    /// Convenience driver loop: calls `process_once` until told to stop,
    /// then calls `stop`. Saves every caller from wiring up the same
    /// select-and-sleep loop by hand.
    pub async fn run(&mut self, mut shutdown: ShutdownHandle) {
        while !shutdown.is_stopping() {
            tokio::select! {
                _ = self.process_once() => {}
                _ = shutdown.wait() => break,
            }
        }
        self.stop().await;
    }

    fn lease_span(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.refresh_interval * LEASE_MULTIPLIER)
            .unwrap_or_else(|_| chrono::Duration::seconds(3600))
    }

    /// The coordination algorithm: five steps, any failure logs and aborts
    /// the tick. State is left as-is on failure; the next tick retries.
    ///
    /// `pub(crate)` rather than private so unit tests can drive a refresh in
    /// isolation, without also triggering `process_once`'s dispatch step.
    pub(crate) async fn refresh(&mut self) {
        // (a) refresh interval of the targeted index.
        let refresh_interval = match self
            .config
            .client
            .get_refresh_interval(&self.config.index)
            .await
        {
            Ok(interval) => interval,
            Err(err) => {
                warn!(index = %self.config.index, error = %err, "unable to get refresh_interval");
                return;
            }
        };
        self.refresh_interval = refresh_interval;

        // (b) register self in the roster.
        let expiration = timestamp_millis(Utc::now() + self.lease_span());
        let roster_body = query::roster_entry_body(&self.config.task_name, &expiration);
        if let Err(err) = self
            .config
            .client
            .index("workers", &self.id, &roster_body)
            .await
        {
            warn!(error = %err, "unable to register worker");
            return;
        }

        // (c) compute this instance's slice.
        let roster_query = query::roster_query(&self.config.task_name);
        let roster = match self.config.client.search("workers", &roster_query).await {
            Ok(docs) => docs,
            Err(err) => {
                warn!(error = %err, "failed to get list of workers in cluster");
                return;
            }
        };
        self.slice_max = roster.len();
        self.slice_id = roster.iter().position(|doc| doc.id == self.id);
        let slice_id = match self.slice_id {
            Some(id) => id,
            None => return, // not yet visible in our own roster
        };

        // (d) acquire new leases.
        let expiration = timestamp_millis(Utc::now() + self.lease_span());
        let slice = if self.slice_max > 1 {
            Some((slice_id, self.slice_max))
        } else {
            None
        };
        let acquire_query =
            query::lock_acquire_query(&self.config.filter, &self.id, &expiration, slice);
        if let Err(err) = self
            .config
            .client
            .update_by_query(&self.config.index, &acquire_query)
            .await
        {
            warn!(error = %err, "unable to lock jobs");
            return;
        }

        // (e) renew existing leases.
        let expiration = timestamp_millis(Utc::now() + self.lease_span());
        let renew_query = query::lock_renew_query(&self.id, &expiration);
        if let Err(err) = self
            .config
            .client
            .update_by_query(&self.config.index, &renew_query)
            .await
        {
            warn!(error = %err, "unable to renew locks");
            return;
        }

        // (f) rebuild the queue.
        let locked_query = query::locked_jobs_query(&self.id, &self.config.order);
        let locked = match self
            .config
            .client
            .search(&self.config.index, &locked_query)
            .await
        {
            Ok(docs) => docs,
            Err(err) => {
                warn!(error = %err, "failed to find locked jobs");
                return;
            }
        };

        let mut new_running_jobs = HashSet::with_capacity(self.running_jobs.len());
        let mut new_queue = Vec::with_capacity(locked.len());
        for doc in locked {
            let key = doc.key();
            if self.running_jobs.contains(&key) {
                new_running_jobs.insert(key);
            } else {
                new_queue.push(doc);
            }
        }
        self.running_jobs = new_running_jobs;
        self.queue = new_queue;
        self.queue_index = 0;
        self.last_update = Instant::now();
    }
}

/// Best-effort hostname lookup with no extra dependency: the roster id only
/// needs to be stable and distinct per host, not authoritative.
fn system_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}
