//! A single cooperative job runner owning one in-flight job slot.
//!
//! Three single-slot mailboxes (`job`, `stop`, `stopped`), a 10ms idle poll,
//! and "always release the lease on exit, including the task panicking" as
//! the one hard invariant. `execute()` awaits the unlock call directly after
//! the task runs (or after the fetch fails) so the lease is actually
//! released — not merely scheduled — before the worker reports itself idle
//! again or acknowledges shutdown; the single-slot-mailbox contract maps
//! onto `tokio::sync::mpsc` bounded(1) channels with `try_send`/`try_recv`,
//! which is exactly a mutex-guarded optional slot under the hood.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::document::Document;
use crate::store::StoreClient;

const IDLE_POLL: Duration = Duration::from_millis(10);

/// The caller-supplied task function. Synchronous: the task owns its own
/// error handling, the scheduler's only contract is that the lease gets
/// released afterward.
pub type Task = Arc<dyn Fn(Document) + Send + Sync>;

pub struct Worker<S: StoreClient + 'static> {
    job_tx: mpsc::Sender<Document>,
    stop_tx: mpsc::Sender<()>,
    stopped_rx: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
    _store: std::marker::PhantomData<S>,
}

impl<S: StoreClient + 'static> Worker<S> {
    /// Spawns the worker's run loop and returns a handle to it.
    pub fn start(store: Arc<S>, task: Task) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Document>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        let (stopped_tx, stopped_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(Self::run(store, task, job_rx, stop_rx, stopped_tx));

        Worker {
            job_tx,
            stop_tx,
            stopped_rx,
            handle: Some(handle),
            _store: std::marker::PhantomData,
        }
    }

    async fn run(
        store: Arc<S>,
        task: Task,
        mut job_rx: mpsc::Receiver<Document>,
        mut stop_rx: mpsc::Receiver<()>,
        stopped_tx: mpsc::Sender<()>,
    ) {
        loop {
            // A job already sitting in the mailbox is drained before a
            // pending stop signal is honored — otherwise a job handed off by
            // `send_job` the instant before `stop()` is called would be
            // dropped unexecuted, leaving its lease held until expiry.
            if let Ok(job) = job_rx.try_recv() {
                Self::execute(store.clone(), task.clone(), job).await;
                continue;
            }

            if stop_rx.try_recv().is_ok() {
                let _ = stopped_tx.send(()).await;
                return;
            }

            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    async fn execute(store: Arc<S>, task: Task, job: Document) {
        let path = job.path();

        let fetched = match store.get_document(&path).await {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(%path, error = %err, "failed to load document fields before task execution");
                None
            }
        };

        if let Some(doc) = fetched {
            // catch_unwind keeps a panicking task from also unwinding the
            // worker's driving task; the unlock below still runs afterward.
            if std::panic::catch_unwind(AssertUnwindSafe(|| (task)(doc))).is_err() {
                error!(%path, "task panicked during execution");
            }
        }

        // Always release the lease on exit from this step, whether the
        // fetch failed, the task returned normally, or the task panicked —
        // awaited directly so the lease is actually gone, not merely
        // scheduled, before this worker reports idle or acks shutdown.
        if let Err(err) = store.unlock(&path).await {
            warn!(%path, error = %err, "failed to release lease after task execution");
        }
    }

    /// Offers `job` to this worker. Returns true iff the slot was empty —
    /// the dispatch primitive `JobPipeline::process_once` uses to find an
    /// idle worker.
    pub fn send_job(&self, job: Document) -> bool {
        self.job_tx.try_send(job).is_ok()
    }

    /// Signals the worker to stop after its current job.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(()).await;
    }

    /// Blocks until the worker has acknowledged shutdown.
    pub async fn wait_for_stop(&mut self) {
        let _ = self.stopped_rx.recv().await;
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
