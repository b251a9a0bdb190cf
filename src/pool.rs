//! Fixed-size worker pool draining one shared FIFO queue.
//!
//! Each job is popped by exactly one worker. A failing or panicking job is logged
//! with its label, counted and dropped; the remaining jobs carry on. Counters are atomics
//! owned by the pool and only read into a [`PoolReport`] after every worker has
//! been joined.

use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{KbsyncError, Result};

/// What happened to one job that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Updated,
    /// Nothing to do, e.g. the entity is not in the graph yet
    Skipped,
}

#[async_trait]
pub trait JobHandler<T>: Send + Sync {
    async fn handle(&self, job: &T) -> Result<JobOutcome>;

    /// Name used for the job in log lines and the failure list.
    fn label(&self, job: &T) -> String;
}

/// Totals for one pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub submitted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Jobs still queued when the run was cancelled
    pub abandoned: usize,
    /// Labels of failed jobs, in completion order
    pub failures: Vec<String>,
    pub cancelled: bool,
}

impl PoolReport {
    pub fn processed(&self) -> usize {
        self.updated + self.skipped + self.failed
    }

    /// Failed share of the jobs that were attempted.
    pub fn failure_rate(&self) -> f64 {
        match self.processed() {
            0 => 0.0,
            n => self.failed as f64 / n as f64,
        }
    }
}

/// Stops workers from taking new jobs. Jobs already running finish normally.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Default)]
struct Counters {
    updated: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    failures: std::sync::Mutex<Vec<String>>,
}

pub struct WorkerPool<T> {
    queue_tx: Option<mpsc::UnboundedSender<T>>,
    queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancelHandle,
    counters: Arc<Counters>,
    submitted: usize,
}

impl<T: Send + Sync + 'static> WorkerPool<T> {
    /// Start `workers` tasks (at least one). A milestone is logged every
    /// `progress_every` successful updates.
    pub fn spawn(workers: usize, progress_every: usize, handler: Arc<dyn JobHandler<T>>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (cancel_tx, _) = watch::channel(false);
        let cancel = CancelHandle { tx: Arc::new(cancel_tx) };
        let counters = Arc::new(Counters::default());

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    queue_rx.clone(),
                    cancel.tx.subscribe(),
                    handler.clone(),
                    counters.clone(),
                    progress_every.max(1),
                ))
            })
            .collect();

        Self {
            queue_tx: Some(queue_tx),
            queue_rx,
            workers,
            cancel,
            counters,
            submitted: 0,
        }
    }

    /// Queue a job. Fails once the pool has been cancelled.
    pub fn submit(&mut self, job: T) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(KbsyncError::InvalidInput("worker pool is cancelled".to_string()));
        }
        self.queue_tx
            .as_ref()
            .ok_or_else(|| KbsyncError::InvalidInput("worker pool queue is closed".to_string()))?
            .send(job)
            .map_err(|_| KbsyncError::InvalidInput("worker pool queue is closed".to_string()))?;
        self.submitted += 1;
        Ok(())
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Close the queue, wait for every worker to drain it and exit, then report.
    pub async fn finish(mut self) -> PoolReport {
        self.queue_tx.take();

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                log::error!("Worker task aborted: {}", e);
            }
        }

        let mut abandoned = 0;
        {
            let mut rx = self.queue_rx.lock().await;
            while rx.try_recv().is_ok() {
                abandoned += 1;
            }
        }

        let failures = self
            .counters
            .failures
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default();

        let report = PoolReport {
            submitted: self.submitted,
            updated: self.counters.updated.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            abandoned,
            failures,
            cancelled: self.cancel.is_cancelled(),
        };

        log::info!(
            "Pool finished: {} submitted, {} updated, {} skipped, {} failed, {} abandoned",
            report.submitted,
            report.updated,
            report.skipped,
            report.failed,
            report.abandoned
        );
        report
    }
}

async fn run_worker<T: Send + Sync + 'static>(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
    mut cancelled: watch::Receiver<bool>,
    handler: Arc<dyn JobHandler<T>>,
    counters: Arc<Counters>,
    progress_every: usize,
) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancelled.wait_for(|stop| *stop) => None,
                job = rx.recv() => job,
            }
        };

        let Some(job) = next else {
            break;
        };

        let outcome = AssertUnwindSafe(handler.handle(&job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(KbsyncError::Task(panic_message(panic.as_ref()))));

        match outcome {
            Ok(JobOutcome::Updated) => {
                let done = counters.updated.fetch_add(1, Ordering::SeqCst) + 1;
                if done % progress_every == 0 {
                    log::info!("{} entities updated so far", done);
                }
            }
            Ok(JobOutcome::Skipped) => {
                counters.skipped.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                let label = handler.label(&job);
                log::error!("Update failed for [{}]: {}", label, e);
                counters.failed.fetch_add(1, Ordering::SeqCst);
                if let Ok(mut failures) = counters.failures.lock() {
                    failures.push(label);
                }
            }
        }
    }

    log::debug!("Worker {} exiting", worker_id);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("job panicked: {}", detail)
}
