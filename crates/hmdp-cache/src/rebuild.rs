//! Bounded worker pool for background cache rebuilds.

use crate::metrics::CacheMetrics;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use hmdp_config::CacheConfig;
use hmdp_core::{HmdpError, HmdpResult};
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};

type AbandonHook = Box<dyn FnOnce() + Send>;

/// A unit of background work. Tasks handle their own errors.
///
/// A task may carry an abandon hook. The hook runs when the task is dropped
/// before its work finished: still queued when the pool stops, aborted
/// mid-run, or panicked.
pub struct RebuildTask {
    work: Option<BoxFuture<'static, ()>>,
    on_abandon: Option<AbandonHook>,
}

impl RebuildTask {
    /// Wrap a future as a task.
    pub fn new<F>(work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            work: Some(work.boxed()),
            on_abandon: None,
        }
    }

    /// Run `hook` if the task never completes.
    #[must_use]
    pub fn on_abandon<H>(mut self, hook: H) -> Self
    where
        H: FnOnce() + Send + 'static,
    {
        self.on_abandon = Some(Box::new(hook));
        self
    }

    /// Drop the task without running its abandon hook.
    pub fn discard(mut self) {
        self.on_abandon = None;
    }

    async fn run(mut self) {
        if let Some(work) = self.work.take() {
            work.await;
        }
        self.on_abandon = None;
    }
}

impl Drop for RebuildTask {
    fn drop(&mut self) {
        if let Some(hook) = self.on_abandon.take() {
            hook();
        }
    }
}

impl std::fmt::Debug for RebuildTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildTask")
            .field("has_abandon_hook", &self.on_abandon.is_some())
            .finish_non_exhaustive()
    }
}

/// A task `submit` refused, handed back to the caller.
#[derive(Debug)]
pub struct RejectedTask {
    task: RebuildTask,
    reason: HmdpError,
}

impl RejectedTask {
    /// Why the task was refused.
    pub fn reason(&self) -> &HmdpError {
        &self.reason
    }

    /// Take the task back. Dropping it runs its abandon hook.
    pub fn into_task(self) -> RebuildTask {
        self.task
    }
}

impl From<RejectedTask> for HmdpError {
    fn from(rejected: RejectedTask) -> Self {
        rejected.reason
    }
}

/// Rebuild pool configuration.
#[derive(Debug, Clone)]
pub struct RebuildExecutorConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Pending tasks allowed before `submit` rejects.
    pub queue_capacity: usize,
    /// How long `shutdown` waits for workers to drain.
    pub shutdown_timeout: Duration,
}

impl Default for RebuildExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 1024,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&CacheConfig> for RebuildExecutorConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            workers: config.rebuild_workers,
            queue_capacity: config.rebuild_queue_capacity,
            shutdown_timeout: config.rebuild_shutdown_timeout(),
        }
    }
}

/// Snapshot of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Tasks accepted by `submit`.
    pub submitted: u64,
    /// Tasks that ran to completion.
    pub completed: u64,
    /// Tasks that panicked.
    pub panicked: u64,
    /// Tasks refused because the queue was full or closed.
    pub rejected: u64,
    /// Accepted tasks cancelled by a shutdown timeout, running or queued.
    pub abandoned: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
    abandoned: AtomicU64,
}

type TaskReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<RebuildTask>>>;

/// Fixed set of tokio workers draining a bounded task queue.
///
/// Submission never blocks: a full queue hands the task back and the caller
/// decides what to do with it. Tasks run inline on their worker, so aborting
/// a worker cancels the task it is running. Must be created inside a tokio
/// runtime.
pub struct RebuildExecutor {
    config: RebuildExecutorConfig,
    sender: Mutex<Option<mpsc::Sender<RebuildTask>>>,
    receiver: TaskReceiver,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl RebuildExecutor {
    /// Start the worker tasks.
    pub fn new(config: RebuildExecutorConfig) -> HmdpResult<Self> {
        if config.workers == 0 {
            return Err(HmdpError::validation("Rebuild pool needs at least one worker"));
        }
        if config.queue_capacity == 0 {
            return Err(HmdpError::validation("Rebuild queue capacity must be positive"));
        }
        tokio::runtime::Handle::try_current().map_err(|e| {
            HmdpError::Configuration(format!("Rebuild pool requires a tokio runtime: {}", e))
        })?;

        let (sender, receiver) = mpsc::channel::<RebuildTask>(config.queue_capacity);
        let receiver: TaskReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..config.workers)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let counters = counters.clone();
                tokio::spawn(
                    async move {
                        loop {
                            let task = { receiver.lock().await.recv().await };
                            let Some(task) = task else { break };

                            match AssertUnwindSafe(task.run()).catch_unwind().await {
                                Ok(()) => {
                                    counters.completed.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(panic) => {
                                    counters.panicked.fetch_add(1, Ordering::Relaxed);
                                    error!(panic = panic_message(&*panic), "Rebuild task panicked");
                                }
                            }
                        }
                        debug!(worker_id, "Rebuild worker stopped");
                    }
                    .instrument(tracing::info_span!("rebuild_worker", worker_id)),
                )
            })
            .collect();

        CacheMetrics::rebuild_workers(config.workers);
        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Rebuild pool started"
        );

        Ok(Self {
            config,
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(workers),
            counters,
        })
    }

    /// Start a pool with default settings.
    pub fn with_defaults() -> HmdpResult<Self> {
        Self::new(RebuildExecutorConfig::default())
    }

    /// Queue a task without waiting.
    ///
    /// When the queue is full or the pool has been shut down the task is
    /// handed back in a [`RejectedTask`] with an [`HmdpError::Cache`] reason.
    pub fn submit(&self, task: RebuildTask) -> Result<(), RejectedTask> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(self.reject(task, HmdpError::cache("Rebuild pool is shut down")));
        };

        match sender.try_send(task) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(task)) => {
                let reason = HmdpError::cache(format!(
                    "Rebuild queue is full ({} pending)",
                    self.config.queue_capacity
                ));
                Err(self.reject(task, reason))
            }
            Err(TrySendError::Closed(task)) => {
                Err(self.reject(task, HmdpError::cache("Rebuild pool is shut down")))
            }
        }
    }

    fn reject(&self, task: RebuildTask, reason: HmdpError) -> RejectedTask {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        RejectedTask { task, reason }
    }

    /// Close the queue and wait for queued tasks to drain, up to the
    /// configured shutdown timeout.
    pub async fn shutdown(&self) {
        self.shutdown_within(self.config.shutdown_timeout).await;
    }

    /// Close the queue and wait up to `limit` for the workers to drain it.
    ///
    /// After `limit` the workers are aborted, cancelling the tasks they are
    /// running, and tasks still queued are dropped. Cancelled tasks run their
    /// abandon hooks. Idempotent.
    pub async fn shutdown_within(&self, limit: Duration) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let mut workers = std::mem::take(&mut *self.workers.lock());
        info!(workers = workers.len(), "Stopping rebuild pool...");

        if timeout(limit, join_all(workers.iter_mut())).await.is_err() {
            warn!(
                timeout_ms = limit.as_millis() as u64,
                "Rebuild pool did not drain in time, aborting workers"
            );
            for worker in &workers {
                worker.abort();
            }
            join_all(workers.iter_mut()).await;

            let mut receiver = self.receiver.lock().await;
            receiver.close();
            while let Ok(task) = receiver.try_recv() {
                drop(task);
            }

            let finished = self.counters.completed.load(Ordering::Relaxed)
                + self.counters.panicked.load(Ordering::Relaxed);
            let abandoned = self
                .counters
                .submitted
                .load(Ordering::Relaxed)
                .saturating_sub(finished);
            self.counters.abandoned.store(abandoned, Ordering::Relaxed);
        }

        let stats = self.stats();
        info!(
            completed = stats.completed,
            panicked = stats.panicked,
            rejected = stats.rejected,
            abandoned = stats.abandoned,
            "Rebuild pool stopped"
        );
    }

    /// Whether the pool still accepts tasks.
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Current counters.
    pub fn stats(&self) -> RebuildStats {
        RebuildStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &RebuildExecutorConfig {
        &self.config
    }
}

impl std::fmt::Debug for RebuildExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildExecutor")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
