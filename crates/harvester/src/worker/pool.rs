//! Worker pool for requirement batches
//!
//! Claims batches of unfinished items, runs them concurrently with a bounded
//! number of workers, and pauses between cycles until the store runs dry or
//! shutdown is requested.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::runner::TaskRunner;
use crate::persistence::{StoreError, WorkItem};
use crate::requirement::{EntityScope, SubjectKind};

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPoolConfig {
    /// Unique worker ID (generated if not provided)
    pub worker_id: String,

    /// Items claimed per cycle
    pub batch_size: usize,

    /// Maximum concurrent items
    pub max_workers: usize,

    /// Pause after every batch
    #[serde(with = "duration_millis")]
    pub idle_pause: Duration,

    /// Subject kind filter; falls back to the requirement's default
    pub kind_filter: Option<SubjectKind>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("harvester-{}", Uuid::now_v7()),
            batch_size: 10,
            max_workers: 10,
            idle_pause: Duration::from_secs(20),
            kind_filter: None,
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration whose worker count matches the batch size
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            max_workers: batch_size,
            ..Default::default()
        }
    }

    /// Set the worker ID
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set maximum concurrency
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }

    /// Set the pause between cycles
    pub fn with_idle_pause(mut self, pause: Duration) -> Self {
        self.idle_pause = pause;
        self
    }

    pub fn with_kind_filter(mut self, kind: Option<SubjectKind>) -> Self {
        self.kind_filter = kind;
        self
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A claim returned no unfinished items
    Exhausted,
    /// Shutdown was requested
    Shutdown,
}

/// Totals of one [`WorkerPool::run`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Non-empty batches processed
    pub cycles: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub stop_reason: StopReason,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// Claiming a batch failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Runner cannot serve its requirement
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Worker slots are no longer available
    #[error("worker pool is closed")]
    Closed,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    succeeded: u64,
    failed: u64,
}

/// Polling worker pool for one requirement
///
/// The worker semaphore is created once and shared by every cycle.
///
/// # Example
///
/// ```ignore
/// use crawlmark_harvester::worker::{TaskRunner, WorkerPool, WorkerPoolConfig};
///
/// let runner = TaskRunner::new(store, Arc::new(ProfileExtractor::new(fetcher)));
/// let pool = Arc::new(WorkerPool::new(runner, WorkerPoolConfig::new(10)));
/// pool.shutdown_on_ctrl_c();
///
/// let summary = pool.run().await?;
/// println!("{} items done in {} cycles", summary.succeeded, summary.cycles);
/// ```
pub struct WorkerPool {
    runner: TaskRunner,
    config: WorkerPoolConfig,
    workers: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(runner: TaskRunner, mut config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // A zero-sized claim would read as an exhausted store
        config.batch_size = config.batch_size.max(1);
        config.max_workers = config.max_workers.max(1);
        let max_workers = config.max_workers;

        Self {
            runner,
            config,
            workers: Arc::new(Semaphore::new(max_workers)),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Get the worker ID
    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Request shutdown
    ///
    /// The running batch completes; no further batch is claimed and an
    /// ongoing idle pause ends immediately.
    pub fn shutdown(&self) {
        info!(worker_id = %self.config.worker_id, "Shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Request shutdown when the process receives Ctrl-C
    pub fn shutdown_on_ctrl_c(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => pool.shutdown(),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        })
    }

    /// Run cycles until the store has no unfinished items or shutdown
    ///
    /// Per-item failures are logged and counted, never returned. Store
    /// failures while claiming a batch end the run with an error.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id, requirement = %self.runner.requirement()))]
    pub async fn run(&self) -> Result<RunSummary, WorkerPoolError> {
        self.runner
            .validate()
            .map_err(|e| WorkerPoolError::InvalidConfiguration(e.to_string()))?;

        let requirement = self.runner.requirement();
        if let (Some(kind), EntityScope::Person) =
            (self.config.kind_filter, requirement.scope())
        {
            return Err(WorkerPoolError::InvalidConfiguration(format!(
                "{} is a person requirement and cannot filter on kind {}",
                requirement, kind
            )));
        }

        let kind = self
            .config
            .kind_filter
            .or_else(|| requirement.default_kind_filter());
        let store = Arc::clone(self.runner.store());
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            batch_size = self.config.batch_size,
            max_workers = self.config.max_workers,
            idle_pause_ms = self.config.idle_pause.as_millis() as u64,
            kind = ?kind,
            "Starting worker pool"
        );

        let mut cycles = 0;
        let mut succeeded = 0;
        let mut failed = 0;

        let stop_reason = loop {
            let stopping = *shutdown_rx.borrow_and_update();
            if stopping {
                break StopReason::Shutdown;
            }

            let batch = store
                .fetch_unfinished(requirement, self.config.batch_size, kind)
                .await?;
            if batch.is_empty() {
                debug!("No unfinished items left");
                break StopReason::Exhausted;
            }

            cycles += 1;
            let size = batch.len();
            let outcome = self.run_batch(batch).await?;
            succeeded += outcome.succeeded;
            failed += outcome.failed;

            info!(
                cycle = cycles,
                size,
                succeeded = outcome.succeeded,
                failed = outcome.failed,
                "Batch finished"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.idle_pause) => {}
                _ = shutdown_rx.changed() => {
                    debug!("Shutdown signal received during idle pause");
                    break StopReason::Shutdown;
                }
            }
        };

        let summary = RunSummary {
            cycles,
            succeeded,
            failed,
            stop_reason,
        };
        info!(
            cycles,
            succeeded,
            failed,
            stop_reason = ?stop_reason,
            "Worker pool stopped"
        );
        Ok(summary)
    }

    /// Run every item of a batch and wait for all of them
    async fn run_batch(&self, batch: Vec<WorkItem>) -> Result<BatchOutcome, WorkerPoolError> {
        let mut tasks = JoinSet::new();

        for item in batch {
            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .map_err(|_| WorkerPoolError::Closed)?;
            let runner = self.runner.clone();

            tasks.spawn(async move {
                let result = runner.run(item).await;
                drop(permit);
                result
            });
        }

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => outcome.succeeded += 1,
                // Already logged by the runner
                Ok(Err(_)) => outcome.failed += 1,
                Err(e) => {
                    error!("Worker task panicked: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
