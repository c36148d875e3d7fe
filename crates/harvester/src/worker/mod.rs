//! Worker pool and per-item execution

mod pool;
mod runner;

pub use pool::{RunSummary, StopReason, WorkerPool, WorkerPoolConfig, WorkerPoolError};
pub use runner::{TaskError, TaskFailure, TaskRunner, TaskSuccess};
