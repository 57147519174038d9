//! Fatigue-aware worker pool.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       TiredExecutor                        │
//! │                                                            │
//! │   submit ──> idle min-heap (by fatigue) ──take──┐          │
//! │                     ^                           │          │
//! │                     │ worker finished           v          │
//! │   ┌───────────┐ ┌───────────┐           ┌───────────┐      │
//! │   │ Worker 0  │ │ Worker 1  │    ...    │ Worker N  │      │
//! │   │ inbox [1] │ │ inbox [1] │           │ inbox [1] │      │
//! │   └───────────┘ └───────────┘           └───────────┘      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each [`TiredWorker`] owns one thread and a single-slot inbox. A busy
//! worker is simply absent from the idle heap, so the caller of
//! [`TiredExecutor::submit`] blocks until some worker finishes instead of
//! queueing work behind a busy one.

mod executor;
mod worker;

pub use executor::{
    ExecutorReport, TaskFailure, TiredExecutor, WorkerReport, DEFAULT_MAX_FATIGUE_FACTOR,
    DEFAULT_MIN_FATIGUE_FACTOR,
};
pub use worker::{BoxedTask, TiredWorker, WorkerState};

use thiserror::Error;

/// Result of scheduling operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors raised by workers and the executor.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("thread count must be at least 1")]
    InvalidThreadCount,

    #[error("invalid fatigue factor range [{min}, {max})")]
    InvalidFatigueRange { min: f64, max: f64 },

    #[error("worker {0} is not running")]
    WorkerNotRunning(usize),

    #[error("worker {0} already holds a pending task")]
    WorkerBusy(usize),

    #[error("worker {0} was already started")]
    WorkerAlreadyStarted(usize),

    #[error("executor has been shut down")]
    ShutDown,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("{failed} of {total} tasks failed; first failure: {first}")]
    BatchFailed {
        failed: usize,
        total: usize,
        first: TaskFailure,
    },
}
