use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::worker::{panic_message, CompletionHook};
use super::{SchedulerError, SchedulerResult, TiredWorker};

/// Default fatigue factors are drawn uniformly from `[0.5, 1.5)`.
pub const DEFAULT_MIN_FATIGUE_FACTOR: f64 = 0.5;
pub const DEFAULT_MAX_FATIGUE_FACTOR: f64 = 1.5;

// ============================================================================
// Idle Heap
// ============================================================================

/// Entry in the idle heap. Fatigue is captured when the worker goes idle and
/// cannot change until it is handed another task.
struct IdleWorker {
    fatigue: f64,
    id: usize,
}

impl Ord for IdleWorker {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (lowest fatigue, then lowest id, first)
        other
            .fatigue
            .total_cmp(&self.fatigue)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for IdleWorker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for IdleWorker {}

impl PartialEq for IdleWorker {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

// ============================================================================
// Task Failures
// ============================================================================

/// A task that returned an error or panicked on a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub worker_id: usize,
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {}: {}", self.worker_id, self.message)
    }
}

#[derive(Debug, Default)]
struct FailureSink {
    failures: Mutex<Vec<TaskFailure>>,
}

impl FailureSink {
    fn record(&self, failure: TaskFailure) {
        self.failures.lock().push(failure);
    }

    fn take(&self) -> Vec<TaskFailure> {
        std::mem::take(&mut *self.failures.lock())
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Point-in-time statistics for one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub id: usize,
    pub fatigue_factor: f64,
    pub fatigue: f64,
    pub time_used: Duration,
    pub time_idle: Duration,
}

impl fmt::Display for WorkerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Worker ID: {}, Fatigue: {:.0}, Time Used: {} ns, Time Idle: {} ns",
            self.id,
            self.fatigue,
            self.time_used.as_nanos(),
            self.time_idle.as_nanos()
        )
    }
}

/// Statistics for every worker in the pool, one line each when displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorReport {
    pub workers: Vec<WorkerReport>,
}

impl fmt::Display for ExecutorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for worker in &self.workers {
            writeln!(f, "{}", worker)?;
        }
        Ok(())
    }
}

// ============================================================================
// Executor
// ============================================================================

struct ExecutorShared {
    workers: Vec<TiredWorker>,
    idle: Mutex<BinaryHeap<IdleWorker>>,
    worker_available: Condvar,
    in_flight: Mutex<usize>,
    all_done: Condvar,
    shutdown: AtomicBool,
    detached_failures: Arc<FailureSink>,
}

impl ExecutorShared {
    /// Pop the least fatigued idle worker, blocking while none is idle.
    fn take_idle(&self) -> SchedulerResult<usize> {
        let mut idle = self.idle.lock();
        loop {
            if self.shutdown.load(AtomicOrdering::SeqCst) {
                return Err(SchedulerError::ShutDown);
            }
            if let Some(entry) = idle.pop() {
                return Ok(entry.id);
            }
            self.worker_available.wait(&mut idle);
        }
    }

    fn return_idle(&self, id: usize) {
        let fatigue = self.workers[id].fatigue();
        self.idle.lock().push(IdleWorker { fatigue, id });
        self.worker_available.notify_one();
    }

    fn begin_task(&self) {
        *self.in_flight.lock() += 1;
    }

    fn end_task(&self) {
        let mut in_flight = self.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.all_done.notify_all();
        }
    }

    /// Runs on the worker thread once the worker has recorded its busy time.
    fn worker_finished(&self, id: usize) {
        self.return_idle(id);
        self.end_task();
    }

    fn wait_idle(&self) {
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            self.all_done.wait(&mut in_flight);
        }
    }
}

/// A fixed pool of [`TiredWorker`]s that always hands new work to the least
/// fatigued idle worker.
///
/// Tasks return `Result<(), E>`; errors and panics are caught on the worker,
/// logged, and reported back to whoever waits on the batch.
pub struct TiredExecutor {
    shared: Arc<ExecutorShared>,
}

impl TiredExecutor {
    /// Create a pool with fatigue factors drawn from `[0.5, 1.5)`.
    pub fn new(num_threads: usize) -> SchedulerResult<Self> {
        Self::with_factor_range(
            num_threads,
            DEFAULT_MIN_FATIGUE_FACTOR,
            DEFAULT_MAX_FATIGUE_FACTOR,
            None,
        )
    }

    /// Create a pool with fatigue factors drawn uniformly from `[min, max)`.
    /// A seed makes the draw reproducible.
    pub fn with_factor_range(
        num_threads: usize,
        min: f64,
        max: f64,
        seed: Option<u64>,
    ) -> SchedulerResult<Self> {
        if !(min.is_finite() && max.is_finite() && min >= 0.0 && min <= max) {
            return Err(SchedulerError::InvalidFatigueRange { min, max });
        }
        let mut rng = match seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let factors = (0..num_threads)
            .map(|_| min + rng.f64() * (max - min))
            .collect();
        Self::with_fatigue_factors(factors)
    }

    /// Create a pool with one worker per given fatigue factor.
    pub fn with_fatigue_factors(factors: Vec<f64>) -> SchedulerResult<Self> {
        if factors.is_empty() {
            return Err(SchedulerError::InvalidThreadCount);
        }
        if let Some(&bad) = factors.iter().find(|f| !f.is_finite() || **f < 0.0) {
            return Err(SchedulerError::InvalidFatigueRange { min: bad, max: bad });
        }

        let shared = Arc::new_cyclic(|weak: &Weak<ExecutorShared>| {
            let workers = factors
                .iter()
                .enumerate()
                .map(|(id, &factor)| {
                    let weak = weak.clone();
                    let hook: CompletionHook = Arc::new(move |worker_id| {
                        if let Some(shared) = weak.upgrade() {
                            shared.worker_finished(worker_id);
                        }
                    });
                    TiredWorker::with_completion_hook(id, factor, hook)
                })
                .collect();

            ExecutorShared {
                workers,
                idle: Mutex::new(BinaryHeap::with_capacity(factors.len())),
                worker_available: Condvar::new(),
                in_flight: Mutex::new(0),
                all_done: Condvar::new(),
                shutdown: AtomicBool::new(false),
                detached_failures: Arc::new(FailureSink::default()),
            }
        });

        for worker in &shared.workers {
            if let Err(err) = worker.start() {
                for started in &shared.workers {
                    started.stop();
                    started.join();
                }
                return Err(err);
            }
            shared.return_idle(worker.id());
        }
        debug!(threads = shared.workers.len(), "executor started");

        Ok(Self { shared })
    }

    /// Get the number of worker threads
    pub fn num_threads(&self) -> usize {
        self.shared.workers.len()
    }

    /// Tasks accepted but not yet completed.
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.lock()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(AtomicOrdering::SeqCst)
    }

    /// Hand `task` to the least fatigued idle worker.
    ///
    /// Blocks while every worker is busy. Failures of tasks submitted this way
    /// are collected by [`TiredExecutor::take_failures`].
    pub fn submit<F, E>(&self, task: F) -> SchedulerResult<()>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        let sink = Arc::clone(&self.shared.detached_failures);
        self.submit_into(task, sink)
    }

    /// Submit every task in order, then block until all of them completed.
    ///
    /// Fails with [`SchedulerError::BatchFailed`] if any task of this batch
    /// returned an error or panicked; the remaining tasks still ran.
    pub fn submit_all<I, F, E>(&self, tasks: I) -> SchedulerResult<()>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        let sink = Arc::new(FailureSink::default());
        let mut total = 0;
        let mut submit_error = None;
        for task in tasks {
            if let Err(err) = self.submit_into(task, Arc::clone(&sink)) {
                submit_error = Some(err);
                break;
            }
            total += 1;
        }

        self.wait_idle();
        if let Some(err) = submit_error {
            return Err(err);
        }

        let failures = sink.take();
        let failed = failures.len();
        match failures.into_iter().next() {
            Some(first) => Err(SchedulerError::BatchFailed {
                failed,
                total,
                first,
            }),
            None => {
                trace!(tasks = total, "batch complete");
                Ok(())
            }
        }
    }

    /// Block until no submitted task is in flight.
    pub fn wait_idle(&self) {
        self.shared.wait_idle();
    }

    /// Drain failures of tasks submitted with [`TiredExecutor::submit`].
    pub fn take_failures(&self) -> Vec<TaskFailure> {
        self.shared.detached_failures.take()
    }

    /// Wait for in-flight work, then stop and join every worker.
    ///
    /// Idempotent. Later submissions fail with [`SchedulerError::ShutDown`].
    pub fn shutdown(&self) {
        self.shared.wait_idle();
        if self.shared.shutdown.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        {
            // Wake submitters blocked on an empty idle heap.
            let _idle = self.shared.idle.lock();
            self.shared.worker_available.notify_all();
        }
        for worker in &self.shared.workers {
            worker.stop();
        }
        for worker in &self.shared.workers {
            worker.join();
        }
        debug!("executor shut down");
    }

    /// Snapshot of every worker's fatigue and timing. No side effects.
    pub fn report(&self) -> ExecutorReport {
        ExecutorReport {
            workers: self
                .shared
                .workers
                .iter()
                .map(|worker| WorkerReport {
                    id: worker.id(),
                    fatigue_factor: worker.fatigue_factor(),
                    fatigue: worker.fatigue(),
                    time_used: worker.time_used(),
                    time_idle: worker.time_idle(),
                })
                .collect(),
        }
    }

    fn submit_into<F, E>(&self, task: F, sink: Arc<FailureSink>) -> SchedulerResult<()>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        let shared = &self.shared;
        let id = shared.take_idle()?;
        shared.begin_task();

        let wrapped = move || {
            let message = match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
            };
            if let Some(message) = message {
                warn!(worker = id, %message, "task failed");
                sink.record(TaskFailure {
                    worker_id: id,
                    message,
                });
            }
        };

        if let Err(err) = shared.workers[id].submit_task(wrapped) {
            if matches!(err, SchedulerError::WorkerBusy(_)) {
                shared.return_idle(id);
            }
            shared.end_task();
            return Err(err);
        }
        trace!(worker = id, "task submitted");
        Ok(())
    }
}

impl fmt::Debug for TiredExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiredExecutor")
            .field("workers", &self.shared.workers)
            .field("in_flight", &self.in_flight())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Drop for TiredExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
