use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

use super::{SchedulerError, SchedulerResult};

/// A boxed task that can be sent across threads
pub type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

/// Called on the worker thread, with the worker id, after every task.
pub(crate) type CompletionHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Lifecycle of a [`TiredWorker`]. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Stopped,
}

/// Busy and idle time, in nanoseconds, written by the worker thread.
#[derive(Debug, Default)]
struct WorkerClock {
    used_nanos: AtomicU64,
    idle_nanos: AtomicU64,
}

struct Inbox {
    state: WorkerState,
    sender: Option<Sender<BoxedTask>>,
    receiver: Option<Receiver<BoxedTask>>,
}

/// A single background thread with a one-slot task inbox.
///
/// Fatigue is `fatigue_factor * time_used`; the executor always hands new
/// work to the idle worker with the lowest fatigue.
pub struct TiredWorker {
    id: usize,
    fatigue_factor: f64,
    clock: Arc<WorkerClock>,
    inbox: Mutex<Inbox>,
    handle: Mutex<Option<JoinHandle<()>>>,
    on_complete: Option<CompletionHook>,
}

impl TiredWorker {
    /// Create a worker in the `Created` state. No thread is spawned until
    /// [`TiredWorker::start`].
    pub fn new(id: usize, fatigue_factor: f64) -> Self {
        let (sender, receiver) = bounded::<BoxedTask>(1);
        Self {
            id,
            fatigue_factor,
            clock: Arc::new(WorkerClock::default()),
            inbox: Mutex::new(Inbox {
                state: WorkerState::Created,
                sender: Some(sender),
                receiver: Some(receiver),
            }),
            handle: Mutex::new(None),
            on_complete: None,
        }
    }

    pub(crate) fn with_completion_hook(
        id: usize,
        fatigue_factor: f64,
        hook: CompletionHook,
    ) -> Self {
        let mut worker = Self::new(id, fatigue_factor);
        worker.on_complete = Some(hook);
        worker
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn fatigue_factor(&self) -> f64 {
        self.fatigue_factor
    }

    pub fn state(&self) -> WorkerState {
        self.inbox.lock().state
    }

    /// Spawn the background thread and move to `Running`.
    pub fn start(&self) -> SchedulerResult<()> {
        let mut inbox = self.inbox.lock();
        if inbox.state != WorkerState::Created {
            return Err(SchedulerError::WorkerAlreadyStarted(self.id));
        }
        let receiver = inbox
            .receiver
            .take()
            .ok_or(SchedulerError::WorkerAlreadyStarted(self.id))?;

        let id = self.id;
        let clock = Arc::clone(&self.clock);
        let on_complete = self.on_complete.clone();
        let spawned = thread::Builder::new()
            .name(format!("tired-worker-{}", id))
            .spawn(move || worker_loop(id, receiver, clock, on_complete));

        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                inbox.state = WorkerState::Running;
                debug!(worker = id, factor = self.fatigue_factor, "worker started");
                Ok(())
            }
            Err(err) => {
                inbox.state = WorkerState::Stopped;
                inbox.sender = None;
                Err(SchedulerError::Spawn(err))
            }
        }
    }

    /// Hand a task to the worker.
    ///
    /// Fails if the worker is not running, or if a previously submitted task
    /// is still waiting in the inbox. Nothing is queued behind it.
    pub fn submit_task<F>(&self, task: F) -> SchedulerResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let inbox = self.inbox.lock();
        match (inbox.state, inbox.sender.as_ref()) {
            (WorkerState::Running, Some(sender)) => {
                sender.try_send(Box::new(task)).map_err(|err| match err {
                    TrySendError::Full(_) => SchedulerError::WorkerBusy(self.id),
                    TrySendError::Disconnected(_) => SchedulerError::WorkerNotRunning(self.id),
                })
            }
            _ => Err(SchedulerError::WorkerNotRunning(self.id)),
        }
    }

    /// Move to `Stopped`. The thread exits once the task it is running (and
    /// any task already in the inbox) has finished.
    pub fn stop(&self) {
        let mut inbox = self.inbox.lock();
        if inbox.state != WorkerState::Stopped {
            debug!(worker = self.id, "stopping worker");
        }
        inbox.state = WorkerState::Stopped;
        inbox.sender = None;
        inbox.receiver = None;
    }

    /// Wait for the background thread to exit. Call after [`TiredWorker::stop`].
    pub fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(worker = self.id, "worker thread panicked");
            }
        }
    }

    /// Total time spent running tasks.
    pub fn time_used(&self) -> Duration {
        Duration::from_nanos(self.clock.used_nanos.load(AtomicOrdering::Acquire))
    }

    /// Total time spent waiting for a task.
    pub fn time_idle(&self) -> Duration {
        Duration::from_nanos(self.clock.idle_nanos.load(AtomicOrdering::Acquire))
    }

    /// `fatigue_factor * time_used` (in nanoseconds).
    pub fn fatigue(&self) -> f64 {
        self.fatigue_factor * self.clock.used_nanos.load(AtomicOrdering::Acquire) as f64
    }

    /// Order by ascending fatigue; equal fatigue compares `Equal`.
    pub fn compare_fatigue(&self, other: &TiredWorker) -> Ordering {
        self.fatigue().total_cmp(&other.fatigue())
    }
}

impl fmt::Debug for TiredWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiredWorker")
            .field("id", &self.id)
            .field("fatigue_factor", &self.fatigue_factor)
            .field("state", &self.state())
            .field("time_used", &self.time_used())
            .field("time_idle", &self.time_idle())
            .finish()
    }
}

impl Drop for TiredWorker {
    fn drop(&mut self) {
        // Disconnecting the inbox is enough for the thread to exit.
        self.stop();
    }
}

/// Worker thread main loop
fn worker_loop(
    id: usize,
    receiver: Receiver<BoxedTask>,
    clock: Arc<WorkerClock>,
    on_complete: Option<CompletionHook>,
) {
    loop {
        let waiting = Instant::now();
        let task = match receiver.recv() {
            Ok(task) => task,
            Err(_) => break,
        };
        clock
            .idle_nanos
            .fetch_add(elapsed_nanos(waiting), AtomicOrdering::AcqRel);

        let started = Instant::now();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            error!(worker = id, "task panicked: {}", panic_message(payload.as_ref()));
        }
        clock
            .used_nanos
            .fetch_add(elapsed_nanos(started), AtomicOrdering::AcqRel);
        trace!(worker = id, "task finished");

        if let Some(hook) = &on_complete {
            hook(id);
        }
    }
    debug!(worker = id, "worker stopped");
}

fn elapsed_nanos(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
