//! Execution contexts the submitter hands work to.
//!
//! A submitter needs two of them: one that may block on connection
//! acquisition ([`BlockingExecutor`]) and one that delivers callbacks where the
//! host wants them ([`MainLoopExecutor`] drained through a [`CallbackQueue`],
//! or simply [`RuntimeExecutor`] / [`InlineExecutor`]).

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};

use crate::error::SqlTaskError;
use crate::types::Priority;

/// A unit of work queued on an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs [`Job`]s.
pub trait Executor: Send + Sync {
    /// Queue `job` for execution.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::ExecutorRejected`] if the executor no longer accepts work.
    fn execute(&self, job: Job) -> Result<(), SqlTaskError>;

    /// Queue `job` with a scheduling hint. Executors without priorities ignore it.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::ExecutorRejected`] if the executor no longer accepts work.
    fn execute_with_priority(&self, job: Job, priority: Priority) -> Result<(), SqlTaskError> {
        let _ = priority;
        self.execute(job)
    }
}

struct Queued {
    priority: Priority,
    seq: u64,
    job: Job,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: higher priority first, then oldest first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Runs jobs on tokio's blocking thread pool, at most `threads` at a time.
///
/// Jobs wait in a priority queue; whenever a slot frees up the highest
/// priority job waiting runs next. Must be created inside a tokio runtime or
/// from a [`Handle`].
pub struct BlockingExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
    queue: Arc<Mutex<BinaryHeap<Queued>>>,
    seq: AtomicU64,
    threads: usize,
    shut_down: AtomicBool,
}

impl BlockingExecutor {
    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] if `threads` is zero.
    pub fn new(handle: Handle, threads: usize) -> Result<Self, SqlTaskError> {
        if threads == 0 {
            return Err(SqlTaskError::InvalidArgument(
                "executor needs at least one thread".into(),
            ));
        }
        Ok(Self {
            handle,
            permits: Arc::new(Semaphore::new(threads)),
            queue: Arc::new(Mutex::new(BinaryHeap::new())),
            seq: AtomicU64::new(0),
            threads,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Build on the runtime the caller is running in.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::ConfigError`] outside a tokio runtime.
    pub fn current(threads: usize) -> Result<Self, SqlTaskError> {
        let handle = Handle::try_current()
            .map_err(|err| SqlTaskError::ConfigError(format!("no tokio runtime: {err}")))?;
        Self::new(handle, threads)
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Jobs queued but not yet started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop accepting jobs. Jobs already queued still run, within the same
    /// concurrency bound.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Executor for BlockingExecutor {
    fn execute(&self, job: Job) -> Result<(), SqlTaskError> {
        self.execute_with_priority(job, Priority::Normal)
    }

    fn execute_with_priority(&self, job: Job, priority: Priority) -> Result<(), SqlTaskError> {
        if self.is_shutdown() {
            return Err(SqlTaskError::ExecutorRejected(
                "blocking executor is shut down".into(),
            ));
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Queued { priority, seq, job });

        // One runner per queued job; each takes whatever is most urgent once a
        // permit frees up.
        let permits = Arc::clone(&self.permits);
        let queue = Arc::clone(&self.queue);
        self.handle.spawn(async move {
            // The semaphore is never closed.
            let Ok(permit) = permits.acquire_owned().await else {
                return;
            };
            let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop();
            let Some(next) = next else { return };
            let result = tokio::task::spawn_blocking(next.job).await;
            drop(permit);
            if let Err(err) = result {
                tracing::error!(error = %err, priority = %next.priority, "blocking job failed");
            }
        });
        Ok(())
    }
}

impl fmt::Debug for BlockingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingExecutor")
            .field("threads", &self.threads)
            .field("pending", &self.pending())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Spawns every job as a tokio task. Suitable for callbacks that never block.
#[derive(Debug, Clone)]
pub struct RuntimeExecutor {
    handle: Handle,
}

impl RuntimeExecutor {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// # Errors
    /// Returns [`SqlTaskError::ConfigError`] outside a tokio runtime.
    pub fn current() -> Result<Self, SqlTaskError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|err| SqlTaskError::ConfigError(format!("no tokio runtime: {err}")))
    }
}

impl Executor for RuntimeExecutor {
    fn execute(&self, job: Job) -> Result<(), SqlTaskError> {
        self.handle.spawn(async move { job() });
        Ok(())
    }
}

/// Runs each job immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) -> Result<(), SqlTaskError> {
        job();
        Ok(())
    }
}

/// Limits on one [`CallbackQueue::finish_pending`] pass. Zero disables a limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainBudget {
    pub max_tasks_per_run: usize,
    pub max_millis_per_run: u64,
}

impl DrainBudget {
    /// Budget that drains everything queued.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    fn exhausted(&self, ran: usize, started: Instant) -> bool {
        if self.max_tasks_per_run > 0 && ran >= self.max_tasks_per_run {
            return true;
        }
        self.max_millis_per_run > 0
            && started.elapsed() >= Duration::from_millis(self.max_millis_per_run)
    }
}

/// Create a callback context bound to a single host-driven loop.
///
/// The [`MainLoopExecutor`] half is handed to the submitter; the host keeps the
/// [`CallbackQueue`] and drains it from its own thread.
#[must_use]
pub fn main_loop() -> (MainLoopExecutor, CallbackQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (MainLoopExecutor { sender }, CallbackQueue { receiver })
}

/// Sending half of [`main_loop`]. Jobs run whenever the host drains the queue.
#[derive(Debug, Clone)]
pub struct MainLoopExecutor {
    sender: mpsc::UnboundedSender<Job>,
}

impl Executor for MainLoopExecutor {
    fn execute(&self, job: Job) -> Result<(), SqlTaskError> {
        self.sender
            .send(job)
            .map_err(|_| SqlTaskError::ExecutorRejected("callback queue closed".into()))
    }
}

/// Receiving half of [`main_loop`].
pub struct CallbackQueue {
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl CallbackQueue {
    /// Run queued callbacks on the current thread until the queue is empty or
    /// `budget` runs out. Returns how many ran.
    pub fn finish_pending(&mut self, budget: &DrainBudget) -> usize {
        let started = Instant::now();
        let mut ran = 0;
        while !budget.exhausted(ran, started) {
            let Ok(job) = self.receiver.try_recv() else {
                break;
            };
            run_callback(job);
            ran += 1;
        }
        if ran > 0 {
            tracing::debug!(ran, "finished pending callbacks");
        }
        ran
    }

    /// Wait for the next callback and run it. Returns `false` once every
    /// [`MainLoopExecutor`] is gone and the queue is empty.
    pub async fn finish_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(job) => {
                run_callback(job);
                true
            }
            None => false,
        }
    }

    /// Poll every `poll_period`, draining with `budget`, until every
    /// [`MainLoopExecutor`] is dropped and the queue is empty.
    pub async fn run(mut self, poll_period: Duration, budget: DrainBudget) {
        let mut ticker = tokio::time::interval(poll_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.finish_pending(&budget);
            if self.receiver.is_closed() && self.receiver.is_empty() {
                break;
            }
        }
    }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("queued", &self.receiver.len())
            .finish()
    }
}

fn run_callback(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!("callback panicked on the main loop");
    }
}
