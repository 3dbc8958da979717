//! Bridges a database executor and a callback executor.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::config::ExecutorConfig;
use crate::connection::{CallableStatement, Connection, PreparedStatement, Statement};
use crate::error::SqlTaskError;
use crate::executor::{BlockingExecutor, CallbackQueue, Executor, Job, main_loop};
use crate::pool::ConnectionPool;
use crate::task::{Callback, SqlTask, guarded};

/// Submits [`SqlTask`]s for asynchronous execution.
///
/// Task bodies run on the database executor, which may block while acquiring a
/// connection. Callbacks, and the completion of every [`TaskFuture`], always run
/// on the callback executor. Cloning is cheap and clones share everything.
#[derive(Clone)]
pub struct TaskSubmitter {
    pool: Arc<dyn ConnectionPool>,
    database: Arc<dyn Executor>,
    callbacks: Arc<dyn Executor>,
}

impl TaskSubmitter {
    #[must_use]
    pub fn new(
        pool: Arc<dyn ConnectionPool>,
        database: Arc<dyn Executor>,
        callbacks: Arc<dyn Executor>,
    ) -> Self {
        Self {
            pool,
            database,
            callbacks,
        }
    }

    /// Submitter on the current tokio runtime: a [`BlockingExecutor`] sized by
    /// `config` runs tasks, and callbacks go to the returned [`CallbackQueue`],
    /// which the host drains from its own loop.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::ConfigError`] if `config` is invalid or no runtime
    /// is running.
    pub fn with_main_loop(
        pool: Arc<dyn ConnectionPool>,
        config: &ExecutorConfig,
    ) -> Result<(Self, CallbackQueue), SqlTaskError> {
        config.validate()?;
        let database = BlockingExecutor::current(config.num_threads)?;
        let (callbacks, queue) = main_loop();
        Ok((
            Self::new(pool, Arc::new(database), Arc::new(callbacks)),
            queue,
        ))
    }

    /// Queue `task` on the database executor.
    ///
    /// The task's callback is rewired to hop onto the callback executor before
    /// the task is queued.
    ///
    /// # Errors
    /// Returns the database executor's rejection. Nothing else fails here; task
    /// failures reach the callback.
    pub fn submit<R: Send + 'static>(&self, mut task: SqlTask<R>) -> Result<(), SqlTaskError> {
        let callbacks = Arc::clone(&self.callbacks);
        task.wrap_callback(move |callback| dispatch_to(callbacks, callback));

        tracing::debug!(?task, "submitting sql task");
        let priority = task.priority();
        let pool = Arc::clone(&self.pool);
        let job: Job = Box::new(move || run_task(pool.as_ref(), task));
        self.database.execute_with_priority(job, priority)
    }

    /// Acquire a connection directly from the pool. May block.
    ///
    /// # Errors
    /// Returns whatever the pool reports.
    pub fn connection(&self) -> Result<Box<dyn Connection>, SqlTaskError> {
        self.pool.acquire()
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    /// # Errors
    /// Returns the database executor's rejection.
    pub fn submit_connection_task<R, F, C>(&self, function: F, callback: C) -> Result<(), SqlTaskError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Connection) -> Result<R, SqlTaskError> + Send + 'static,
        C: FnOnce(Result<R, SqlTaskError>) + Send + 'static,
    {
        self.submit(SqlTask::connection(function, callback))
    }

    /// # Errors
    /// Returns the database executor's rejection.
    pub fn submit_statement_task<R, F, C>(&self, function: F, callback: C) -> Result<(), SqlTaskError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Statement) -> Result<R, SqlTaskError> + Send + 'static,
        C: FnOnce(Result<R, SqlTaskError>) + Send + 'static,
    {
        self.submit(SqlTask::statement(function, callback))
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for a blank query, or the
    /// database executor's rejection.
    pub fn submit_prepared_statement_task<R, F, C>(
        &self,
        query: impl Into<String>,
        function: F,
        callback: C,
    ) -> Result<(), SqlTaskError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn PreparedStatement) -> Result<R, SqlTaskError> + Send + 'static,
        C: FnOnce(Result<R, SqlTaskError>) + Send + 'static,
    {
        self.submit(SqlTask::prepared(query, function, callback)?)
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for a blank query, or the
    /// database executor's rejection.
    pub fn submit_callable_statement_task<R, F, C>(
        &self,
        query: impl Into<String>,
        function: F,
        callback: C,
    ) -> Result<(), SqlTaskError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn CallableStatement) -> Result<R, SqlTaskError> + Send + 'static,
        C: FnOnce(Result<R, SqlTaskError>) + Send + 'static,
    {
        self.submit(SqlTask::callable(query, function, callback)?)
    }

    /// Submit a fully configured task and get a future for its outcome.
    ///
    /// `build` receives the completion callback and returns the task to submit,
    /// so priority, timeout and preparation strategy can still be set.
    ///
    /// # Errors
    /// Returns what `build` returns, or the database executor's rejection.
    pub fn submit_future<R, B>(&self, build: B) -> Result<TaskFuture<R>, SqlTaskError>
    where
        R: Send + 'static,
        B: FnOnce(Callback<R>) -> Result<SqlTask<R>, SqlTaskError>,
    {
        let (future, callback) = TaskFuture::pair();
        self.submit(build(callback)?)?;
        Ok(future)
    }

    /// # Errors
    /// Returns the database executor's rejection.
    pub fn submit_connection_task_future<R, F>(&self, function: F) -> Result<TaskFuture<R>, SqlTaskError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Connection) -> Result<R, SqlTaskError> + Send + 'static,
    {
        self.submit_future(|callback| Ok(SqlTask::connection(function, callback)))
    }

    /// # Errors
    /// Returns the database executor's rejection.
    pub fn submit_statement_task_future<R, F>(&self, function: F) -> Result<TaskFuture<R>, SqlTaskError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Statement) -> Result<R, SqlTaskError> + Send + 'static,
    {
        self.submit_future(|callback| Ok(SqlTask::statement(function, callback)))
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for a blank query, or the
    /// database executor's rejection.
    pub fn submit_prepared_statement_task_future<R, F>(
        &self,
        query: impl Into<String>,
        function: F,
    ) -> Result<TaskFuture<R>, SqlTaskError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn PreparedStatement) -> Result<R, SqlTaskError> + Send + 'static,
    {
        self.submit_future(|callback| SqlTask::prepared(query, function, callback))
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for a blank query, or the
    /// database executor's rejection.
    pub fn submit_callable_statement_task_future<R, F>(
        &self,
        query: impl Into<String>,
        function: F,
    ) -> Result<TaskFuture<R>, SqlTaskError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn CallableStatement) -> Result<R, SqlTaskError> + Send + 'static,
    {
        self.submit_future(|callback| SqlTask::callable(query, function, callback))
    }
}

impl fmt::Debug for TaskSubmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSubmitter")
            .field("pool_closed", &self.pool.is_closed())
            .finish_non_exhaustive()
    }
}

fn dispatch_to<R: Send + 'static>(callbacks: Arc<dyn Executor>, callback: Callback<R>) -> Callback<R> {
    Box::new(move |outcome| {
        let job: Job = Box::new(move || callback(outcome));
        if let Err(err) = callbacks.execute(job) {
            tracing::warn!(error = %err, "callback executor rejected sql task callback");
        }
    })
}

fn run_task<R>(pool: &dyn ConnectionPool, mut task: SqlTask<R>) {
    // A panicking pool must not swallow the callback.
    match guarded(|| pool.acquire()) {
        Ok(mut connection) => {
            tracing::debug!("connection acquired for sql task");
            task.execute(connection.as_mut());
            if let Err(err) = guarded(|| connection.close()) {
                tracing::warn!(error = %err, "failed to release connection");
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "could not acquire connection for sql task");
            task.fail(err);
        }
    }
    task.finish();
}

/// Outcome of a task submitted through one of the `*_future` methods.
///
/// Resolves once the task's callback has run on the callback executor. Dropping
/// it does not cancel the task.
#[must_use = "futures do nothing unless awaited"]
pub struct TaskFuture<R> {
    receiver: oneshot::Receiver<Result<R, SqlTaskError>>,
}

impl<R: Send + 'static> TaskFuture<R> {
    /// A future plus the callback that completes it.
    #[must_use]
    pub fn pair() -> (Self, Callback<R>) {
        let (sender, receiver) = oneshot::channel();
        let callback: Callback<R> = Box::new(move |outcome| {
            // Receiver gone means nobody is waiting.
            let _ = sender.send(outcome);
        });
        (Self { receiver }, callback)
    }
}

impl<R> TaskFuture<R> {
    /// Block the current thread until the task completes.
    ///
    /// Must not be called from inside an async context.
    ///
    /// # Errors
    /// Returns the task's error, or [`SqlTaskError::TaskDropped`] if the task was
    /// discarded without completing.
    pub fn wait(self) -> Result<R, SqlTaskError> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(SqlTaskError::TaskDropped))
    }

    /// The outcome if the task has already completed.
    pub fn try_take(&mut self) -> Option<Result<R, SqlTaskError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SqlTaskError::TaskDropped)),
        }
    }
}

impl<R> Future for TaskFuture<R> {
    type Output = Result<R, SqlTaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SqlTaskError::TaskDropped)))
    }
}

impl<R> fmt::Debug for TaskFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture").finish_non_exhaustive()
    }
}
