//! Units of database work and their completion handling.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::connection::{
    CallableStatement, Connection, PreparedStatement, Statement, StatementResource,
};
use crate::error::SqlTaskError;
use crate::prepare::PreparationStrategy;
use crate::types::Priority;

/// Query timeout applied to statement resources unless a task overrides it.
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 5;

pub type ConnectionFn<R> =
    Box<dyn FnOnce(&mut dyn Connection) -> Result<R, SqlTaskError> + Send + 'static>;
pub type StatementFn<R> =
    Box<dyn FnOnce(&mut dyn Statement) -> Result<R, SqlTaskError> + Send + 'static>;
pub type PreparedStatementFn<R> =
    Box<dyn FnOnce(&mut dyn PreparedStatement) -> Result<R, SqlTaskError> + Send + 'static>;
pub type CallableStatementFn<R> =
    Box<dyn FnOnce(&mut dyn CallableStatement) -> Result<R, SqlTaskError> + Send + 'static>;

/// Receives the outcome of a task exactly once.
pub type Callback<R> = Box<dyn FnOnce(Result<R, SqlTaskError>) + Send + 'static>;

/// The resource a task runs against, with the data needed to obtain it.
///
/// Functions are stored as `Option` so a task can hand them out exactly once.
pub enum TaskKind<R> {
    Connection(Option<ConnectionFn<R>>),
    Statement(Option<StatementFn<R>>),
    PreparedStatement {
        query: String,
        strategy: PreparationStrategy,
        function: Option<PreparedStatementFn<R>>,
    },
    CallableStatement {
        query: String,
        function: Option<CallableStatementFn<R>>,
    },
}

impl<R> TaskKind<R> {
    fn name(&self) -> &'static str {
        match self {
            TaskKind::Connection(_) => "connection",
            TaskKind::Statement(_) => "statement",
            TaskKind::PreparedStatement { .. } => "prepared_statement",
            TaskKind::CallableStatement { .. } => "callable_statement",
        }
    }

    fn query(&self) -> Option<&str> {
        match self {
            TaskKind::PreparedStatement { query, .. }
            | TaskKind::CallableStatement { query, .. } => Some(query),
            TaskKind::Connection(_) | TaskKind::Statement(_) => None,
        }
    }
}

/// One database operation plus the callback that consumes its outcome.
///
/// Build one with [`SqlTask::connection`], [`SqlTask::statement`],
/// [`SqlTask::prepared`] or [`SqlTask::callable`], configure it fluently, then
/// hand it to [`TaskSubmitter::submit`](crate::submitter::TaskSubmitter::submit):
///
/// ```rust
/// use sql_tasks::prelude::*;
///
/// let task = SqlTask::prepared(
///     "UPDATE players SET score = ?1 WHERE id = ?2",
///     |stmt| {
///         stmt.set_param(1, RowValues::Int(42))?;
///         stmt.set_param(2, RowValues::Int(7))?;
///         stmt.execute_update()
///     },
///     |outcome| {
///         let _ = outcome;
///     },
/// )?
/// .with_priority(Priority::High)
/// .with_timeout(10)?;
/// assert_eq!(task.priority(), Priority::High);
/// # Ok::<(), SqlTaskError>(())
/// ```
pub struct SqlTask<R> {
    kind: TaskKind<R>,
    callback: Option<Callback<R>>,
    priority: Priority,
    timeout_seconds: u32,
    outcome: Option<Result<R, SqlTaskError>>,
}

impl<R: Send + 'static> SqlTask<R> {
    fn new(kind: TaskKind<R>, callback: Callback<R>) -> Self {
        Self {
            kind,
            callback: Some(callback),
            priority: Priority::default(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            outcome: None,
        }
    }

    /// Task whose function receives the connection itself.
    pub fn connection<F, C>(function: F, callback: C) -> Self
    where
        F: FnOnce(&mut dyn Connection) -> Result<R, SqlTaskError> + Send + 'static,
        C: FnOnce(Result<R, SqlTaskError>) + Send + 'static,
    {
        Self::new(
            TaskKind::Connection(Some(Box::new(function))),
            Box::new(callback),
        )
    }

    /// Task whose function receives a fresh [`Statement`], closed afterwards.
    pub fn statement<F, C>(function: F, callback: C) -> Self
    where
        F: FnOnce(&mut dyn Statement) -> Result<R, SqlTaskError> + Send + 'static,
        C: FnOnce(Result<R, SqlTaskError>) + Send + 'static,
    {
        Self::new(
            TaskKind::Statement(Some(Box::new(function))),
            Box::new(callback),
        )
    }

    /// Task whose function receives `query` prepared with the default strategy.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] if `query` is blank.
    pub fn prepared<F, C>(
        query: impl Into<String>,
        function: F,
        callback: C,
    ) -> Result<Self, SqlTaskError>
    where
        F: FnOnce(&mut dyn PreparedStatement) -> Result<R, SqlTaskError> + Send + 'static,
        C: FnOnce(Result<R, SqlTaskError>) + Send + 'static,
    {
        let query = require_query(query.into())?;
        Ok(Self::new(
            TaskKind::PreparedStatement {
                query,
                strategy: PreparationStrategy::Default,
                function: Some(Box::new(function)),
            },
            Box::new(callback),
        ))
    }

    /// Task whose function receives a callable statement for `query`.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] if `query` is blank.
    pub fn callable<F, C>(
        query: impl Into<String>,
        function: F,
        callback: C,
    ) -> Result<Self, SqlTaskError>
    where
        F: FnOnce(&mut dyn CallableStatement) -> Result<R, SqlTaskError> + Send + 'static,
        C: FnOnce(Result<R, SqlTaskError>) + Send + 'static,
    {
        let query = require_query(query.into())?;
        Ok(Self::new(
            TaskKind::CallableStatement {
                query,
                function: Some(Box::new(function)),
            },
            Box::new(callback),
        ))
    }
}

impl<R> SqlTask<R> {
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the statement timeout.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for a zero timeout.
    pub fn with_timeout(mut self, seconds: u32) -> Result<Self, SqlTaskError> {
        if seconds == 0 {
            return Err(SqlTaskError::InvalidArgument(
                "timeout must be at least one second".into(),
            ));
        }
        self.timeout_seconds = seconds;
        Ok(self)
    }

    /// Choose how the query of a prepared-statement task is prepared. Other
    /// task kinds ignore it.
    #[must_use]
    pub fn with_preparation_strategy(mut self, preparation: PreparationStrategy) -> Self {
        if let TaskKind::PreparedStatement { strategy, .. } = &mut self.kind {
            *strategy = preparation;
        }
        self
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
    }

    #[must_use]
    pub fn kind(&self) -> &TaskKind<R> {
        &self.kind
    }

    /// Whether an outcome has been recorded.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.outcome.is_some()
    }

    /// Replace the callback with one derived from it.
    ///
    /// Does nothing once the callback has been consumed.
    pub fn wrap_callback<W>(&mut self, wrap: W)
    where
        W: FnOnce(Callback<R>) -> Callback<R>,
    {
        if let Some(callback) = self.callback.take() {
            self.callback = Some(wrap(callback));
        }
    }

    /// Run the task against `connection` and record its outcome.
    ///
    /// Never fails: every error, including a panic in the user function, ends
    /// up in the outcome handed to the callback by [`finish`](Self::finish).
    pub fn execute(&mut self, connection: &mut dyn Connection) {
        if self.outcome.is_some() {
            tracing::warn!(kind = self.kind.name(), "sql task executed twice; ignoring");
            return;
        }
        let timeout = self.timeout_seconds;
        let outcome = match &mut self.kind {
            TaskKind::Connection(function) => match function.take() {
                Some(function) => guarded(|| function(connection)),
                None => Err(already_executed()),
            },
            TaskKind::Statement(function) => match function.take() {
                Some(function) => connection
                    .create_statement()
                    .and_then(|stmt| with_scoped(stmt, timeout, |s| function(s))),
                None => Err(already_executed()),
            },
            TaskKind::PreparedStatement {
                query,
                strategy,
                function,
            } => match function.take() {
                Some(function) => strategy
                    .prepare(connection, query)
                    .and_then(|stmt| with_scoped(stmt, timeout, |s| function(s))),
                None => Err(already_executed()),
            },
            TaskKind::CallableStatement { query, function } => match function.take() {
                Some(function) => connection
                    .prepare_call(query)
                    .and_then(|stmt| with_scoped(stmt, timeout, |s| function(s))),
                None => Err(already_executed()),
            },
        };
        self.outcome = Some(outcome);
    }

    /// Record a failure without executing, e.g. when no connection could be
    /// acquired.
    pub fn fail(&mut self, error: SqlTaskError) {
        if self.outcome.is_none() {
            self.outcome = Some(Err(error));
        }
    }

    /// Hand the outcome to the callback. Only the first call has an effect.
    pub fn finish(&mut self) {
        let Some(callback) = self.callback.take() else {
            tracing::warn!(kind = self.kind.name(), "sql task finished twice; ignoring");
            return;
        };
        let outcome = self
            .outcome
            .take()
            .unwrap_or(Err(SqlTaskError::TaskNotExecuted));
        callback(outcome);
    }
}

impl<R> fmt::Debug for SqlTask<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlTask")
            .field("kind", &self.kind.name())
            .field("query", &self.kind.query())
            .field("priority", &self.priority)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("executed", &self.outcome.is_some())
            .field("finished", &self.callback.is_none())
            .finish()
    }
}

fn require_query(query: String) -> Result<String, SqlTaskError> {
    if query.trim().is_empty() {
        return Err(SqlTaskError::InvalidArgument(
            "query must not be empty".into(),
        ));
    }
    Ok(query)
}

fn already_executed() -> SqlTaskError {
    SqlTaskError::ExecutionError("sql task function already consumed".into())
}

/// Configure `resource`, run `function` on it, then close it on every path.
fn with_scoped<S, R, F>(mut resource: Box<S>, timeout: u32, function: F) -> Result<R, SqlTaskError>
where
    S: StatementResource + ?Sized,
    F: FnOnce(&mut S) -> Result<R, SqlTaskError>,
{
    let outcome = resource
        .set_query_timeout(timeout)
        .and_then(|()| guarded(|| function(&mut *resource)));
    if let Err(err) = resource.close() {
        tracing::warn!(error = %err, "failed to close statement");
    }
    outcome
}

/// Run `function`, turning a panic into [`SqlTaskError::TaskPanicked`].
pub(crate) fn guarded<R>(
    function: impl FnOnce() -> Result<R, SqlTaskError>,
) -> Result<R, SqlTaskError> {
    catch_unwind(AssertUnwindSafe(function)).unwrap_or_else(|payload| {
        Err(SqlTaskError::TaskPanicked(panic_message(payload.as_ref())))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::test_utils::{FakeConnection, FakeLog, PreparedKind, SharedLog};
    use crate::types::RowValues;

    type Seen<R> = Arc<Mutex<Vec<Result<R, SqlTaskError>>>>;

    fn recorder<R: Send + 'static>() -> (Seen<R>, impl FnOnce(Result<R, SqlTaskError>) + Send) {
        let seen: Seen<R> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |outcome| sink.lock().unwrap().push(outcome))
    }

    fn run<R>(task: &mut SqlTask<R>, log: &SharedLog) {
        let mut conn = FakeConnection::new(log.clone());
        task.execute(&mut conn);
        task.finish();
    }

    #[test]
    fn connection_task_delivers_result_once() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder();
        let mut task = SqlTask::connection(|_conn| Ok(7), callback);
        run(&mut task, &log);
        task.finish();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(*seen[0].as_ref().unwrap(), 7);
        assert_eq!(log.lock().unwrap().statements_created, 0);
    }

    #[test]
    fn statement_is_closed_when_function_fails() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder::<()>();
        let mut task = SqlTask::statement(
            |_stmt| Err(SqlTaskError::ExecutionError("boom".into())),
            callback,
        );
        run(&mut task, &log);

        let log = log.lock().unwrap();
        assert_eq!(log.statements_created, 1);
        assert_eq!(log.statements_closed, 1);
        let seen = seen.lock().unwrap();
        assert!(matches!(&seen[0], Err(SqlTaskError::ExecutionError(msg)) if msg == "boom"));
    }

    #[test]
    fn statement_is_closed_when_function_panics() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder::<()>();
        let mut task = SqlTask::statement(|_stmt| panic!("kaboom"), callback);
        run(&mut task, &log);

        assert_eq!(log.lock().unwrap().open_statements(), 0);
        let seen = seen.lock().unwrap();
        assert!(matches!(&seen[0], Err(SqlTaskError::TaskPanicked(msg)) if msg == "kaboom"));
    }

    #[test]
    fn timeout_is_applied_before_function_runs() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder();
        let mut task = SqlTask::prepared(
            "SELECT ?1",
            |stmt| Ok(stmt.query_timeout()),
            callback,
        )
        .unwrap()
        .with_timeout(12)
        .unwrap();
        run(&mut task, &log);

        assert_eq!(*seen.lock().unwrap()[0].as_ref().unwrap(), 12);
        assert_eq!(log.lock().unwrap().timeouts, vec![12]);
    }

    #[test]
    fn default_timeout_is_applied_to_statements() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder();
        let mut task = SqlTask::statement(|stmt| Ok(stmt.query_timeout()), callback);
        run(&mut task, &log);
        assert_eq!(
            *seen.lock().unwrap()[0].as_ref().unwrap(),
            DEFAULT_TIMEOUT_SECONDS
        );
    }

    #[test]
    fn prepared_task_uses_configured_strategy() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder();
        let mut task = SqlTask::prepared(
            "INSERT INTO t (name) VALUES (?1)",
            |stmt| {
                stmt.set_param(1, RowValues::Text("a".into()))?;
                stmt.execute_update()
            },
            callback,
        )
        .unwrap()
        .with_preparation_strategy(PreparationStrategy::with_generated_keys(true));
        run(&mut task, &log);

        assert_eq!(*seen.lock().unwrap()[0].as_ref().unwrap(), 1);
        let log = log.lock().unwrap();
        assert_eq!(log.prepared, vec![PreparedKind::Keys(true)]);
        assert_eq!(log.executed, vec!["INSERT INTO t (name) VALUES (?1)".to_string()]);
        assert_eq!(log.open_statements(), 0);
    }

    #[test]
    fn callable_task_prepares_a_call() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder();
        let mut task = SqlTask::callable(
            "CALL bump(?1)",
            |stmt| {
                stmt.set_param(1, RowValues::Int(3))?;
                stmt.execute_update()?;
                stmt.out_value(1)
            },
            callback,
        )
        .unwrap();
        run(&mut task, &log);

        assert_eq!(
            *seen.lock().unwrap()[0].as_ref().unwrap(),
            RowValues::Int(3)
        );
        assert_eq!(log.lock().unwrap().prepared, vec![PreparedKind::Call]);
    }

    #[test]
    fn prepared_statement_is_closed_when_function_fails() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder::<usize>();
        let mut task = SqlTask::prepared(
            "UPDATE t SET n = ?1",
            |_stmt| Err(SqlTaskError::ExecutionError("bad row".into())),
            callback,
        )
        .unwrap();
        run(&mut task, &log);

        let log = log.lock().unwrap();
        assert_eq!(log.prepared, vec![PreparedKind::Plain]);
        assert_eq!(log.open_statements(), 0);
        let seen = seen.lock().unwrap();
        assert!(matches!(&seen[0], Err(SqlTaskError::ExecutionError(msg)) if msg == "bad row"));
    }

    #[test]
    fn prepared_statement_is_closed_when_function_panics() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder::<usize>();
        let mut task =
            SqlTask::prepared("UPDATE t SET n = 1", |_stmt| panic!("no rows"), callback).unwrap();
        run(&mut task, &log);

        assert_eq!(log.lock().unwrap().open_statements(), 0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], Err(SqlTaskError::TaskPanicked(msg)) if msg == "no rows"));
    }

    #[test]
    fn callable_statement_is_closed_when_function_fails() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder::<RowValues>();
        let mut task = SqlTask::callable(
            "CALL bump(?1)",
            |stmt| stmt.out_value(1),
            callback,
        )
        .unwrap();
        run(&mut task, &log);

        let log = log.lock().unwrap();
        assert_eq!(log.prepared, vec![PreparedKind::Call]);
        assert_eq!(log.open_statements(), 0);
        assert!(seen.lock().unwrap()[0].is_err());
    }

    #[test]
    fn callable_statement_is_closed_when_function_panics() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder::<RowValues>();
        let mut task =
            SqlTask::callable("CALL bump(?1)", |_stmt| panic!("lost output"), callback).unwrap();
        run(&mut task, &log);

        assert_eq!(log.lock().unwrap().open_statements(), 0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], Err(SqlTaskError::TaskPanicked(msg)) if msg == "lost output"));
    }

    #[test]
    fn prepare_failure_is_captured() {
        let log = FakeLog::shared();
        log.lock().unwrap().fail_prepare = true;
        let (seen, callback) = recorder::<usize>();
        let mut task =
            SqlTask::prepared("SELECT 1", |stmt| stmt.execute_update(), callback).unwrap();
        run(&mut task, &log);

        assert!(seen.lock().unwrap()[0].is_err());
        assert_eq!(log.lock().unwrap().statements_created, 0);
    }

    #[test]
    fn close_failure_does_not_mask_result() {
        let log = FakeLog::shared();
        log.lock().unwrap().fail_statement_close = true;
        let (seen, callback) = recorder();
        let mut task = SqlTask::statement(|_stmt| Ok("kept"), callback);
        run(&mut task, &log);
        assert_eq!(*seen.lock().unwrap()[0].as_ref().unwrap(), "kept");
    }

    #[test]
    fn failed_task_skips_execution() {
        let (seen, callback) = recorder::<()>();
        let mut task = SqlTask::connection(|_conn| Ok(()), callback);
        task.fail(SqlTaskError::PoolClosed);
        task.finish();
        assert!(matches!(
            seen.lock().unwrap()[0],
            Err(SqlTaskError::PoolClosed)
        ));
    }

    #[test]
    fn finishing_unexecuted_task_reports_it() {
        let (seen, callback) = recorder::<()>();
        let mut task = SqlTask::statement(|_stmt| Ok(()), callback);
        task.finish();
        assert!(matches!(
            seen.lock().unwrap()[0],
            Err(SqlTaskError::TaskNotExecuted)
        ));
    }

    #[test]
    fn second_execute_does_not_rerun_function() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder();
        let mut task = SqlTask::statement(|stmt| stmt.execute_update("DELETE FROM t"), callback);
        let mut conn = FakeConnection::new(log.clone());
        task.execute(&mut conn);
        task.execute(&mut conn);
        task.finish();

        assert_eq!(log.lock().unwrap().executed.len(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn invalid_construction_is_rejected() {
        let blank = SqlTask::<()>::prepared("  ", |_s| Ok(()), |_r| {});
        assert!(matches!(blank, Err(SqlTaskError::InvalidArgument(_))));
        let blank = SqlTask::<()>::callable("", |_s| Ok(()), |_r| {});
        assert!(blank.unwrap_err().is_invalid_argument());
        let zero = SqlTask::<()>::statement(|_s| Ok(()), |_r| {}).with_timeout(0);
        assert!(zero.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn wrapped_callback_sees_original_outcome() {
        let log = FakeLog::shared();
        let (seen, callback) = recorder();
        let mut task = SqlTask::connection(|_conn| Ok(2_i32), callback);
        task.wrap_callback(|inner| Box::new(move |outcome| inner(outcome.map(|v| v * 10))));
        run(&mut task, &log);
        assert_eq!(*seen.lock().unwrap()[0].as_ref().unwrap(), 20);
    }
}
