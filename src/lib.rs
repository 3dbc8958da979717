//! Asynchronous SQL task execution with callbacks delivered on a chosen context.
//!
//! Work is described as an [`SqlTask`]: a function over a connection, statement,
//! prepared statement or callable statement plus a callback for its outcome. A
//! [`TaskSubmitter`] runs the function on a database executor against a
//! connection from a [`ConnectionPool`], releases the connection, and hands the
//! outcome to the callback on a separate callback executor, typically the
//! host's main loop. Every submit method also has a `*_future` variant.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_tasks::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlTaskError> {
//! let pool = SqlitePool::builder("app.db").build().await?;
//! let (submitter, queue) = TaskSubmitter::with_main_loop(Arc::new(pool), &ExecutorConfig::default())?;
//! tokio::spawn(queue.run(std::time::Duration::from_millis(50), DrainBudget::unlimited()));
//!
//! let rows = submitter
//!     .submit_statement_task_future(|stmt| stmt.execute_query("SELECT 1 AS one"))?
//!     .await?;
//! assert_eq!(rows.first().and_then(|r| r.get("one")), Some(&RowValues::Int(1)));
//! # Ok(())
//! # }
//! ```
//!
//! The [`script`] module splits SQL scripts into statements, respecting quoted
//! literals, and runs them on a single connection.

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod pool;
pub mod prelude;
pub mod prepare;
pub mod results;
pub mod script;
pub mod submitter;
pub mod task;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ExecutorConfig, PoolConfig, PoolConfigBuilder, Protocol};
pub use connection::{CallableStatement, Connection, PreparedStatement, Statement, StatementResource};
pub use error::SqlTaskError;
pub use executor::{
    BlockingExecutor, CallbackQueue, DrainBudget, Executor, InlineExecutor, Job,
    MainLoopExecutor, RuntimeExecutor, main_loop,
};
pub use pool::ConnectionPool;
pub use prepare::PreparationStrategy;
pub use results::{CustomDbRow, ResultSet};
pub use submitter::{TaskFuture, TaskSubmitter};
pub use task::{Callback, DEFAULT_TIMEOUT_SECONDS, SqlTask, TaskKind};
pub use types::{Priority, RowValues};
