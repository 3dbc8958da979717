//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{ExecutorConfig, PoolConfig, PoolConfigBuilder, Protocol};
pub use crate::connection::{
    CallableStatement, Connection, PreparedStatement, Statement, StatementResource,
};
pub use crate::error::SqlTaskError;
pub use crate::executor::{
    BlockingExecutor, CallbackQueue, DrainBudget, Executor, InlineExecutor, MainLoopExecutor,
    RuntimeExecutor, main_loop,
};
pub use crate::pool::ConnectionPool;
pub use crate::prepare::PreparationStrategy;
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::script::{ScriptEncoding, ScriptOptions, ScriptRunner, split_statements};
pub use crate::submitter::{TaskFuture, TaskSubmitter};
pub use crate::task::{SqlTask, TaskKind};
pub use crate::types::{Priority, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteOptions, SqliteOptionsBuilder, SqlitePool};
