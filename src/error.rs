use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlTaskError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Task finished before it was executed")]
    TaskNotExecuted,

    #[error("Task was dropped before completing")]
    TaskDropped,

    #[error("Executor rejected job: {0}")]
    ExecutorRejected(String),

    #[error("Script statement {index} failed: {source}")]
    ScriptStatement {
        index: usize,
        #[source]
        source: Box<SqlTaskError>,
    },
}

impl SqlTaskError {
    /// True for errors raised synchronously while configuring or building a task.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::ConfigError(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<bb8::RunError<rusqlite::Error>> for SqlTaskError {
    fn from(err: bb8::RunError<rusqlite::Error>) -> Self {
        SqlTaskError::ConnectionError(format!("SQLite pool error: {err}"))
    }
}
