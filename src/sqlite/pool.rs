use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{PoisonError, RwLock};

use bb8::Pool;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::connection::Connection;
use crate::error::SqlTaskError;
use crate::pool::ConnectionPool;

use super::config::{SqliteManager, SqliteOptions, SqliteOptionsBuilder};
use super::connection::SqliteConnection;

/// [`ConnectionPool`] over a bb8 pool of `SQLite` connections.
///
/// [`acquire`](ConnectionPool::acquire) blocks the calling thread on the pool.
/// On a multi-threaded runtime worker it steps aside with `block_in_place`;
/// on a current-thread runtime worker it fails instead of deadlocking.
///
/// [`close`](ConnectionPool::close) drops the bb8 pool, closing idle
/// connections at once and checked-out ones as they are returned.
pub struct SqlitePool {
    pool: RwLock<Option<Pool<SqliteManager>>>,
    handle: Handle,
    db_path: String,
}

impl SqlitePool {
    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// Open the pool on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::ConfigError`] for invalid options or outside a
    /// runtime, and the `SQLite` error if the initial connections cannot be opened.
    pub async fn new(opts: SqliteOptions) -> Result<Self, SqlTaskError> {
        opts.validate()?;
        let handle = Handle::try_current()
            .map_err(|err| SqlTaskError::ConfigError(format!("no tokio runtime: {err}")))?;
        let pool = Pool::builder()
            .max_size(opts.max_size)
            .min_idle(Some(opts.min_idle.min(opts.max_size)))
            .connection_timeout(opts.connection_timeout)
            .build(SqliteManager::new(&opts))
            .await?;
        tracing::debug!(db_path = %opts.db_path, max_size = opts.max_size, "sqlite pool ready");
        Ok(Self {
            pool: RwLock::new(Some(pool)),
            handle,
            db_path: opts.db_path,
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Connections currently open and idle, or `None` once closed.
    #[must_use]
    pub fn state(&self) -> Option<bb8::State> {
        self.current().map(|pool| pool.state())
    }

    fn current(&self) -> Option<Pool<SqliteManager>> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn block_on<F: Future>(&self, future: F) -> Result<F::Output, SqlTaskError> {
        let multi_thread = Handle::try_current()
            .is_ok_and(|current| matches!(current.runtime_flavor(), RuntimeFlavor::MultiThread));
        if multi_thread {
            return Ok(tokio::task::block_in_place(|| self.handle.block_on(future)));
        }
        // Handle::block_on refuses to run on a current-thread runtime worker.
        catch_unwind(AssertUnwindSafe(|| self.handle.block_on(future))).map_err(|_| {
            SqlTaskError::ConnectionError(
                "cannot block on the SQLite pool from a current-thread runtime worker".into(),
            )
        })
    }
}

impl ConnectionPool for SqlitePool {
    fn acquire(&self) -> Result<Box<dyn Connection>, SqlTaskError> {
        let pool = self.current().ok_or(SqlTaskError::PoolClosed)?;
        let pooled = self.block_on(pool.get_owned())??;
        Ok(Box::new(SqliteConnection::new(pooled)))
    }

    fn close(&self) {
        let taken = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pool) = taken {
            drop(pool);
            tracing::debug!(db_path = %self.db_path, "sqlite pool closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlitePool")
            .field("db_path", &self.db_path)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
