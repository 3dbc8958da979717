use crate::connection::Connection;
use crate::error::SqlTaskError;

/// Capability the submitter needs from a connection pool.
///
/// Implementations mediate all concurrent acquisition; a connection handed out
/// by [`acquire`](ConnectionPool::acquire) belongs to the caller until it calls
/// [`Connection::close`].
pub trait ConnectionPool: Send + Sync {
    /// Take a connection from the pool, blocking until one is free.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::PoolClosed`] after [`close`](ConnectionPool::close),
    /// or a connection error if none can be obtained.
    fn acquire(&self) -> Result<Box<dyn Connection>, SqlTaskError>;

    /// Release every pooled resource. Calling it twice is harmless.
    fn close(&self);

    /// Whether [`close`](ConnectionPool::close) has been called.
    fn is_closed(&self) -> bool;
}
