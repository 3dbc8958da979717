//! In-memory fakes for exercising the task framework without a database.
//!
//! Every fake shares one [`FakeLog`] so tests can assert on what happened
//! (statements created and closed, timeouts applied, SQL executed) after the
//! work ran on some other thread.

mod fake_connection;
mod fake_pool;

pub use fake_connection::{FakeConnection, FakeStatement};
pub use fake_pool::FakePool;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which preparation overload a fake connection saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedKind {
    Plain,
    Keys(bool),
    Indexes(Vec<usize>),
    Names(Vec<String>),
    Call,
}

/// Shared record of everything the fakes observed.
#[derive(Debug, Default)]
pub struct FakeLog {
    pub acquired: usize,
    pub connections_closed: usize,
    pub statements_created: usize,
    pub statements_closed: usize,
    pub prepared: Vec<PreparedKind>,
    pub prepared_queries: Vec<String>,
    pub timeouts: Vec<u32>,
    pub executed: Vec<String>,
    /// Execution of SQL containing this text fails.
    pub fail_on: Option<String>,
    pub fail_acquire: bool,
    pub fail_prepare: bool,
    pub fail_statement_close: bool,
    pub fail_connection_close: bool,
}

pub type SharedLog = Arc<Mutex<FakeLog>>;

impl FakeLog {
    #[must_use]
    pub fn shared() -> SharedLog {
        Arc::new(Mutex::new(FakeLog::default()))
    }

    /// Statements created but not yet closed.
    #[must_use]
    pub fn open_statements(&self) -> usize {
        self.statements_created - self.statements_closed
    }
}

pub(crate) fn lock(log: &SharedLog) -> MutexGuard<'_, FakeLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}
