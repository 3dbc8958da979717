use std::sync::atomic::{AtomicBool, Ordering};

use crate::connection::Connection;
use crate::error::SqlTaskError;
use crate::pool::ConnectionPool;

use super::{FakeConnection, SharedLog, lock};

/// Pool handing out [`FakeConnection`]s that all write to one log.
#[derive(Debug)]
pub struct FakePool {
    log: SharedLog,
    closed: AtomicBool,
}

impl FakePool {
    #[must_use]
    pub fn new(log: SharedLog) -> Self {
        Self {
            log,
            closed: AtomicBool::new(false),
        }
    }
}

impl ConnectionPool for FakePool {
    fn acquire(&self) -> Result<Box<dyn Connection>, SqlTaskError> {
        if self.is_closed() {
            return Err(SqlTaskError::PoolClosed);
        }
        let mut log = lock(&self.log);
        if log.fail_acquire {
            return Err(SqlTaskError::ConnectionError(
                "fake pool exhausted".into(),
            ));
        }
        log.acquired += 1;
        drop(log);
        Ok(Box::new(FakeConnection::new(self.log.clone())))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
