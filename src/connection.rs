//! Resource traits the task framework executes against.
//!
//! They follow the shape of a classic JDBC driver: a [`Connection`] hands out
//! short-lived [`Statement`], [`PreparedStatement`] and [`CallableStatement`]
//! handles that borrow it and must be closed after use. Backends (see
//! [`crate::sqlite`]) implement these traits; tasks only ever see the trait
//! objects.

use crate::error::SqlTaskError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Behaviour shared by every statement-like handle.
pub trait StatementResource {
    /// Limit how long the driver may spend on a single execution.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if the driver rejects the timeout.
    fn set_query_timeout(&mut self, seconds: u32) -> Result<(), SqlTaskError>;

    /// Currently configured timeout in seconds.
    fn query_timeout(&self) -> u32;

    /// Release the handle.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if the driver fails to release the statement.
    fn close(self: Box<Self>) -> Result<(), SqlTaskError>;
}

/// Plain statement executing ad-hoc SQL text.
pub trait Statement: StatementResource {
    /// Execute any statement. Returns `true` when it produced rows.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if execution fails.
    fn execute(&mut self, sql: &str) -> Result<bool, SqlTaskError>;

    /// Execute a query and materialise its rows.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if execution fails.
    fn execute_query(&mut self, sql: &str) -> Result<ResultSet, SqlTaskError>;

    /// Execute DML and return the affected row count.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if execution fails.
    fn execute_update(&mut self, sql: &str) -> Result<usize, SqlTaskError>;
}

/// Statement prepared once for a fixed query, executed with bound parameters.
pub trait PreparedStatement: StatementResource {
    /// Bind a parameter. Indexes are 1-based.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for index 0.
    fn set_param(&mut self, index: usize, value: RowValues) -> Result<(), SqlTaskError>;

    /// Drop every bound parameter.
    fn clear_params(&mut self);

    /// # Errors
    /// Returns [`SqlTaskError`] if execution fails.
    fn execute_query(&mut self) -> Result<ResultSet, SqlTaskError>;

    /// # Errors
    /// Returns [`SqlTaskError`] if execution fails.
    fn execute_update(&mut self) -> Result<usize, SqlTaskError>;

    /// Keys generated by the last update, shaped by the preparation strategy.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::Unsupported`] if key retrieval was not requested.
    fn generated_keys(&mut self) -> Result<ResultSet, SqlTaskError>;
}

/// Statement invoking a stored routine.
pub trait CallableStatement: PreparedStatement {
    /// Value of an OUT parameter after execution. Indexes are 1-based.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if the statement has not run or the index is unknown.
    fn out_value(&self, index: usize) -> Result<RowValues, SqlTaskError>;
}

/// A live database connection owned by whoever acquired it.
///
/// Statement handles borrow the connection, so at most one of them is alive at
/// a time.
pub trait Connection: Send {
    /// # Errors
    /// Returns [`SqlTaskError`] if the driver cannot create a statement.
    fn create_statement(&mut self) -> Result<Box<dyn Statement + '_>, SqlTaskError>;

    /// # Errors
    /// Returns [`SqlTaskError`] if the query cannot be prepared.
    fn prepare_statement(
        &mut self,
        query: &str,
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError>;

    /// Prepare a statement that optionally reports auto-generated keys.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if the query cannot be prepared.
    fn prepare_statement_with_keys(
        &mut self,
        query: &str,
        return_generated_keys: bool,
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError>;

    /// Prepare a statement reporting the given key column indexes (1-based).
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if the query cannot be prepared.
    fn prepare_statement_with_column_indexes(
        &mut self,
        query: &str,
        column_indexes: &[usize],
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError>;

    /// Prepare a statement reporting the given key columns by name.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if the query cannot be prepared.
    fn prepare_statement_with_column_names(
        &mut self,
        query: &str,
        column_names: &[String],
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError>;

    /// # Errors
    /// Returns [`SqlTaskError`] if the call cannot be prepared.
    fn prepare_call(
        &mut self,
        query: &str,
    ) -> Result<Box<dyn CallableStatement + '_>, SqlTaskError>;

    /// Release the connection back to wherever it came from.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if the release fails; callers log it.
    fn close(self: Box<Self>) -> Result<(), SqlTaskError>;
}
