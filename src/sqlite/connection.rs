use std::fmt;
use std::time::Duration;

use bb8::PooledConnection;
use rusqlite::types::Value;

use crate::connection::{
    CallableStatement, Connection, PreparedStatement, Statement, StatementResource,
};
use crate::error::SqlTaskError;
use crate::results::ResultSet;
use crate::task::DEFAULT_TIMEOUT_SECONDS;
use crate::types::RowValues;

use super::config::SqliteManager;
use super::params::row_value_to_sqlite_value;
use super::query::build_result_set;

/// A pooled `SQLite` connection. Closing it returns it to the pool.
pub struct SqliteConnection {
    conn: PooledConnection<'static, SqliteManager>,
}

impl SqliteConnection {
    pub(crate) fn new(conn: PooledConnection<'static, SqliteManager>) -> Self {
        Self { conn }
    }

    /// Run raw `rusqlite` logic on the underlying connection.
    ///
    /// # Errors
    /// Propagates whatever `func` returns.
    pub fn with_connection<R>(
        &mut self,
        func: impl FnOnce(&mut rusqlite::Connection) -> Result<R, SqlTaskError>,
    ) -> Result<R, SqlTaskError> {
        func(&mut self.conn)
    }

    fn prepare_with(
        &mut self,
        query: &str,
        keys: KeyColumn,
        callable: bool,
    ) -> Result<SqlitePreparedStatement<'_>, SqlTaskError> {
        let conn: &rusqlite::Connection = &self.conn;
        let stmt = conn.prepare(query)?;
        Ok(SqlitePreparedStatement {
            conn,
            stmt,
            params: Vec::new(),
            keys,
            last_key: None,
            outs: None,
            timeout: 0,
            callable,
        })
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection").finish_non_exhaustive()
    }
}

/// Which column, if any, the generated-keys result set reports.
enum KeyColumn {
    None,
    Named(String),
}

impl KeyColumn {
    /// `SQLite` only exposes the rowid, so indexes select nothing more specific.
    fn for_indexes(indexes: &[usize]) -> Self {
        if indexes.is_empty() {
            KeyColumn::None
        } else {
            KeyColumn::Named("rowid".into())
        }
    }

    fn for_names(names: &[String]) -> Self {
        match names.first() {
            Some(name) => KeyColumn::Named(name.clone()),
            None => KeyColumn::None,
        }
    }
}

impl Connection for SqliteConnection {
    fn create_statement(&mut self) -> Result<Box<dyn Statement + '_>, SqlTaskError> {
        Ok(Box::new(SqliteStatement {
            conn: &self.conn,
            timeout: 0,
        }))
    }

    fn prepare_statement(
        &mut self,
        query: &str,
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError> {
        Ok(Box::new(self.prepare_with(query, KeyColumn::None, false)?))
    }

    fn prepare_statement_with_keys(
        &mut self,
        query: &str,
        return_generated_keys: bool,
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError> {
        let keys = if return_generated_keys {
            KeyColumn::Named("rowid".into())
        } else {
            KeyColumn::None
        };
        Ok(Box::new(self.prepare_with(query, keys, false)?))
    }

    fn prepare_statement_with_column_indexes(
        &mut self,
        query: &str,
        column_indexes: &[usize],
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError> {
        let keys = KeyColumn::for_indexes(column_indexes);
        Ok(Box::new(self.prepare_with(query, keys, false)?))
    }

    fn prepare_statement_with_column_names(
        &mut self,
        query: &str,
        column_names: &[String],
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError> {
        let keys = KeyColumn::for_names(column_names);
        Ok(Box::new(self.prepare_with(query, keys, false)?))
    }

    fn prepare_call(
        &mut self,
        query: &str,
    ) -> Result<Box<dyn CallableStatement + '_>, SqlTaskError> {
        Ok(Box::new(self.prepare_with(query, KeyColumn::None, true)?))
    }

    fn close(self: Box<Self>) -> Result<(), SqlTaskError> {
        // The next borrower starts from the default timeout again.
        apply_timeout(&self.conn, DEFAULT_TIMEOUT_SECONDS)
    }
}

fn apply_timeout(conn: &rusqlite::Connection, seconds: u32) -> Result<(), SqlTaskError> {
    conn.busy_timeout(Duration::from_secs(u64::from(seconds)))?;
    Ok(())
}

/// Ad-hoc SQL on a borrowed connection.
struct SqliteStatement<'c> {
    conn: &'c rusqlite::Connection,
    timeout: u32,
}

impl StatementResource for SqliteStatement<'_> {
    fn set_query_timeout(&mut self, seconds: u32) -> Result<(), SqlTaskError> {
        apply_timeout(self.conn, seconds)?;
        self.timeout = seconds;
        Ok(())
    }

    fn query_timeout(&self) -> u32 {
        self.timeout
    }

    fn close(self: Box<Self>) -> Result<(), SqlTaskError> {
        Ok(())
    }
}

impl Statement for SqliteStatement<'_> {
    fn execute(&mut self, sql: &str) -> Result<bool, SqlTaskError> {
        let mut stmt = self.conn.prepare(sql)?;
        if stmt.column_count() > 0 {
            let mut rows = stmt.query([])?;
            while rows.next()?.is_some() {}
            Ok(true)
        } else {
            stmt.execute([])?;
            Ok(false)
        }
    }

    fn execute_query(&mut self, sql: &str) -> Result<ResultSet, SqlTaskError> {
        let mut stmt = self.conn.prepare(sql)?;
        build_result_set(&mut stmt, &[])
    }

    fn execute_update(&mut self, sql: &str) -> Result<usize, SqlTaskError> {
        let mut stmt = self.conn.prepare(sql)?;
        Ok(stmt.execute([])?)
    }
}

/// Prepared or callable statement bound to a borrowed connection.
struct SqlitePreparedStatement<'c> {
    conn: &'c rusqlite::Connection,
    stmt: rusqlite::Statement<'c>,
    params: Vec<Value>,
    keys: KeyColumn,
    last_key: Option<i64>,
    outs: Option<Vec<RowValues>>,
    timeout: u32,
    callable: bool,
}

impl SqlitePreparedStatement<'_> {
    fn run_call(&mut self) -> Result<ResultSet, SqlTaskError> {
        let result_set = build_result_set(&mut self.stmt, &self.params)?;
        self.outs = Some(
            result_set
                .first()
                .map(|row| row.values().to_vec())
                .unwrap_or_default(),
        );
        Ok(result_set)
    }
}

impl StatementResource for SqlitePreparedStatement<'_> {
    fn set_query_timeout(&mut self, seconds: u32) -> Result<(), SqlTaskError> {
        apply_timeout(self.conn, seconds)?;
        self.timeout = seconds;
        Ok(())
    }

    fn query_timeout(&self) -> u32 {
        self.timeout
    }

    fn close(self: Box<Self>) -> Result<(), SqlTaskError> {
        let this = *self;
        this.stmt.finalize()?;
        Ok(())
    }
}

impl PreparedStatement for SqlitePreparedStatement<'_> {
    fn set_param(&mut self, index: usize, value: RowValues) -> Result<(), SqlTaskError> {
        if index == 0 {
            return Err(SqlTaskError::InvalidArgument(
                "parameter indexes start at 1".into(),
            ));
        }
        if self.params.len() < index {
            self.params.resize(index, Value::Null);
        }
        self.params[index - 1] = row_value_to_sqlite_value(&value);
        Ok(())
    }

    fn clear_params(&mut self) {
        self.params.clear();
    }

    fn execute_query(&mut self) -> Result<ResultSet, SqlTaskError> {
        if self.callable {
            return self.run_call();
        }
        build_result_set(&mut self.stmt, &self.params)
    }

    fn execute_update(&mut self) -> Result<usize, SqlTaskError> {
        if self.callable {
            return Ok(self.run_call()?.len());
        }
        let changed = self
            .stmt
            .execute(rusqlite::params_from_iter(self.params.iter()))?;
        if !matches!(self.keys, KeyColumn::None) {
            self.last_key = Some(self.conn.last_insert_rowid());
        }
        Ok(changed)
    }

    fn generated_keys(&mut self) -> Result<ResultSet, SqlTaskError> {
        let KeyColumn::Named(column) = &self.keys else {
            return Err(SqlTaskError::Unsupported(
                "statement was not prepared to return generated keys".into(),
            ));
        };
        let mut result_set = ResultSet::with_capacity(1);
        result_set.set_column_names(vec![column.clone()]);
        if let Some(key) = self.last_key {
            result_set.add_row_values(vec![RowValues::Int(key)]);
        }
        Ok(result_set)
    }
}

impl CallableStatement for SqlitePreparedStatement<'_> {
    fn out_value(&self, index: usize) -> Result<RowValues, SqlTaskError> {
        let outs = self.outs.as_ref().ok_or_else(|| {
            SqlTaskError::ExecutionError("callable statement has not been executed".into())
        })?;
        index
            .checked_sub(1)
            .and_then(|i| outs.get(i))
            .cloned()
            .ok_or_else(|| SqlTaskError::InvalidArgument(format!("no OUT parameter {index}")))
    }
}
