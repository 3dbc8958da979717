use crate::connection::{
    CallableStatement, Connection, PreparedStatement, Statement, StatementResource,
};
use crate::error::SqlTaskError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::{PreparedKind, SharedLog, lock};

/// Connection whose statements only record what they were asked to do.
#[derive(Debug)]
pub struct FakeConnection {
    log: SharedLog,
}

impl FakeConnection {
    #[must_use]
    pub fn new(log: SharedLog) -> Self {
        Self { log }
    }

    fn new_statement(
        &mut self,
        query: Option<&str>,
        kind: Option<PreparedKind>,
    ) -> Result<FakeStatement, SqlTaskError> {
        let mut log = lock(&self.log);
        if kind.is_some() && log.fail_prepare {
            return Err(SqlTaskError::ExecutionError("fake prepare failure".into()));
        }
        log.statements_created += 1;
        if let Some(kind) = kind {
            log.prepared.push(kind);
        }
        if let Some(query) = query {
            log.prepared_queries.push(query.to_string());
        }
        Ok(FakeStatement {
            log: self.log.clone(),
            query: query.map(str::to_string),
            timeout: 0,
            params: Vec::new(),
        })
    }
}

impl Connection for FakeConnection {
    fn create_statement(&mut self) -> Result<Box<dyn Statement + '_>, SqlTaskError> {
        Ok(Box::new(self.new_statement(None, None)?))
    }

    fn prepare_statement(
        &mut self,
        query: &str,
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError> {
        Ok(Box::new(
            self.new_statement(Some(query), Some(PreparedKind::Plain))?,
        ))
    }

    fn prepare_statement_with_keys(
        &mut self,
        query: &str,
        return_generated_keys: bool,
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError> {
        Ok(Box::new(self.new_statement(
            Some(query),
            Some(PreparedKind::Keys(return_generated_keys)),
        )?))
    }

    fn prepare_statement_with_column_indexes(
        &mut self,
        query: &str,
        column_indexes: &[usize],
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError> {
        Ok(Box::new(self.new_statement(
            Some(query),
            Some(PreparedKind::Indexes(column_indexes.to_vec())),
        )?))
    }

    fn prepare_statement_with_column_names(
        &mut self,
        query: &str,
        column_names: &[String],
    ) -> Result<Box<dyn PreparedStatement + '_>, SqlTaskError> {
        Ok(Box::new(self.new_statement(
            Some(query),
            Some(PreparedKind::Names(column_names.to_vec())),
        )?))
    }

    fn prepare_call(
        &mut self,
        query: &str,
    ) -> Result<Box<dyn CallableStatement + '_>, SqlTaskError> {
        Ok(Box::new(
            self.new_statement(Some(query), Some(PreparedKind::Call))?,
        ))
    }

    fn close(self: Box<Self>) -> Result<(), SqlTaskError> {
        let mut log = lock(&self.log);
        log.connections_closed += 1;
        if log.fail_connection_close {
            return Err(SqlTaskError::ConnectionError("fake close failure".into()));
        }
        Ok(())
    }
}

/// Statement handle backing every statement flavour of [`FakeConnection`].
#[derive(Debug)]
pub struct FakeStatement {
    log: SharedLog,
    query: Option<String>,
    timeout: u32,
    params: Vec<RowValues>,
}

impl FakeStatement {
    fn run(&mut self, sql: &str) -> Result<(), SqlTaskError> {
        let mut log = lock(&self.log);
        log.executed.push(sql.to_string());
        match &log.fail_on {
            Some(needle) if sql.contains(needle.as_str()) => Err(SqlTaskError::ExecutionError(
                format!("fake failure executing: {sql}"),
            )),
            _ => Ok(()),
        }
    }

    fn run_prepared(&mut self) -> Result<(), SqlTaskError> {
        let sql = self.query.clone().unwrap_or_default();
        self.run(&sql)
    }

    /// One row echoing the bound parameters under columns `p1..pN`.
    fn echo_params(&self) -> ResultSet {
        let names = (1..=self.params.len()).map(|i| format!("p{i}")).collect();
        let mut rs = ResultSet::with_capacity(1);
        rs.set_column_names(names);
        rs.add_row_values(self.params.clone());
        rs
    }
}

impl StatementResource for FakeStatement {
    fn set_query_timeout(&mut self, seconds: u32) -> Result<(), SqlTaskError> {
        self.timeout = seconds;
        lock(&self.log).timeouts.push(seconds);
        Ok(())
    }

    fn query_timeout(&self) -> u32 {
        self.timeout
    }

    fn close(self: Box<Self>) -> Result<(), SqlTaskError> {
        let mut log = lock(&self.log);
        log.statements_closed += 1;
        if log.fail_statement_close {
            return Err(SqlTaskError::ExecutionError("fake close failure".into()));
        }
        Ok(())
    }
}

impl Statement for FakeStatement {
    fn execute(&mut self, sql: &str) -> Result<bool, SqlTaskError> {
        self.run(sql)?;
        Ok(sql.trim_start().to_ascii_uppercase().starts_with("SELECT"))
    }

    fn execute_query(&mut self, sql: &str) -> Result<ResultSet, SqlTaskError> {
        self.run(sql)?;
        Ok(ResultSet::default())
    }

    fn execute_update(&mut self, sql: &str) -> Result<usize, SqlTaskError> {
        self.run(sql)?;
        Ok(1)
    }
}

impl PreparedStatement for FakeStatement {
    fn set_param(&mut self, index: usize, value: RowValues) -> Result<(), SqlTaskError> {
        if index == 0 {
            return Err(SqlTaskError::InvalidArgument(
                "parameter indexes start at 1".into(),
            ));
        }
        if self.params.len() < index {
            self.params.resize(index, RowValues::Null);
        }
        self.params[index - 1] = value;
        Ok(())
    }

    fn clear_params(&mut self) {
        self.params.clear();
    }

    fn execute_query(&mut self) -> Result<ResultSet, SqlTaskError> {
        self.run_prepared()?;
        Ok(self.echo_params())
    }

    fn execute_update(&mut self) -> Result<usize, SqlTaskError> {
        self.run_prepared()?;
        Ok(1)
    }

    fn generated_keys(&mut self) -> Result<ResultSet, SqlTaskError> {
        Ok(ResultSet::default())
    }
}

impl CallableStatement for FakeStatement {
    fn out_value(&self, index: usize) -> Result<RowValues, SqlTaskError> {
        index
            .checked_sub(1)
            .and_then(|i| self.params.get(i))
            .cloned()
            .ok_or_else(|| SqlTaskError::InvalidArgument(format!("no OUT parameter {index}")))
    }
}
