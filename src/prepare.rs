use crate::connection::{Connection, PreparedStatement};
use crate::error::SqlTaskError;

/// How a prepared-statement task turns its query into a statement.
///
/// Lets callers ask for auto-generated keys without a dedicated task type:
/// ```rust
/// use sql_tasks::prelude::*;
///
/// let strategy = PreparationStrategy::with_column_names(["id"])?;
/// assert!(PreparationStrategy::with_column_indexes(Vec::<usize>::new()).is_err());
/// # let _ = strategy;
/// # Ok::<(), SqlTaskError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreparationStrategy {
    #[default]
    Default,
    GeneratedKeys(bool),
    /// Key columns by position. The `SQLite` backend ignores the positions and
    /// reports `last_insert_rowid` under a column named `rowid`.
    ColumnIndexes(Vec<usize>),
    /// Key columns by name. The `SQLite` backend reports `last_insert_rowid`
    /// under the first name given.
    ColumnNames(Vec<String>),
}

impl PreparationStrategy {
    #[must_use]
    pub fn with_generated_keys(return_generated_keys: bool) -> Self {
        Self::GeneratedKeys(return_generated_keys)
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] if no index is given.
    pub fn with_column_indexes(
        indexes: impl IntoIterator<Item = usize>,
    ) -> Result<Self, SqlTaskError> {
        let indexes: Vec<usize> = indexes.into_iter().collect();
        if indexes.is_empty() {
            return Err(SqlTaskError::InvalidArgument(
                "no column indexes provided".into(),
            ));
        }
        Ok(Self::ColumnIndexes(indexes))
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] if no name is given.
    pub fn with_column_names<S: Into<String>>(
        names: impl IntoIterator<Item = S>,
    ) -> Result<Self, SqlTaskError> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(SqlTaskError::InvalidArgument(
                "no column names provided".into(),
            ));
        }
        Ok(Self::ColumnNames(names))
    }

    /// Prepare `query` on `connection` using the matching driver overload.
    ///
    /// # Errors
    /// Propagates whatever the connection reports while preparing.
    pub fn prepare<'c>(
        &self,
        connection: &'c mut dyn Connection,
        query: &str,
    ) -> Result<Box<dyn PreparedStatement + 'c>, SqlTaskError> {
        match self {
            Self::Default => connection.prepare_statement(query),
            Self::GeneratedKeys(flag) => connection.prepare_statement_with_keys(query, *flag),
            Self::ColumnIndexes(indexes) => {
                connection.prepare_statement_with_column_indexes(query, indexes)
            }
            Self::ColumnNames(names) => connection.prepare_statement_with_column_names(query, names),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeConnection, FakeLog, PreparedKind};

    #[test]
    fn empty_index_and_name_lists_fail_fast() {
        let err = PreparationStrategy::with_column_indexes([]).unwrap_err();
        assert!(err.to_string().contains("no column indexes provided"));
        let err = PreparationStrategy::with_column_names(Vec::<String>::new()).unwrap_err();
        assert!(err.to_string().contains("no column names provided"));
    }

    #[test]
    fn each_strategy_uses_its_overload() {
        let log = FakeLog::shared();
        let mut conn = FakeConnection::new(log.clone());
        let strategies = [
            (PreparationStrategy::Default, PreparedKind::Plain),
            (PreparationStrategy::with_generated_keys(true), PreparedKind::Keys(true)),
            (
                PreparationStrategy::with_column_indexes([1, 2]).unwrap(),
                PreparedKind::Indexes(vec![1, 2]),
            ),
            (
                PreparationStrategy::with_column_names(["id"]).unwrap(),
                PreparedKind::Names(vec!["id".into()]),
            ),
        ];

        for (strategy, expected) in strategies {
            let stmt = strategy.prepare(&mut conn, "INSERT INTO t VALUES (1)").unwrap();
            stmt.close().unwrap();
            assert_eq!(log.lock().unwrap().prepared.last(), Some(&expected));
        }
    }
}
