use std::sync::Arc;

use super::row::{Columns, CustomDbRow};
use crate::types::RowValues;

/// Rows returned by a query.
///
/// `rows_affected` counts the rows materialised here; DML counts come back
/// from `execute_update` instead.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub results: Vec<CustomDbRow>,
    pub rows_affected: usize,
    columns: Option<Arc<Columns>>,
}

impl ResultSet {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Fix the column header every subsequently added row shares.
    pub fn set_column_names(&mut self, names: Vec<String>) {
        self.columns = Some(Arc::new(Columns::new(names)));
    }

    #[must_use]
    pub fn column_names(&self) -> Option<&[String]> {
        self.columns.as_deref().map(Columns::names)
    }

    /// Append a row. Rows added before the column names are set are dropped.
    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        let Some(columns) = &self.columns else {
            return;
        };
        self.results.push(CustomDbRow::new(Arc::clone(columns), values));
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&CustomDbRow> {
        self.results.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_one_header() {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(vec!["id".into(), "name".into()]);
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Text("a".into())]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::Text("b".into())]);

        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows_affected, 2);
        assert_eq!(rs.column_names().map(<[String]>::len), Some(2));
        let second = &rs.results[1];
        assert_eq!(second.get("name").and_then(RowValues::as_text), Some("b"));
        assert_eq!(second.get_by_index(0), Some(&RowValues::Int(2)));
        assert_eq!(second.get("missing"), None);
    }

    #[test]
    fn rows_without_header_are_dropped() {
        let mut rs = ResultSet::default();
        rs.add_row_values(vec![RowValues::Null]);
        assert!(rs.is_empty());
        assert!(rs.column_names().is_none());
    }
}
