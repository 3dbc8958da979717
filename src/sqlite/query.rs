use rusqlite::types::Value;

use crate::error::SqlTaskError;
use crate::results::ResultSet;

use super::params::sqlite_value_to_row_value;

/// Run `stmt` with `params` and materialise every returned row.
///
/// # Errors
/// Returns [`SqlTaskError::SqliteError`] if binding, stepping or reading a column fails.
pub fn build_result_set(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[Value],
) -> Result<ResultSet, SqlTaskError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(column_names);

    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            let value: Value = row.get(i)?;
            row_values.push(sqlite_value_to_row_value(value));
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}
