use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use crate::connection::{Connection, Statement};
use crate::error::SqlTaskError;

use super::reader::{DEFAULT_DELIMITER, ScriptEncoding, check_delimiter, read_statements};

/// How a [`ScriptRunner`] reads and executes its script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    pub delimiter: char,
    pub encoding: ScriptEncoding,
    pub trim_statements: bool,
    pub log_statements: bool,
    pub close_connection: bool,
    pub close_input: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            encoding: ScriptEncoding::Utf8,
            trim_statements: true,
            log_statements: false,
            close_connection: true,
            close_input: true,
        }
    }
}

/// Runs every statement of a script against one connection.
///
/// ```rust
/// use sql_tasks::prelude::*;
///
/// fn seed(connection: Box<dyn Connection>) -> Result<usize, SqlTaskError> {
///     let script = "CREATE TABLE %T% (id INT);\nINSERT INTO %T% VALUES (1);";
///     ScriptRunner::new(connection, script.as_bytes())
///         .replacement("%T%", "players")
///         .log_statements(true)
///         .run_script()
/// }
/// # let _ = seed;
/// ```
pub struct ScriptRunner<R> {
    connection: Option<Box<dyn Connection>>,
    input: Option<R>,
    options: ScriptOptions,
    replacements: BTreeMap<String, String>,
}

impl<R: Read> ScriptRunner<R> {
    #[must_use]
    pub fn new(connection: Box<dyn Connection>, input: R) -> Self {
        Self {
            connection: Some(connection),
            input: Some(input),
            options: ScriptOptions::default(),
            replacements: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ScriptOptions) -> Self {
        self.options = options;
        self
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for a quote character.
    pub fn delimiter(mut self, delimiter: char) -> Result<Self, SqlTaskError> {
        self.options.delimiter = check_delimiter(delimiter)?;
        Ok(self)
    }

    #[must_use]
    pub fn encoding(mut self, encoding: ScriptEncoding) -> Self {
        self.options.encoding = encoding;
        self
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for an unsupported encoding name.
    pub fn encoding_name(mut self, name: &str) -> Result<Self, SqlTaskError> {
        self.options.encoding = name.parse()?;
        Ok(self)
    }

    #[must_use]
    pub fn trim_statements(mut self, trim: bool) -> Self {
        self.options.trim_statements = trim;
        self
    }

    #[must_use]
    pub fn log_statements(mut self, log: bool) -> Self {
        self.options.log_statements = log;
        self
    }

    #[must_use]
    pub fn close_connection(mut self, close: bool) -> Self {
        self.options.close_connection = close;
        self
    }

    #[must_use]
    pub fn close_input(mut self, close: bool) -> Self {
        self.options.close_input = close;
        self
    }

    /// Replace every occurrence of `key` with `value` before execution.
    /// Empty keys are ignored.
    #[must_use]
    pub fn replacement(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        let key = key.into();
        if !key.is_empty() {
            self.replacements.insert(key, value.to_string());
        }
        self
    }

    /// Like [`replacement`](Self::replacement); `None` becomes the text `null`.
    #[must_use]
    pub fn optional_replacement<V: fmt::Display>(
        self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        match value {
            Some(value) => self.replacement(key, value),
            None => self.replacement(key, "null"),
        }
    }

    #[must_use]
    pub fn replacements<K, V>(self, replacements: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        replacements
            .into_iter()
            .fold(self, |runner, (key, value)| runner.replacement(key, value))
    }

    #[must_use]
    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    /// Read, split and execute the script. Returns the number of statements
    /// executed.
    ///
    /// Execution stops at the first failing statement. Whatever the outcome,
    /// the statement handle is closed and the connection and input are closed
    /// when configured to be.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::ScriptStatement`] naming the 1-based index of the
    /// failed statement, or the read/decode error.
    pub fn run_script(&mut self) -> Result<usize, SqlTaskError> {
        let outcome = self.run_all();
        if self.options.close_connection {
            if let Some(connection) = self.connection.take() {
                if let Err(err) = connection.close() {
                    tracing::warn!(error = %err, "failed to close script connection");
                }
            }
        }
        if self.options.close_input {
            self.input = None;
        }
        outcome
    }

    /// Give back whatever the runner did not close.
    pub fn into_parts(self) -> (Option<Box<dyn Connection>>, Option<R>) {
        (self.connection, self.input)
    }

    fn run_all(&mut self) -> Result<usize, SqlTaskError> {
        let input = self.input.as_mut().ok_or_else(|| {
            SqlTaskError::InvalidArgument("script input has already been closed".into())
        })?;
        let statements = read_statements(
            input,
            self.options.encoding,
            self.options.delimiter,
            self.options.trim_statements,
        )?;
        let connection = self.connection.as_mut().ok_or_else(|| {
            SqlTaskError::InvalidArgument("script connection has already been closed".into())
        })?;

        let mut statement = connection.create_statement()?;
        let outcome = execute_all(
            statement.as_mut(),
            &statements,
            &self.replacements,
            self.options.log_statements,
        );
        if let Err(err) = statement.close() {
            tracing::warn!(error = %err, "failed to close script statement");
        }
        outcome
    }
}

impl<R> fmt::Debug for ScriptRunner<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRunner")
            .field("options", &self.options)
            .field("replacements", &self.replacements)
            .field("has_connection", &self.connection.is_some())
            .field("has_input", &self.input.is_some())
            .finish()
    }
}

fn execute_all(
    statement: &mut dyn Statement,
    statements: &[String],
    replacements: &BTreeMap<String, String>,
    log_statements: bool,
) -> Result<usize, SqlTaskError> {
    for (i, raw) in statements.iter().enumerate() {
        let sql = substitute(raw, replacements);
        if log_statements {
            tracing::info!(statement = %sql, "executing script statement");
        }
        if let Err(err) = statement.execute(&sql) {
            tracing::error!(index = i + 1, error = %err, "script statement failed");
            return Err(SqlTaskError::ScriptStatement {
                index: i + 1,
                source: Box::new(err),
            });
        }
    }
    Ok(statements.len())
}

fn substitute(sql: &str, replacements: &BTreeMap<String, String>) -> String {
    replacements
        .iter()
        .fold(sql.to_string(), |acc, (key, value)| acc.replace(key.as_str(), value))
}
