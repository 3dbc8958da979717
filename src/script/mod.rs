//! SQL scripts: splitting them into statements and running them.

mod reader;
mod runner;

pub use reader::{
    DEFAULT_DELIMITER, ScriptEncoding, StatementReader, check_delimiter, read_statements,
    split_statements,
};
pub use runner::{ScriptOptions, ScriptRunner};
