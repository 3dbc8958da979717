use clap::Parser;
use serde::Serialize;
use sql_tasks::script::{DEFAULT_DELIMITER, ScriptEncoding};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a SQL script against a SQLite database")]
pub(crate) struct Args {
    /// Script file to execute.
    pub(crate) script: PathBuf,
    #[arg(long, default_value = "script.db")]
    pub(crate) db: String,
    #[arg(long, default_value_t = DEFAULT_DELIMITER)]
    pub(crate) delimiter: char,
    #[arg(long, value_enum, default_value = "utf8")]
    pub(crate) encoding: ScriptEncoding,
    /// Replace every KEY in the script text with VALUE.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_replacement)]
    pub(crate) replacements: Vec<(String, String)>,
    #[arg(long)]
    pub(crate) keep_whitespace: bool,
    #[arg(long)]
    pub(crate) log_statements: bool,
    #[arg(long)]
    pub(crate) verbose: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunConfig {
    pub(crate) script: PathBuf,
    pub(crate) db: String,
    pub(crate) delimiter: char,
    pub(crate) encoding: ScriptEncoding,
    pub(crate) replacements: BTreeMap<String, String>,
    pub(crate) trim_statements: bool,
    pub(crate) log_statements: bool,
}

impl RunConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        RunConfig {
            script: args.script,
            db: args.db,
            delimiter: args.delimiter,
            encoding: args.encoding,
            replacements: args.replacements.into_iter().collect(),
            trim_statements: !args.keep_whitespace,
            log_statements: args.log_statements,
        }
    }
}

fn parse_replacement(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("empty key in `{raw}`")),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_splits_on_first_equals() {
        assert_eq!(
            parse_replacement("%URL%=a=b").unwrap(),
            ("%URL%".to_string(), "a=b".to_string())
        );
        assert!(parse_replacement("=x").is_err());
        assert!(parse_replacement("novalue").is_err());
    }

    #[test]
    fn later_replacement_for_a_key_wins() {
        let args = Args::parse_from([
            "sql-script",
            "seed.sql",
            "--set",
            "%T%=a",
            "--set",
            "%T%=b",
            "--encoding",
            "latin1",
        ]);
        let config = RunConfig::from_args(args);
        assert_eq!(config.replacements["%T%"], "b");
        assert_eq!(config.encoding, ScriptEncoding::Latin1);
        assert!(config.trim_statements);
    }
}
