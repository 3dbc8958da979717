use std::io::{self, Read};
use std::str::{Chars, FromStr};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SqlTaskError;

pub const DEFAULT_DELIMITER: char = ';';

/// Character encodings a script may be read in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl ScriptEncoding {
    /// Decode raw script bytes.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::IoError`] with `InvalidData` for malformed UTF-8.
    pub fn decode(self, bytes: Vec<u8>) -> Result<String, SqlTaskError> {
        match self {
            ScriptEncoding::Utf8 => String::from_utf8(bytes)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err).into()),
            ScriptEncoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

impl FromStr for ScriptEncoding {
    type Err = SqlTaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(ScriptEncoding::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(ScriptEncoding::Latin1),
            _ => Err(SqlTaskError::InvalidArgument(format!(
                "unsupported script encoding: {s}"
            ))),
        }
    }
}

/// Check that `delimiter` can end a statement.
///
/// # Errors
/// Returns [`SqlTaskError::InvalidArgument`] for quote characters, which would
/// never be seen outside a literal.
pub fn check_delimiter(delimiter: char) -> Result<char, SqlTaskError> {
    if matches!(delimiter, '\'' | '"') {
        return Err(SqlTaskError::InvalidArgument(format!(
            "quote character {delimiter:?} cannot be a statement delimiter"
        )));
    }
    Ok(delimiter)
}

#[derive(Clone, Copy)]
enum State {
    Normal,
    Quoted { quote: char, escaped: bool },
}

/// Splits script text into statements, lazily.
///
/// Outside of `'...'` and `"..."` literals the delimiter ends a statement and
/// newlines become spaces. Literals are copied verbatim with their quotes; a
/// backslash escapes the next character inside them. An unterminated literal
/// runs to the end of the input. Blank statements are skipped.
///
/// ```rust
/// use sql_tasks::script::StatementReader;
///
/// let stmts: Vec<String> =
///     StatementReader::new("SELECT 1;\nSELECT ';';; SELECT 2", ';').collect();
/// assert_eq!(stmts, ["SELECT 1", "SELECT ';'", "SELECT 2"]);
/// ```
pub struct StatementReader<'a> {
    chars: Chars<'a>,
    delimiter: char,
    trim: bool,
}

impl<'a> StatementReader<'a> {
    #[must_use]
    pub fn new(text: &'a str, delimiter: char) -> Self {
        Self {
            chars: text.chars(),
            delimiter,
            trim: true,
        }
    }

    /// Keep surrounding whitespace of each statement.
    #[must_use]
    pub fn trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    /// Scan one delimiter-terminated chunk. `None` at end of input.
    fn next_chunk(&mut self) -> Option<String> {
        let mut chunk = String::new();
        let mut state = State::Normal;
        let mut consumed = false;

        for c in self.chars.by_ref() {
            consumed = true;
            state = match state {
                State::Normal if c == '\'' || c == '"' => {
                    chunk.push(c);
                    State::Quoted {
                        quote: c,
                        escaped: false,
                    }
                }
                State::Normal if c == self.delimiter => return Some(chunk),
                State::Normal => {
                    chunk.push(if c == '\n' { ' ' } else { c });
                    State::Normal
                }
                State::Quoted { quote, escaped } => {
                    chunk.push(c);
                    if c == quote && !escaped {
                        State::Normal
                    } else {
                        State::Quoted {
                            quote,
                            escaped: c == '\\' && !escaped,
                        }
                    }
                }
            };
        }
        consumed.then_some(chunk)
    }
}

impl Iterator for StatementReader<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let chunk = self.next_chunk()?;
            if chunk.trim().is_empty() {
                continue;
            }
            return Some(if self.trim {
                chunk.trim().to_string()
            } else {
                chunk
            });
        }
    }
}

/// Split `text` into trimmed, non-empty statements.
#[must_use]
pub fn split_statements(text: &str, delimiter: char) -> Vec<String> {
    StatementReader::new(text, delimiter).collect()
}

/// Read all of `input`, decode it and split it into statements.
///
/// # Errors
/// Returns [`SqlTaskError::IoError`] if reading or decoding fails.
pub fn read_statements<R: Read>(
    input: &mut R,
    encoding: ScriptEncoding,
    delimiter: char,
    trim: bool,
) -> Result<Vec<String>, SqlTaskError> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    let text = encoding.decode(bytes)?;
    Ok(StatementReader::new(&text, delimiter).trim(trim).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"CREATE TABLE IF NOT EXISTS `test`
(
    `id`   INT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    `name` VARCHAR(32)
) DEFAULT CHARACTER SET utf8;

SELECT * FROM `test` WHERE `id` = 10;
SELECT * FROM `test` WHERE `name` = ";";
SELECT * FROM `test` WHERE `name` = "\"";
SELECT * FROM `test` WHERE `name` = "\\";
SELECT * FROM `test` WHERE `name` = "\\\"";
SELECT * FROM `test` WHERE `name` = ';';
SELECT * FROM `test` WHERE `name` = '\'';
SELECT * FROM `test` WHERE `name` = '\\';
SELECT * FROM `test` WHERE `name` = '\\\'';"#;

    fn expected() -> Vec<String> {
        [
            "CREATE TABLE IF NOT EXISTS `test` (     `id`   INT NOT NULL AUTO_INCREMENT PRIMARY KEY,     `name` VARCHAR(32) ) DEFAULT CHARACTER SET utf8",
            "SELECT * FROM `test` WHERE `id` = 10",
            r#"SELECT * FROM `test` WHERE `name` = ";""#,
            r#"SELECT * FROM `test` WHERE `name` = "\"""#,
            r#"SELECT * FROM `test` WHERE `name` = "\\""#,
            r#"SELECT * FROM `test` WHERE `name` = "\\\"""#,
            "SELECT * FROM `test` WHERE `name` = ';'",
            r"SELECT * FROM `test` WHERE `name` = '\''",
            r"SELECT * FROM `test` WHERE `name` = '\\'",
            r"SELECT * FROM `test` WHERE `name` = '\\\''",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    #[test]
    fn reads_all_statements() {
        assert_eq!(split_statements(SCRIPT, ';'), expected());
    }

    #[test]
    fn honours_custom_delimiter() {
        let piped = SCRIPT.replace(';', "|");
        let expected: Vec<String> = expected().iter().map(|s| s.replace(';', "|")).collect();
        assert_eq!(split_statements(&piped, '|'), expected);
    }

    #[test]
    fn delimiter_inside_literals_is_kept() {
        assert_eq!(
            split_statements("SELECT 1; SELECT ';'; SELECT 2", ';'),
            ["SELECT 1", "SELECT ';'", "SELECT 2"]
        );
    }

    #[test]
    fn newlines_inside_literals_survive() {
        assert_eq!(
            split_statements("INSERT INTO t VALUES ('a\nb')\n;", ';'),
            ["INSERT INTO t VALUES ('a\nb')"]
        );
    }

    #[test]
    fn blank_statements_are_skipped() {
        assert_eq!(
            split_statements(";; SELECT 1 ;\n\n; ;SELECT 2;", ';'),
            ["SELECT 1", "SELECT 2"]
        );
        assert!(split_statements("  \n ", ';').is_empty());
        assert!(split_statements("", ';').is_empty());
    }

    #[test]
    fn unterminated_literal_runs_to_end() {
        assert_eq!(
            split_statements("SELECT 'abc; SELECT 2", ';'),
            ["SELECT 'abc; SELECT 2"]
        );
    }

    #[test]
    fn untrimmed_statements_keep_whitespace() {
        let stmts: Vec<String> = StatementReader::new(" SELECT 1 ;SELECT 2", ';')
            .trim(false)
            .collect();
        assert_eq!(stmts, [" SELECT 1 ", "SELECT 2"]);
    }

    #[test]
    fn encodings() {
        assert_eq!("UTF-8".parse::<ScriptEncoding>().unwrap(), ScriptEncoding::Utf8);
        assert_eq!("ISO_8859_1".parse::<ScriptEncoding>().unwrap(), ScriptEncoding::Latin1);
        assert!("ebcdic".parse::<ScriptEncoding>().unwrap_err().is_invalid_argument());

        let latin1 = vec![b'S', b'E', b'L', 0xE9];
        assert_eq!(ScriptEncoding::Latin1.decode(latin1.clone()).unwrap(), "SELé");
        assert!(matches!(
            ScriptEncoding::Utf8.decode(latin1),
            Err(SqlTaskError::IoError(_))
        ));
    }

    #[test]
    fn reads_from_any_reader() {
        let mut input = "SELECT 1|SELECT 2".as_bytes();
        let stmts = read_statements(&mut input, ScriptEncoding::Utf8, '|', true).unwrap();
        assert_eq!(stmts, ["SELECT 1", "SELECT 2"]);
        assert!(check_delimiter('"').is_err());
        assert_eq!(check_delimiter('|').unwrap(), '|');
    }
}
