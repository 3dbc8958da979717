use std::future::Future;
use std::time::Duration;

use bb8::ManageConnection;

use crate::config::{PoolConfig, check_pool_size};
use crate::error::SqlTaskError;

use super::pool::SqlitePool;

/// Options for configuring a `SQLite` pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub db_path: String,
    pub max_size: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    /// `PRAGMA name = value` pairs run on every new connection, in order.
    pub pragmas: Vec<(String, String)>,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            max_size: 4,
            min_idle: 1,
            connection_timeout: Duration::from_secs(30),
            pragmas: vec![("journal_mode".into(), "WAL".into())],
        }
    }

    /// Reuse the pool sizing of a generic [`PoolConfig`]; its driver properties
    /// become PRAGMAs.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] if `config` is invalid.
    pub fn from_pool_config(
        db_path: impl Into<String>,
        config: &PoolConfig,
    ) -> Result<Self, SqlTaskError> {
        config.validate()?;
        let mut opts = Self::new(db_path);
        opts.max_size = config.maximum_pool_size;
        opts.min_idle = config.core_pool_size;
        opts.pragmas.extend(
            config
                .driver_properties
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        Ok(opts)
    }

    /// # Errors
    /// Returns [`SqlTaskError::ConfigError`] for an empty path or a PRAGMA name
    /// or value that is not a plain word.
    pub fn validate(&self) -> Result<(), SqlTaskError> {
        if self.db_path.trim().is_empty() {
            return Err(SqlTaskError::ConfigError(
                "SQLite database path is empty".into(),
            ));
        }
        check_pool_size(self.min_idle.max(1), self.max_size)
            .map_err(|err| SqlTaskError::ConfigError(err.to_string()))?;
        for (name, value) in &self.pragmas {
            if !is_word(name) || !is_word(value) {
                return Err(SqlTaskError::ConfigError(format!(
                    "invalid PRAGMA {name} = {value}"
                )));
            }
        }
        Ok(())
    }

    fn pragma_batch(&self) -> String {
        self.pragmas
            .iter()
            .map(|(name, value)| format!("PRAGMA {name} = {value};"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn is_word(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] if either size is zero or
    /// `maximum < core`.
    pub fn pool_size(mut self, core: u32, maximum: u32) -> Result<Self, SqlTaskError> {
        check_pool_size(core, maximum)?;
        self.opts.min_idle = core;
        self.opts.max_size = maximum;
        Ok(self)
    }

    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.opts.connection_timeout = timeout;
        self
    }

    /// Add a PRAGMA, replacing an earlier one with the same name.
    #[must_use]
    pub fn pragma(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.opts.pragmas.retain(|(existing, _)| *existing != name);
        self.opts.pragmas.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build the pool.
    ///
    /// # Errors
    /// Returns [`SqlTaskError`] if the options are invalid or the first
    /// connections cannot be opened.
    pub async fn build(self) -> Result<SqlitePool, SqlTaskError> {
        SqlitePool::new(self.finish()).await
    }
}

/// bb8 manager opening `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    db_path: String,
    init_batch: String,
}

impl SqliteManager {
    #[must_use]
    pub fn new(opts: &SqliteOptions) -> Self {
        Self {
            db_path: opts.db_path.clone(),
            init_batch: opts.pragma_batch(),
        }
    }
}

impl ManageConnection for SqliteManager {
    type Connection = rusqlite::Connection;
    type Error = rusqlite::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let db_path = self.db_path.clone();
        let init_batch = self.init_batch.clone();
        async move {
            let conn = rusqlite::Connection::open(&db_path)?;
            if !init_batch.is_empty() {
                conn.execute_batch(&init_batch)?;
            }
            Ok(conn)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let outcome = conn.query_row("SELECT 1", [], |_| Ok(()));
        async move { outcome }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_maps_onto_sqlite_options() {
        let config = PoolConfig::builder()
            .pool_size(2, 6)
            .unwrap()
            .add_driver_property("foreign_keys", "ON")
            .build()
            .unwrap();
        let opts = SqliteOptions::from_pool_config("app.db", &config).unwrap();
        assert_eq!((opts.min_idle, opts.max_size), (2, 6));
        assert!(opts.pragmas.contains(&("foreign_keys".into(), "ON".into())));
        opts.validate().unwrap();
        assert!(opts.pragma_batch().contains("PRAGMA foreign_keys = ON;"));
    }

    #[test]
    fn suspicious_pragmas_are_rejected() {
        let opts = SqliteOptionsBuilder::new("app.db")
            .pragma("journal_mode", "WAL; DROP TABLE x")
            .finish();
        assert!(matches!(opts.validate(), Err(SqlTaskError::ConfigError(_))));
        assert!(SqliteOptions::new(" ").validate().is_err());
    }

    #[test]
    fn builder_replaces_pragmas_and_checks_sizes() {
        let opts = SqliteOptionsBuilder::new("app.db")
            .pragma("journal_mode", "DELETE")
            .connection_timeout(Duration::from_secs(2))
            .finish();
        assert_eq!(opts.pragmas, vec![("journal_mode".into(), "DELETE".into())]);
        assert!(SqliteOptionsBuilder::new("app.db").pool_size(3, 2).is_err());
    }
}
