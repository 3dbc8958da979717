//! Pool and executor configuration.
//!
//! Both structs are plain serde data validated once, either by their builder or
//! after loading from JSON. `PoolConfig::default()` is always valid.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SqlTaskError;
use crate::executor::DrainBudget;

/// Database protocols a pool configuration may name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Protocol {
    #[default]
    Mysql,
    Mariadb,
    Postgresql,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Mysql, Protocol::Mariadb, Protocol::Postgresql];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Mysql => "mysql",
            Protocol::Mariadb => "mariadb",
            Protocol::Postgresql => "postgresql",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = SqlTaskError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| {
                let valid: Vec<&str> = Protocol::ALL.iter().map(|p| p.as_str()).collect();
                SqlTaskError::InvalidArgument(format!(
                    "Problem: Invalid protocol: {s}\nSolution: Use a valid protocol: {valid:?}"
                ))
            })
    }
}

impl TryFrom<String> for Protocol {
    type Error = SqlTaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub protocol: Protocol,
    pub username: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
    pub maximum_pool_size: u32,
    pub core_pool_size: u32,
    pub driver_properties: BTreeMap<String, String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Mysql,
            username: "root".into(),
            password: String::new(),
            database: "minecraft".into(),
            host: "localhost".into(),
            port: 3306,
            maximum_pool_size: 3,
            core_pool_size: 1,
            driver_properties: BTreeMap::new(),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Re-check the invariants the builder enforces.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for a zero port or bad pool sizes.
    pub fn validate(&self) -> Result<(), SqlTaskError> {
        check_port(u32::from(self.port))?;
        check_pool_size(self.core_pool_size, self.maximum_pool_size)
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns [`SqlTaskError::JsonError`] for malformed JSON (including an unknown
    /// protocol) and [`SqlTaskError::InvalidArgument`] for invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, SqlTaskError> {
        let config: PoolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`SqlTaskError::JsonError`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, SqlTaskError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `protocol://host:port/database`
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.protocol, self.host, self.port, self.database
        )
    }
}

/// Fluent builder for [`PoolConfig`]; numeric setters validate immediately.
///
/// ```rust
/// use sql_tasks::prelude::*;
///
/// let config = PoolConfig::builder()
///     .protocol_name("PostgreSQL")?
///     .host("db.internal")
///     .port(5432)?
///     .pool_size(2, 8)?
///     .add_driver_property("sslmode", "require")
///     .build()?;
/// assert_eq!(config.connection_url(), "postgresql://db.internal:5432/minecraft");
/// assert!(PoolConfig::builder().pool_size(2, 1).is_err());
/// # Ok::<(), SqlTaskError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] for a protocol outside [`Protocol::ALL`].
    pub fn protocol_name(mut self, protocol: &str) -> Result<Self, SqlTaskError> {
        self.config.protocol = protocol.parse()?;
        Ok(self)
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] unless `1 <= port <= 65535`.
    pub fn port(mut self, port: u32) -> Result<Self, SqlTaskError> {
        self.config.port = check_port(port)?;
        Ok(self)
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] if either size is zero or
    /// `maximum < core`.
    pub fn pool_size(mut self, core: u32, maximum: u32) -> Result<Self, SqlTaskError> {
        check_pool_size(core, maximum)?;
        self.config.core_pool_size = core;
        self.config.maximum_pool_size = maximum;
        Ok(self)
    }

    #[must_use]
    pub fn driver_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.config.driver_properties = properties;
        self
    }

    #[must_use]
    pub fn add_driver_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.driver_properties.insert(key.into(), value.into());
        self
    }

    /// # Errors
    /// Returns [`SqlTaskError::InvalidArgument`] if the assembled config is invalid.
    pub fn build(self) -> Result<PoolConfig, SqlTaskError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

pub(crate) fn check_port(port: u32) -> Result<u16, SqlTaskError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| {
            SqlTaskError::InvalidArgument(format!(
                "Problem: The port {port} is not valid.\nSolution: Use a port between 1 and 65535."
            ))
        })
}

pub(crate) fn check_pool_size(core: u32, maximum: u32) -> Result<(), SqlTaskError> {
    if core < 1 {
        return Err(SqlTaskError::InvalidArgument(format!(
            "Problem: The core pool size is {core} (less than 1).\n\
             Solution: Pass a core pool size greater than or equal to 1."
        )));
    }
    if maximum < 1 {
        return Err(SqlTaskError::InvalidArgument(format!(
            "Problem: The maximum pool size is {maximum} (less than 1).\n\
             Solution: Pass a maximum pool size greater than or equal to 1."
        )));
    }
    if maximum < core {
        return Err(SqlTaskError::InvalidArgument(format!(
            "Problem: The maximum pool size {maximum} is less than the core pool size {core}.\n\
             Solution: Make the maximum pool size greater than or equal to the core pool size."
        )));
    }
    Ok(())
}

/// Sizing of the database executor and pacing of the callback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Threads started for task execution.
    pub num_threads: usize,
    /// How often the callback queue is drained.
    pub poll_period_millis: u64,
    /// Callbacks finished per drain; zero disables the limit.
    pub max_tasks_per_run: usize,
    /// Time budget of one drain; zero disables the limit.
    pub max_millis_per_run: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            poll_period_millis: 50,
            max_tasks_per_run: 0,
            max_millis_per_run: 0,
        }
    }
}

impl ExecutorConfig {
    /// # Errors
    /// Returns [`SqlTaskError::ConfigError`] for zero threads or a zero poll period.
    pub fn validate(&self) -> Result<(), SqlTaskError> {
        if self.num_threads == 0 {
            return Err(SqlTaskError::ConfigError(
                "num_threads must be at least 1".into(),
            ));
        }
        if self.poll_period_millis == 0 {
            return Err(SqlTaskError::ConfigError(
                "poll_period_millis must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`SqlTaskError::JsonError`] for malformed JSON and
    /// [`SqlTaskError::ConfigError`] for invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, SqlTaskError> {
        let config: ExecutorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_millis)
    }

    #[must_use]
    pub fn drain_budget(&self) -> DrainBudget {
        DrainBudget {
            max_tasks_per_run: self.max_tasks_per_run,
            max_millis_per_run: self.max_millis_per_run,
        }
    }
}
