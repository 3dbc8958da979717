//! `SQLite` backend: a bb8 pool of rusqlite connections behind the
//! [`ConnectionPool`](crate::pool::ConnectionPool) and
//! [`Connection`](crate::connection::Connection) traits.
//!
//! Statement timeouts map onto `SQLite`'s busy timeout. Generated keys are
//! the connection's last inserted rowid. A callable statement runs its call text
//! as a query and exposes the first returned row as its OUT values.

pub mod config;
pub mod connection;
pub mod params;
pub mod pool;
pub mod query;

pub use config::{SqliteManager, SqliteOptions, SqliteOptionsBuilder};
pub use connection::SqliteConnection;
pub use pool::SqlitePool;
