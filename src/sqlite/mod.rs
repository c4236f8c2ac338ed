//! `SQLite` provider: connection handle, worker thread, and statement runner.

pub mod config;
pub mod connection;
pub mod params;
pub(crate) mod query;
mod worker;

pub use config::{ConnectionConfig, SqliteOptions, SqliteOptionsBuilder};
pub use connection::SqliteConnection;
pub use params::{sql_value_to_sqlite, sqlite_to_sql_value};
