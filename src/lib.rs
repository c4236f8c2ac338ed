//! Templated SQL execution over `SQLite`.
//!
//! Queries carry named placeholders (`{{name}}` by default) that are rewritten into bound
//! parameters, never inlined values. Placeholders without a value become a configurable null
//! literal. Results stream lazily as [`DynamicRecord`]s or as typed values, and
//! [`TransactionBatch`] merges independently written fragments into one transactional
//! command without their placeholder names colliding.
//!
//! ```rust
//! use templated_sql::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Item {
//!     id: i64,
//!     label: String,
//! }
//! templated_sql::impl_record!(Item { id: i64, label: String });
//!
//! # fn main() -> Result<(), SqlTemplateError> {
//! let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
//! conn.query("create table items (id integer, label text)").execute()?;
//! conn.query("insert into items values ({{id}}, {{label}})")
//!     .params(&ParamMap::new().with("id", 1).with("label", "first"))
//!     .execute()?;
//!
//! let items: Vec<Item> = conn
//!     .query("select id, label from items where id = {{ID}}")
//!     .params(&ParamMap::new().with("id", 1))
//!     .fetch_as::<Item>()?
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(items[0].label, "first");
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod error;
pub mod executor;
pub mod markers;
pub mod params;
pub mod prelude;
pub mod results;
pub mod sqlite;
pub mod types;

pub use batch::TransactionBatch;
pub use error::{CommandDiagnostics, SqlTemplateError};
pub use executor::{AsyncRecordStream, QueryOptions, RecordStream, TemplateQuery};
pub use markers::Markers;
pub use params::{Fields, ParamMap, ParameterSource};
pub use results::{Columns, DynamicRecord, FromRecord, FromSqlValue, Record};
pub use sqlite::{ConnectionConfig, SqliteConnection, SqliteOptions, SqliteOptionsBuilder};
pub use types::{Provider, SqlValue};
