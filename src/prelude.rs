//! Convenient imports for common functionality.
//!
//! `use templated_sql::prelude::*;` brings in the connection, query, batch, parameter,
//! and result types.

pub use crate::batch::TransactionBatch;
pub use crate::error::{CommandDiagnostics, SqlTemplateError};
pub use crate::executor::{AsyncRecordStream, QueryOptions, RecordStream, TemplateQuery};
pub use crate::impl_record;
pub use crate::markers::{Markers, scan_placeholders};
pub use crate::params::{Fields, ParamMap, ParameterSource};
pub use crate::results::{Columns, DynamicRecord, FromRecord, FromSqlValue, Record};
pub use crate::sqlite::{ConnectionConfig, SqliteConnection, SqliteOptions, SqliteOptionsBuilder};
pub use crate::types::{Provider, SqlValue};

pub use tokio_util::sync::CancellationToken;
