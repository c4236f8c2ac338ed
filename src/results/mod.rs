//! Row materialization: dynamic records, tolerant conversions, and typed mapping.

mod convert;
mod row;
mod typed;

pub use convert::FromSqlValue;
pub use row::{Columns, DynamicRecord};
pub use typed::{FieldSpec, FromRecord, Record, map_record};
