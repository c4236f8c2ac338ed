use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use super::convert::FromSqlValue;
use super::row::{Columns, DynamicRecord};
use crate::types::SqlValue;

/// Build a value of `Self` out of one result row.
///
/// Mapping never fails: anything that does not fit leaves the target (or the affected
/// field) at its default.
pub trait FromRecord: Sized {
    fn from_record(columns: &Arc<Columns>, values: Vec<SqlValue>) -> Self;
}

impl FromRecord for DynamicRecord {
    fn from_record(columns: &Arc<Columns>, values: Vec<SqlValue>) -> Self {
        DynamicRecord::new(Arc::clone(columns), values)
    }
}

impl FromRecord for SqlValue {
    fn from_record(_columns: &Arc<Columns>, values: Vec<SqlValue>) -> Self {
        values.into_iter().next().unwrap_or(SqlValue::Null)
    }
}

impl<T: FromSqlValue> FromRecord for Option<T> {
    fn from_record(_columns: &Arc<Columns>, values: Vec<SqlValue>) -> Self {
        let value = values.first().filter(|v| !v.is_null())?;
        let converted = T::from_sql_value(value);
        if converted.is_none() {
            tracing::debug!(target_type = type_name::<T>(), %value, "scalar not convertible; using None");
        }
        converted
    }
}

/// Column 0 converted to `T`, or `T::default()` on null or a failed conversion.
fn first_column_or_default<T: FromSqlValue + Default>(values: &[SqlValue]) -> T {
    match values.first() {
        None | Some(SqlValue::Null) => T::default(),
        Some(value) => T::from_sql_value(value).unwrap_or_else(|| {
            tracing::debug!(target_type = type_name::<T>(), %value, "scalar not convertible; using default");
            T::default()
        }),
    }
}

macro_rules! impl_scalar_record {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRecord for $ty {
                fn from_record(_columns: &Arc<Columns>, values: Vec<SqlValue>) -> Self {
                    first_column_or_default(&values)
                }
            }
        )*
    };
}

impl_scalar_record!(
    i64,
    i32,
    i16,
    u32,
    u64,
    f64,
    f32,
    String,
    bool,
    NaiveDateTime,
    NaiveDate,
    Decimal,
    Vec<u8>,
    JsonValue,
);

/// A settable field of a record type, as generated by [`impl_record!`](crate::impl_record).
pub struct FieldSpec<T> {
    pub name: &'static str,
    /// Convert and store `value`; `false` when the value does not convert.
    pub assign: fn(&mut T, &SqlValue) -> bool,
}

/// A struct whose fields are filled by column name.
///
/// Implement it with [`impl_record!`](crate::impl_record) rather than by hand.
pub trait Record: Default + 'static {
    fn fields() -> &'static [FieldSpec<Self>];
}

/// Setters of one record type keyed by upper-cased field name.
struct FieldTable<T> {
    setters: Vec<(String, fn(&mut T, &SqlValue) -> bool)>,
}

impl<T: Record> FieldTable<T> {
    fn build() -> Self {
        let mut setters: Vec<(String, fn(&mut T, &SqlValue) -> bool)> = Vec::new();
        for field in T::fields() {
            let key = field.name.to_ascii_uppercase();
            if !setters.iter().any(|(existing, _)| *existing == key) {
                setters.push((key, field.assign));
            }
        }
        Self { setters }
    }
}

type FieldTableCache = LazyLock<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>;

static FIELD_TABLES: FieldTableCache = LazyLock::new(|| Mutex::new(HashMap::new()));

fn field_table<T: Record>() -> Arc<FieldTable<T>> {
    let mut cache = FIELD_TABLES.lock().unwrap_or_else(PoisonError::into_inner);
    let entry = cache.entry(TypeId::of::<T>()).or_insert_with(|| {
        tracing::trace!(record = type_name::<T>(), "building field table");
        Arc::new(FieldTable::<T>::build()) as Arc<dyn Any + Send + Sync>
    });
    Arc::clone(entry)
        .downcast::<FieldTable<T>>()
        .unwrap_or_else(|_| Arc::new(FieldTable::build()))
}

/// Fill a default `T` from a row, matching columns to fields case-insensitively.
///
/// Columns without a field are ignored. Fields without a column, with a null value, or
/// with a value that does not convert keep their default.
#[doc(hidden)]
#[must_use]
pub fn map_record<T: Record>(columns: &Columns, values: &[SqlValue]) -> T {
    let table = field_table::<T>();
    let mut target = T::default();
    for (name, assign) in &table.setters {
        let Some(value) = columns.position(name).and_then(|idx| values.get(idx)) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if !assign(&mut target, value) {
            tracing::debug!(
                record = type_name::<T>(),
                field = %name,
                %value,
                "column value not convertible; field left at default"
            );
        }
    }
    target
}

/// Implement [`Record`] and [`FromRecord`] for a struct with a `Default` impl.
///
/// List the fields that should be filled from columns along with their types.
///
/// ```rust
/// use templated_sql::impl_record;
///
/// #[derive(Debug, Default)]
/// struct User {
///     id: i64,
///     name: String,
///     email: Option<String>,
/// }
///
/// impl_record!(User { id: i64, name: String, email: Option<String> });
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ident { $($field:ident : $fty:ty),* $(,)? }) => {
        impl $crate::results::Record for $ty {
            fn fields() -> &'static [$crate::results::FieldSpec<Self>] {
                const FIELDS: &[$crate::results::FieldSpec<$ty>] = &[
                    $(
                        $crate::results::FieldSpec {
                            name: stringify!($field),
                            assign: |target: &mut $ty, value: &$crate::types::SqlValue| {
                                match <$fty as $crate::results::FromSqlValue>::from_sql_value(value) {
                                    Some(converted) => {
                                        target.$field = converted;
                                        true
                                    }
                                    None => false,
                                }
                            },
                        }
                    ),*
                ];
                FIELDS
            }
        }

        impl $crate::results::FromRecord for $ty {
            fn from_record(
                columns: &::std::sync::Arc<$crate::results::Columns>,
                values: ::std::vec::Vec<$crate::types::SqlValue>,
            ) -> Self {
                $crate::results::map_record::<$ty>(columns, &values)
            }
        }
    };
}
