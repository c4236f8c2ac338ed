use rusqlite::types::Value;

use crate::markers::BoundParam;
use crate::types::SqlValue;

/// Convert a bound value into a rusqlite `Value`.
///
/// `SQLite` has no native timestamp, decimal, or JSON storage class; those travel as text.
#[must_use]
pub fn sql_value_to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        SqlValue::Decimal(d) => Value::Text(d.to_string()),
        SqlValue::Null => Value::Null,
        SqlValue::Json(v) => Value::Text(v.to_string()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Read a rusqlite `Value` back as a `SqlValue`.
#[must_use]
pub fn sqlite_to_sql_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Int(i),
        Value::Real(f) => SqlValue::Float(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    }
}

/// Named `SQLite` parameters in registration order.
#[derive(Debug, Clone, Default)]
pub struct NamedParams(pub Vec<(String, Value)>);

impl NamedParams {
    #[must_use]
    pub fn from_bound(params: &[BoundParam]) -> Self {
        Self(
            params
                .iter()
                .map(|p| (p.name.clone(), sql_value_to_sqlite(&p.value)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn non_native_types_travel_as_text() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .unwrap();
        assert_eq!(
            sql_value_to_sqlite(&SqlValue::Timestamp(dt)),
            Value::Text("2024-01-02 03:04:05".into())
        );
        assert_eq!(sql_value_to_sqlite(&SqlValue::Bool(true)), Value::Integer(1));
        assert_eq!(
            sql_value_to_sqlite(&SqlValue::Json(serde_json::json!({"a": 1}))),
            Value::Text(r#"{"a":1}"#.into())
        );
    }

    #[test]
    fn bound_params_keep_their_names() {
        let params = NamedParams::from_bound(&[BoundParam {
            name: "@qp_1_id".into(),
            placeholder: "id".into(),
            value: SqlValue::Int(3),
        }]);
        assert_eq!(params.0, vec![("@qp_1_id".to_owned(), Value::Integer(3))]);
    }
}
