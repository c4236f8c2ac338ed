//! Tolerant value conversions used by typed row mapping.
//!
//! Every conversion returns `Option`: `None` means "could not convert" and callers fold it
//! into "leave the target at its default". Parsing is locale-independent.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value as JsonValue;

use crate::types::SqlValue;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Convert a database value into a Rust value.
pub trait FromSqlValue: Sized {
    /// `None` when the value is `Null` or cannot be represented as `Self`.
    fn from_sql_value(value: &SqlValue) -> Option<Self>;
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Float(f) => float_to_i64(*f),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

macro_rules! impl_from_sql_value_narrow_int {
    ($($ty:ty),*) => {
        $(
            impl FromSqlValue for $ty {
                fn from_sql_value(value: &SqlValue) -> Option<Self> {
                    i64::from_sql_value(value).and_then(|i| <$ty>::try_from(i).ok())
                }
            }
        )*
    };
}

impl_from_sql_value_narrow_int!(i32, i16, u32, u64, usize);

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::Decimal(d) => d.to_f64(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        f64::from_sql_value(value).map(|f| f as f32)
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Null | SqlValue::Blob(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(0) => Some(false),
            SqlValue::Int(1) => Some(true),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Timestamp(dt) => Some(*dt),
            SqlValue::Text(s) => parse_timestamp(s.trim()),
            _ => None,
        }
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .or_else(|| parse_timestamp(s.trim()).map(|dt| dt.date())),
            SqlValue::Timestamp(dt) => Some(dt.date()),
            _ => None,
        }
    }
}

impl FromSqlValue for Decimal {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Decimal(d) => Some(*d),
            SqlValue::Int(i) => Some(Decimal::from(*i)),
            SqlValue::Float(f) => Decimal::try_from(*f).ok(),
            SqlValue::Text(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Blob(bytes) => Some(bytes.clone()),
            SqlValue::Text(s) => Some(s.as_bytes().to_vec()),
            _ => None,
        }
    }
}

impl FromSqlValue for JsonValue {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Json(v) => Some(v.clone()),
            SqlValue::Text(s) => serde_json::from_str(s).ok(),
            SqlValue::Null | SqlValue::Blob(_) => None,
            other => serde_json::to_value(other).ok(),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_sql_value(value).map(Some)
        }
    }
}
