//! Scalar values produced by projection

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use duckdb::arrow::datatypes::TimeUnit;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::{Serialize, Serializer};
use std::fmt;

/// Days from 0001-01-01 (CE day 1) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A single cell of a result row
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    /// Exact decimal, as produced by DECIMAL columns and their sums
    Decimal(Decimal),
    Utf8(String),
    /// Timestamp in UTC
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

impl ScalarValue {
    pub(crate) fn from_decimal128(raw: i128, scale: i8) -> Self {
        if scale >= 0 {
            if let Ok(value) = Decimal::try_from_i128_with_scale(raw, scale as u32) {
                return ScalarValue::Decimal(value);
            }
        }
        // Out of rust_decimal's range; keep the magnitude
        ScalarValue::Float64(raw as f64 / 10f64.powi(scale as i32))
    }

    pub(crate) fn from_timestamp(raw: i64, unit: TimeUnit) -> Self {
        let (secs, nanos) = match unit {
            TimeUnit::Second => (raw, 0),
            TimeUnit::Millisecond => (raw.div_euclid(1_000), raw.rem_euclid(1_000) * 1_000_000),
            TimeUnit::Microsecond => (
                raw.div_euclid(1_000_000),
                raw.rem_euclid(1_000_000) * 1_000,
            ),
            TimeUnit::Nanosecond => (raw.div_euclid(1_000_000_000), raw.rem_euclid(1_000_000_000)),
        };

        DateTime::from_timestamp(secs, nanos as u32)
            .map(|dt| ScalarValue::Timestamp(dt.naive_utc()))
            .unwrap_or(ScalarValue::Null)
    }

    pub(crate) fn from_date32(days: i32) -> Self {
        days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(ScalarValue::Date)
            .unwrap_or(ScalarValue::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            ScalarValue::Timestamp(ts) => Some(*ts),
            ScalarValue::Date(date) => date.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Numeric value as an exact decimal where possible
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            ScalarValue::Decimal(d) => Some(*d),
            ScalarValue::Int64(i) => Some(Decimal::from(*i)),
            ScalarValue::Float64(f) => Decimal::try_from(*f).ok(),
            _ => None,
        }
    }

    /// Numeric value as a float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float64(f) => Some(*f),
            ScalarValue::Int64(i) => Some(*i as f64),
            ScalarValue::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Short type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Boolean(_) => "boolean",
            ScalarValue::Int64(_) => "int64",
            ScalarValue::Float64(_) => "float64",
            ScalarValue::Decimal(_) => "decimal",
            ScalarValue::Utf8(_) => "utf8",
            ScalarValue::Timestamp(_) => "timestamp",
            ScalarValue::Date(_) => "date",
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(b) => write!(f, "{}", b),
            ScalarValue::Int64(i) => write!(f, "{}", i),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Decimal(d) => write!(f, "{}", d.normalize()),
            ScalarValue::Utf8(s) => write!(f, "{}", s),
            ScalarValue::Timestamp(ts) => write!(f, "{}", ts),
            ScalarValue::Date(d) => write!(f, "{}", d),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ScalarValue::Null => serializer.serialize_none(),
            ScalarValue::Boolean(b) => serializer.serialize_bool(*b),
            ScalarValue::Int64(i) => serializer.serialize_i64(*i),
            ScalarValue::Float64(v) => serializer.serialize_f64(*v),
            ScalarValue::Decimal(d) => match d.to_f64() {
                Some(v) => serializer.serialize_f64(v),
                None => serializer.serialize_str(&d.to_string()),
            },
            ScalarValue::Utf8(s) => serializer.serialize_str(s),
            ScalarValue::Timestamp(ts) => {
                serializer.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            ScalarValue::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
        }
    }
}
