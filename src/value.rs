//! Typed row values exchanged between connectors.
//!
//! Equality and hashing are semantic rather than structural: numeric variants
//! compare by numeric value, so `Int(100)` read from the source equals the
//! `Decimal(100.000000000)` read back from a `DECIMAL(38,9)` warehouse column,
//! and a naive timestamp equals a UTC timestamp with the same wall clock.
//! The incremental updater relies on this to match keys and detect changes.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use duckdb::types::{TimeUnit, Value as DuckValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single column value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// SQL NULL
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer of any width up to 64 bits
    Int(i64),
    /// Floating point
    Float(f64),
    /// Exact decimal
    Decimal(Decimal),
    /// Character data
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone, normalized to UTC
    TimestampTz(DateTime<Utc>),
}

impl Value {
    /// Whether this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical text used for equality, hashing and row keys.
    ///
    /// Each variant family gets its own prefix so `Text("1")` never collides
    /// with `Int(1)`.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => format!("b:{}", b),
            Value::Int(i) => format!("n:{}", i),
            Value::Float(f) => match Decimal::try_from(*f) {
                Ok(d) => format!("n:{}", d.normalize()),
                Err(_) => format!("n:{}", f),
            },
            Value::Decimal(d) => format!("n:{}", d.normalize()),
            Value::Text(s) => format!("s:{}", s),
            Value::Bytes(b) => format!("x:{}", STANDARD.encode(b)),
            Value::Date(d) => format!("d:{}", d),
            Value::Time(t) => format!("t:{}", t.format("%H:%M:%S%.f")),
            Value::Timestamp(ts) => format!("ts:{}", ts.format(TIMESTAMP_FORMAT)),
            Value::TimestampTz(ts) => format!("ts:{}", ts.naive_utc().format(TIMESTAMP_FORMAT)),
        }
    }

    /// Convert to a DuckDB parameter value.
    ///
    /// Decimals and temporal values are bound as text and cast by DuckDB to
    /// the column type of the statement they appear in.
    pub fn to_duckdb(&self) -> DuckValue {
        match self {
            Value::Null => DuckValue::Null,
            Value::Bool(b) => DuckValue::Boolean(*b),
            Value::Int(i) => DuckValue::BigInt(*i),
            Value::Float(f) => DuckValue::Double(*f),
            Value::Decimal(d) => DuckValue::Text(d.to_string()),
            Value::Text(s) => DuckValue::Text(s.clone()),
            Value::Bytes(b) => DuckValue::Blob(b.clone()),
            Value::Date(d) => DuckValue::Text(d.to_string()),
            Value::Time(t) => DuckValue::Text(t.format("%H:%M:%S%.f").to_string()),
            Value::Timestamp(ts) => DuckValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
            Value::TimestampTz(ts) => DuckValue::Text(ts.to_rfc3339()),
        }
    }

    /// Convert a value read from DuckDB.
    pub fn from_duckdb(value: DuckValue) -> Self {
        match value {
            DuckValue::Null => Value::Null,
            DuckValue::Boolean(b) => Value::Bool(b),
            DuckValue::TinyInt(i) => Value::Int(i.into()),
            DuckValue::SmallInt(i) => Value::Int(i.into()),
            DuckValue::Int(i) => Value::Int(i.into()),
            DuckValue::BigInt(i) => Value::Int(i),
            DuckValue::HugeInt(i) => match i64::try_from(i) {
                Ok(v) => Value::Int(v),
                Err(_) => Decimal::try_from_i128_with_scale(i, 0)
                    .map(Value::Decimal)
                    .unwrap_or_else(|_| Value::Text(i.to_string())),
            },
            DuckValue::UTinyInt(i) => Value::Int(i.into()),
            DuckValue::USmallInt(i) => Value::Int(i.into()),
            DuckValue::UInt(i) => Value::Int(i.into()),
            DuckValue::UBigInt(i) => match i64::try_from(i) {
                Ok(v) => Value::Int(v),
                Err(_) => Value::Decimal(Decimal::from(i)),
            },
            DuckValue::Float(f) => Value::Float(f.into()),
            DuckValue::Double(f) => Value::Float(f),
            DuckValue::Decimal(d) => Value::Decimal(d),
            DuckValue::Text(s) => Value::Text(s),
            DuckValue::Blob(b) => Value::Bytes(b),
            DuckValue::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days.into())))
                .map(Value::Date)
                .unwrap_or(Value::Null),
            DuckValue::Time64(unit, v) => {
                let micros = to_micros(unit, v);
                NaiveTime::from_num_seconds_from_midnight_opt(
                    (micros / 1_000_000) as u32,
                    ((micros % 1_000_000) * 1_000) as u32,
                )
                .map(Value::Time)
                .unwrap_or(Value::Null)
            }
            DuckValue::Timestamp(unit, v) => DateTime::from_timestamp_micros(to_micros(unit, v))
                .map(|ts| Value::Timestamp(ts.naive_utc()))
                .unwrap_or(Value::Null),
            other => Value::Text(format!("{:?}", other)),
        }
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => self.canonical() == other.canonical(),
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "\\x{}", STANDARD.encode(b)),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::str::FromStr;

    #[test]
    fn test_numeric_equality_across_variants() {
        let dec = Decimal::from_str("100.000000000").unwrap();
        assert_eq!(Value::Int(100), Value::Decimal(dec));
        assert_eq!(Value::Float(10.5), Value::Decimal(Decimal::from_str("10.5").unwrap()));
        assert_ne!(Value::Int(1), Value::Text("1".into()));
        assert_ne!(Value::Null, Value::Int(0));
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        let mut set = HashSet::new();
        set.insert(Value::Int(7));
        assert!(set.contains(&Value::Decimal(Decimal::from_str("7.00").unwrap())));
    }

    #[test]
    fn test_timestamp_tz_matches_naive() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let utc = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);
        assert_eq!(Value::Timestamp(naive), Value::TimestampTz(utc));
    }

    #[test]
    fn test_from_duckdb_temporal() {
        assert_eq!(
            Value::from_duckdb(DuckValue::Date32(1)),
            Value::Date(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap())
        );
        assert_eq!(
            Value::from_duckdb(DuckValue::Timestamp(TimeUnit::Second, 60)),
            Value::Timestamp(
                NaiveDate::from_ymd_opt(1970, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 1, 0)
                    .unwrap()
            )
        );
        assert_eq!(
            Value::from_duckdb(DuckValue::Time64(TimeUnit::Microsecond, 3_600_000_000)),
            Value::Time(NaiveTime::from_hms_opt(1, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_option_into_value() {
        let missing: Option<i64> = None;
        assert!(Value::from(missing).is_null());
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    proptest! {
        #[test]
        fn int_and_decimal_agree(v in any::<i64>()) {
            let a = Value::Int(v);
            let b = Value::Decimal(Decimal::from(v));
            prop_assert_eq!(a.canonical(), b.canonical());
        }

        #[test]
        fn text_never_equals_int(v in any::<i64>()) {
            prop_assert_ne!(Value::Text(v.to_string()), Value::Int(v));
        }
    }
}
