//! Scalar values.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::types::ColumnDataType;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A single nullable value.
///
/// Every integer width is carried as `Integer(i64)` and reports
/// [`ColumnDataType::Long`]; the variant always agrees with
/// [`ScalarValue::data_type`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// Untyped null.
    Null,
    /// Boolean.
    Boolean(Option<bool>),
    /// Integer of any width.
    Integer(Option<i64>),
    /// 64-bit float.
    Double(Option<f64>),
    /// UTF-8 string.
    Utf8(Option<String>),
    /// Days since the Unix epoch.
    Date32(Option<i32>),
    /// Seconds since the Unix epoch.
    TimestampSecond(Option<i64>),
    /// Nanoseconds since the Unix epoch.
    TimestampNanosecond(Option<i64>),
}

impl ScalarValue {
    /// Returns a typed null.
    pub fn null_of(data_type: ColumnDataType) -> Self {
        match data_type {
            ColumnDataType::Null => ScalarValue::Null,
            ColumnDataType::Boolean => ScalarValue::Boolean(None),
            ColumnDataType::Byte
            | ColumnDataType::Short
            | ColumnDataType::Integer
            | ColumnDataType::Long => ScalarValue::Integer(None),
            ColumnDataType::Double => ScalarValue::Double(None),
            ColumnDataType::Utf8 => ScalarValue::Utf8(None),
            ColumnDataType::Date32 => ScalarValue::Date32(None),
            ColumnDataType::TimestampSecond => ScalarValue::TimestampSecond(None),
            ColumnDataType::TimestampNanosecond => ScalarValue::TimestampNanosecond(None),
        }
    }

    /// Returns the data type of this value.
    pub fn data_type(&self) -> ColumnDataType {
        match self {
            ScalarValue::Null => ColumnDataType::Null,
            ScalarValue::Boolean(_) => ColumnDataType::Boolean,
            ScalarValue::Integer(_) => ColumnDataType::Long,
            ScalarValue::Double(_) => ColumnDataType::Double,
            ScalarValue::Utf8(_) => ColumnDataType::Utf8,
            ScalarValue::Date32(_) => ColumnDataType::Date32,
            ScalarValue::TimestampSecond(_) => ColumnDataType::TimestampSecond,
            ScalarValue::TimestampNanosecond(_) => ColumnDataType::TimestampNanosecond,
        }
    }

    /// Returns true if the value is null.
    pub fn is_null(&self) -> bool {
        match self {
            ScalarValue::Null => true,
            ScalarValue::Boolean(v) => v.is_none(),
            ScalarValue::Integer(v) => v.is_none(),
            ScalarValue::Double(v) => v.is_none(),
            ScalarValue::Utf8(v) => v.is_none(),
            ScalarValue::Date32(v) => v.is_none(),
            ScalarValue::TimestampSecond(v) | ScalarValue::TimestampNanosecond(v) => v.is_none(),
        }
    }

    /// Returns the value as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(v) => *v,
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(v) => v.map(|v| v as f64),
            ScalarValue::Double(v) => *v,
            _ => None,
        }
    }

    /// Returns the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Boolean(v) => *v,
            _ => None,
        }
    }

    /// Returns the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Utf8(v) => v.as_deref(),
            _ => None,
        }
    }

    /// Null-safe, type-coercing equality.
    ///
    /// Numeric values compare across widths and between integers and
    /// floats. Nulls and incompatible types are never equal; this never
    /// fails.
    pub fn is_equal_to(&self, other: &ScalarValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Type-coercing comparison. Returns `None` if either side is null or
    /// the types cannot be compared.
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        use ScalarValue::*;
        match (self, other) {
            (Integer(Some(a)), Integer(Some(b))) => Some(a.cmp(b)),
            (Integer(Some(_)) | Double(Some(_)), Integer(Some(_)) | Double(Some(_))) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Boolean(Some(a)), Boolean(Some(b))) => Some(a.cmp(b)),
            (Utf8(Some(a)), Utf8(Some(b))) => Some(a.cmp(b)),
            (Date32(Some(a)), Date32(Some(b))) => Some(a.cmp(b)),
            (
                TimestampSecond(Some(_)) | TimestampNanosecond(Some(_)),
                TimestampSecond(Some(_)) | TimestampNanosecond(Some(_)),
            ) => Some(self.timestamp_nanos()?.cmp(&other.timestamp_nanos()?)),
            _ => None,
        }
    }

    /// Total order used for sorting. Nulls sort first; values of
    /// incomparable types are ordered by type.
    pub fn sort_cmp(&self, other: &ScalarValue) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .compare(other)
                .unwrap_or_else(|| self.type_rank().cmp(&other.type_rank())),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Boolean(_) => 1,
            ScalarValue::Integer(_) | ScalarValue::Double(_) => 2,
            ScalarValue::Utf8(_) => 3,
            ScalarValue::Date32(_) => 4,
            ScalarValue::TimestampSecond(_) | ScalarValue::TimestampNanosecond(_) => 5,
        }
    }

    fn timestamp_nanos(&self) -> Option<i64> {
        match self {
            ScalarValue::TimestampSecond(v) => v.map(|s| s.saturating_mul(NANOS_PER_SECOND)),
            ScalarValue::TimestampNanosecond(v) => *v,
            _ => None,
        }
    }

    /// Returns a hashable key with the same equality as
    /// [`ScalarValue::is_equal_to`], except that nulls are equal to each
    /// other. Used for grouping and join lookups.
    pub fn key(&self) -> KeyValue {
        match self {
            ScalarValue::Boolean(Some(b)) => KeyValue::Boolean(*b),
            ScalarValue::Integer(Some(i)) => KeyValue::Integer(*i),
            ScalarValue::Double(Some(f)) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    KeyValue::Integer(*f as i64)
                } else if f.is_nan() {
                    KeyValue::Double(f64::NAN.to_bits())
                } else {
                    KeyValue::Double(f.to_bits())
                }
            }
            ScalarValue::Utf8(Some(s)) => KeyValue::Utf8(s.clone()),
            ScalarValue::Date32(Some(d)) => KeyValue::Date32(*d),
            ScalarValue::TimestampSecond(Some(_)) | ScalarValue::TimestampNanosecond(Some(_)) => {
                self.timestamp_nanos().map_or(KeyValue::Null, KeyValue::Timestamp)
            }
            _ => KeyValue::Null,
        }
    }

    /// Parses an ISO `YYYY-MM-DD` date into days since the epoch.
    pub fn parse_date32(text: &str) -> Option<i32> {
        let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()?;
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
        i32::try_from(date.signed_duration_since(epoch).num_days()).ok()
    }

    /// Parses an ISO timestamp into nanoseconds since the epoch.
    pub fn parse_timestamp_nanos(text: &str) -> Option<i64> {
        let text = text.trim();
        let parsed = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })?;
        parsed.and_utc().timestamp_nanos_opt()
    }
}

/// Hashable form of a [`ScalarValue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// Any null.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Integers and integral floats.
    Integer(i64),
    /// Non-integral floats, by bit pattern.
    Double(u64),
    /// String.
    Utf8(String),
    /// Date.
    Date32(i32),
    /// Timestamp in nanoseconds.
    Timestamp(i64),
}

impl KeyValue {
    /// Returns true for the null key.
    pub fn is_null(&self) -> bool {
        matches!(self, KeyValue::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "NULL");
        }
        match self {
            ScalarValue::Boolean(Some(v)) => write!(f, "{}", v),
            ScalarValue::Integer(Some(v)) => write!(f, "{}", v),
            ScalarValue::Double(Some(v)) => write!(f, "{}", v),
            ScalarValue::Utf8(Some(v)) => write!(f, "{}", v),
            ScalarValue::Date32(Some(days)) => {
                match NaiveDate::from_ymd_opt(1970, 1, 1)
                    .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(*days))))
                {
                    Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                    None => write!(f, "{}", days),
                }
            }
            ScalarValue::TimestampSecond(Some(secs)) => match DateTime::from_timestamp(*secs, 0) {
                Some(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
                None => write!(f, "{}", secs),
            },
            ScalarValue::TimestampNanosecond(Some(nanos)) => {
                let secs = nanos.div_euclid(NANOS_PER_SECOND);
                let sub = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
                match DateTime::from_timestamp(secs, sub) {
                    Some(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.9f")),
                    None => write!(f, "{}", nanos),
                }
            }
            _ => write!(f, "NULL"),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Integer(Some(v))
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Integer(Some(i64::from(v)))
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Double(Some(v))
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(Some(v))
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(Some(v.to_string()))
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Utf8(Some(v))
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ScalarValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_equal_to_coerces_numerics() {
        assert!(ScalarValue::from(3i64).is_equal_to(&ScalarValue::from(3.0)));
        assert!(!ScalarValue::from(3i64).is_equal_to(&ScalarValue::from(3.5)));
        assert!(ScalarValue::from("a").is_equal_to(&ScalarValue::from("a")));
    }

    #[test]
    fn test_is_equal_to_never_fails() {
        assert!(!ScalarValue::from(1i64).is_equal_to(&ScalarValue::from("1")));
        assert!(!ScalarValue::Integer(None).is_equal_to(&ScalarValue::Integer(None)));
        assert!(!ScalarValue::Null.is_equal_to(&ScalarValue::from(true)));
    }

    #[test]
    fn test_data_type_matches_variant() {
        assert_eq!(ScalarValue::from(1i32).data_type(), ColumnDataType::Long);
        assert_eq!(ScalarValue::null_of(ColumnDataType::Byte), ScalarValue::Integer(None));
        assert_eq!(
            ScalarValue::null_of(ColumnDataType::Utf8).data_type(),
            ColumnDataType::Utf8
        );
    }

    #[test]
    fn test_key_equality() {
        assert_eq!(ScalarValue::from(2.0).key(), ScalarValue::from(2i64).key());
        assert_ne!(ScalarValue::from(2.5).key(), ScalarValue::from(2i64).key());
        assert_eq!(
            ScalarValue::TimestampSecond(Some(1)).key(),
            ScalarValue::TimestampNanosecond(Some(1_000_000_000)).key()
        );
        assert!(ScalarValue::Utf8(None).key().is_null());
    }

    #[test]
    fn test_sort_cmp_nulls_first() {
        let mut values = vec![
            ScalarValue::from(3i64),
            ScalarValue::Integer(None),
            ScalarValue::from(1.5),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert!(values[0].is_null());
        assert_eq!(values[1], ScalarValue::from(1.5));
    }

    #[test]
    fn test_temporal_parse_and_display() {
        let days = ScalarValue::parse_date32("1970-01-11").unwrap();
        assert_eq!(days, 10);
        assert_eq!(ScalarValue::Date32(Some(days)).to_string(), "1970-01-11");

        let nanos = ScalarValue::parse_timestamp_nanos("1970-01-01 00:00:01").unwrap();
        assert_eq!(nanos, 1_000_000_000);
        assert_eq!(
            ScalarValue::TimestampSecond(Some(61)).to_string(),
            "1970-01-01 00:01:01"
        );
    }
}
