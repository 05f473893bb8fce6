//! Typed, nullable column arrays.
//!
//! A [`RecordArray`] is a growable column of one [`ColumnDataType`]. Values
//! are appended through [`RecordArray::push`], which coerces strings and
//! other scalars into the column type. Values that cannot be parsed are
//! stored as nulls; integer values that do not fit report
//! [`PushOutcome::Overflow`] so the owning batch can widen the column along
//! the `Byte -> Short -> Integer -> Long` chain.

use super::scalar::ScalarValue;
use super::types::ColumnDataType;
use crate::error::{ExecResult, ExecutionError};

/// Result of appending a value to an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The value (or an explicit null) was stored.
    Stored,
    /// The value could not be parsed into the column type; a null was stored.
    StoredNull,
    /// The value is valid but outside the column's range. Nothing was stored.
    Overflow,
}

/// A nullable homogeneous column.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordArray {
    /// Column of the given length where every value is null.
    Null(usize),
    /// Booleans.
    Boolean(Vec<Option<bool>>),
    /// Unsigned 8-bit integers.
    Byte(Vec<Option<u8>>),
    /// 16-bit integers.
    Short(Vec<Option<i16>>),
    /// 32-bit integers.
    Integer(Vec<Option<i32>>),
    /// 64-bit integers.
    Long(Vec<Option<i64>>),
    /// 64-bit floats.
    Double(Vec<Option<f64>>),
    /// Strings.
    Utf8(Vec<Option<String>>),
    /// Days since the epoch.
    Date32(Vec<Option<i32>>),
    /// Seconds since the epoch.
    TimestampSecond(Vec<Option<i64>>),
    /// Nanoseconds since the epoch.
    TimestampNanosecond(Vec<Option<i64>>),
}

/// Runs `$body` against the value vector of any typed variant, or
/// `$null` against the length of a `Null` array.
macro_rules! dispatch {
    ($array:expr, $values:ident => $body:expr, $len:ident => $null:expr) => {
        match $array {
            RecordArray::Null($len) => $null,
            RecordArray::Boolean($values) => $body,
            RecordArray::Byte($values) => $body,
            RecordArray::Short($values) => $body,
            RecordArray::Integer($values) => $body,
            RecordArray::Long($values) => $body,
            RecordArray::Double($values) => $body,
            RecordArray::Utf8($values) => $body,
            RecordArray::Date32($values) => $body,
            RecordArray::TimestampSecond($values) => $body,
            RecordArray::TimestampNanosecond($values) => $body,
        }
    };
}

/// Like `dispatch!`, but rebuilds an array of the same variant from the
/// vector (or length) the body returns.
macro_rules! map_array {
    ($array:expr, $values:ident => $body:expr, $len:ident => $null:expr) => {
        match $array {
            RecordArray::Null($len) => RecordArray::Null($null),
            RecordArray::Boolean($values) => RecordArray::Boolean($body),
            RecordArray::Byte($values) => RecordArray::Byte($body),
            RecordArray::Short($values) => RecordArray::Short($body),
            RecordArray::Integer($values) => RecordArray::Integer($body),
            RecordArray::Long($values) => RecordArray::Long($body),
            RecordArray::Double($values) => RecordArray::Double($body),
            RecordArray::Utf8($values) => RecordArray::Utf8($body),
            RecordArray::Date32($values) => RecordArray::Date32($body),
            RecordArray::TimestampSecond($values) => RecordArray::TimestampSecond($body),
            RecordArray::TimestampNanosecond($values) => RecordArray::TimestampNanosecond($body),
        }
    };
}

/// Pairs two arrays of the same variant.
macro_rules! zip_same {
    ($left:expr, $right:expr, $a:ident, $b:ident => $body:expr, else $other:expr) => {
        match ($left, $right) {
            (RecordArray::Boolean($a), RecordArray::Boolean($b)) => $body,
            (RecordArray::Byte($a), RecordArray::Byte($b)) => $body,
            (RecordArray::Short($a), RecordArray::Short($b)) => $body,
            (RecordArray::Integer($a), RecordArray::Integer($b)) => $body,
            (RecordArray::Long($a), RecordArray::Long($b)) => $body,
            (RecordArray::Double($a), RecordArray::Double($b)) => $body,
            (RecordArray::Utf8($a), RecordArray::Utf8($b)) => $body,
            (RecordArray::Date32($a), RecordArray::Date32($b)) => $body,
            (RecordArray::TimestampSecond($a), RecordArray::TimestampSecond($b)) => $body,
            (RecordArray::TimestampNanosecond($a), RecordArray::TimestampNanosecond($b)) => $body,
            _ => $other,
        }
    };
}

impl RecordArray {
    /// Creates an empty array of the given type.
    pub fn new_empty(data_type: ColumnDataType, capacity: usize) -> Self {
        match data_type {
            ColumnDataType::Null => RecordArray::Null(0),
            ColumnDataType::Boolean => RecordArray::Boolean(Vec::with_capacity(capacity)),
            ColumnDataType::Byte => RecordArray::Byte(Vec::with_capacity(capacity)),
            ColumnDataType::Short => RecordArray::Short(Vec::with_capacity(capacity)),
            ColumnDataType::Integer => RecordArray::Integer(Vec::with_capacity(capacity)),
            ColumnDataType::Long => RecordArray::Long(Vec::with_capacity(capacity)),
            ColumnDataType::Double => RecordArray::Double(Vec::with_capacity(capacity)),
            ColumnDataType::Utf8 => RecordArray::Utf8(Vec::with_capacity(capacity)),
            ColumnDataType::Date32 => RecordArray::Date32(Vec::with_capacity(capacity)),
            ColumnDataType::TimestampSecond => {
                RecordArray::TimestampSecond(Vec::with_capacity(capacity))
            }
            ColumnDataType::TimestampNanosecond => {
                RecordArray::TimestampNanosecond(Vec::with_capacity(capacity))
            }
        }
    }

    /// Creates an array of `size` nulls.
    pub fn new_null(data_type: ColumnDataType, size: usize) -> Self {
        let mut array = Self::new_empty(data_type, size);
        array.fill_with_null(size);
        array
    }

    /// Creates an array by repeating a scalar `size` times.
    pub fn from_scalar(value: &ScalarValue, size: usize) -> Self {
        match value {
            ScalarValue::Null => RecordArray::Null(size),
            ScalarValue::Boolean(v) => RecordArray::Boolean(vec![*v; size]),
            ScalarValue::Integer(v) => RecordArray::Long(vec![*v; size]),
            ScalarValue::Double(v) => RecordArray::Double(vec![*v; size]),
            ScalarValue::Utf8(v) => RecordArray::Utf8(vec![v.clone(); size]),
            ScalarValue::Date32(v) => RecordArray::Date32(vec![*v; size]),
            ScalarValue::TimestampSecond(v) => RecordArray::TimestampSecond(vec![*v; size]),
            ScalarValue::TimestampNanosecond(v) => RecordArray::TimestampNanosecond(vec![*v; size]),
        }
    }

    /// Builds an array of the given type from scalars. Integer arrays are
    /// widened as needed, so the result may be wider than `data_type`.
    pub fn from_scalars<'a>(
        data_type: ColumnDataType,
        values: impl IntoIterator<Item = &'a ScalarValue>,
    ) -> ExecResult<Self> {
        let mut array = Self::new_empty(data_type, 0);
        for value in values {
            array.push_widening(value)?;
        }
        Ok(array)
    }

    /// Returns the data type of this array.
    pub fn data_type(&self) -> ColumnDataType {
        match self {
            RecordArray::Null(_) => ColumnDataType::Null,
            RecordArray::Boolean(_) => ColumnDataType::Boolean,
            RecordArray::Byte(_) => ColumnDataType::Byte,
            RecordArray::Short(_) => ColumnDataType::Short,
            RecordArray::Integer(_) => ColumnDataType::Integer,
            RecordArray::Long(_) => ColumnDataType::Long,
            RecordArray::Double(_) => ColumnDataType::Double,
            RecordArray::Utf8(_) => ColumnDataType::Utf8,
            RecordArray::Date32(_) => ColumnDataType::Date32,
            RecordArray::TimestampSecond(_) => ColumnDataType::TimestampSecond,
            RecordArray::TimestampNanosecond(_) => ColumnDataType::TimestampNanosecond,
        }
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len(), n => *n)
    }

    /// Returns true if the array holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the value at `index` is null or out of range.
    pub fn is_null(&self, index: usize) -> bool {
        dispatch!(self, v => v.get(index).map_or(true, Option::is_none), _n => true)
    }

    /// Returns the number of null values.
    pub fn null_count(&self) -> usize {
        dispatch!(self, v => v.iter().filter(|x| x.is_none()).count(), n => *n)
    }

    /// Returns the value at `index`, or a typed null when out of range.
    pub fn get(&self, index: usize) -> ScalarValue {
        match self {
            RecordArray::Null(_) => ScalarValue::Null,
            RecordArray::Boolean(v) => ScalarValue::Boolean(v.get(index).copied().flatten()),
            RecordArray::Byte(v) => {
                ScalarValue::Integer(v.get(index).copied().flatten().map(i64::from))
            }
            RecordArray::Short(v) => {
                ScalarValue::Integer(v.get(index).copied().flatten().map(i64::from))
            }
            RecordArray::Integer(v) => {
                ScalarValue::Integer(v.get(index).copied().flatten().map(i64::from))
            }
            RecordArray::Long(v) => ScalarValue::Integer(v.get(index).copied().flatten()),
            RecordArray::Double(v) => ScalarValue::Double(v.get(index).copied().flatten()),
            RecordArray::Utf8(v) => ScalarValue::Utf8(v.get(index).cloned().flatten()),
            RecordArray::Date32(v) => ScalarValue::Date32(v.get(index).copied().flatten()),
            RecordArray::TimestampSecond(v) => {
                ScalarValue::TimestampSecond(v.get(index).copied().flatten())
            }
            RecordArray::TimestampNanosecond(v) => {
                ScalarValue::TimestampNanosecond(v.get(index).copied().flatten())
            }
        }
    }

    /// Returns the display form of the value at `index`, or `None` for null.
    pub fn get_string_value(&self, index: usize) -> Option<String> {
        let value = self.get(index);
        (!value.is_null()).then(|| value.to_string())
    }

    /// Iterates over the values as scalars.
    pub fn iter(&self) -> impl Iterator<Item = ScalarValue> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Appends `size` nulls.
    pub fn fill_with_null(&mut self, size: usize) {
        dispatch!(self, v => v.extend(std::iter::repeat_with(|| None).take(size)), n => *n += size)
    }

    /// Appends a null.
    pub fn push_null(&mut self) {
        self.fill_with_null(1);
    }

    /// Appends a value, coercing it to the column type.
    pub fn push(&mut self, value: &ScalarValue) -> PushOutcome {
        match self {
            RecordArray::Null(n) => {
                if value.is_null() {
                    *n += 1;
                    PushOutcome::Stored
                } else {
                    PushOutcome::Overflow
                }
            }
            RecordArray::Boolean(v) => push_coerced(v, coerce_bool(value)),
            RecordArray::Byte(v) => push_integer(v, value, |x| u8::try_from(x).ok()),
            RecordArray::Short(v) => push_integer(v, value, |x| i16::try_from(x).ok()),
            RecordArray::Integer(v) => push_integer(v, value, |x| i32::try_from(x).ok()),
            RecordArray::Long(v) => push_integer(v, value, Some),
            RecordArray::Double(v) => push_coerced(v, coerce_double(value)),
            RecordArray::Utf8(v) => {
                v.push((!value.is_null()).then(|| value.to_string()));
                PushOutcome::Stored
            }
            RecordArray::Date32(v) => push_coerced(v, coerce_date(value)),
            RecordArray::TimestampSecond(v) => push_coerced(v, coerce_timestamp(value, false)),
            RecordArray::TimestampNanosecond(v) => {
                push_coerced(v, coerce_timestamp(value, true))
            }
        }
    }

    /// Appends a value, replacing this array with a wider one until the
    /// value fits. Never returns [`PushOutcome::Overflow`].
    pub fn push_widening(&mut self, value: &ScalarValue) -> ExecResult<PushOutcome> {
        loop {
            match self.push(value) {
                PushOutcome::Overflow => {
                    *self = self.promote_for(value).ok_or_else(|| {
                        ExecutionError::Internal(format!(
                            "cannot widen {} column to hold {}",
                            self.data_type(),
                            value
                        ))
                    })?;
                }
                outcome => return Ok(outcome),
            }
        }
    }

    /// Returns a copy of this integer array at the next wider width.
    pub fn promote(&self) -> Option<RecordArray> {
        Some(match self {
            RecordArray::Byte(v) => {
                RecordArray::Short(v.iter().map(|x| x.map(i16::from)).collect())
            }
            RecordArray::Short(v) => {
                RecordArray::Integer(v.iter().map(|x| x.map(i32::from)).collect())
            }
            RecordArray::Integer(v) => {
                RecordArray::Long(v.iter().map(|x| x.map(i64::from)).collect())
            }
            _ => return None,
        })
    }

    /// Like [`RecordArray::promote`], but also gives an all-null column the
    /// narrowest type that holds `value`.
    fn promote_for(&self, value: &ScalarValue) -> Option<RecordArray> {
        match self {
            RecordArray::Null(n) => {
                let data_type = match value {
                    ScalarValue::Integer(Some(v)) => ColumnDataType::narrowest_integer(*v),
                    other => other.data_type(),
                };
                Some(RecordArray::new_null(data_type, *n))
            }
            _ => self.promote(),
        }
    }

    /// Converts this array to another type. Values that cannot be
    /// represented in the target type become nulls.
    pub fn cast(&self, data_type: ColumnDataType) -> RecordArray {
        if self.data_type() == data_type {
            return self.clone();
        }
        if self.data_type().widens_to(data_type) {
            let mut widened = self.clone();
            while widened.data_type() != data_type {
                match widened.promote() {
                    Some(next) => widened = next,
                    None => break,
                }
            }
            return widened;
        }
        let mut array = RecordArray::new_empty(data_type, self.len());
        for value in self.iter() {
            if array.push(&value) == PushOutcome::Overflow {
                array.push_null();
            }
        }
        array
    }

    /// Keeps only the values whose mask entry is true.
    pub fn filter(&mut self, mask: &[bool]) {
        dispatch!(
            self,
            v => {
                let mut keep = mask.iter();
                v.retain(|_| keep.next().copied().unwrap_or(false));
            },
            n => *n = mask.iter().take(*n).filter(|keep| **keep).count()
        )
    }

    /// Gathers values by index. A `None` index produces a null.
    pub fn take(&self, indices: &[Option<usize>]) -> RecordArray {
        map_array!(
            self,
            v => indices
                .iter()
                .map(|i| i.and_then(|i| v.get(i).cloned().flatten()))
                .collect(),
            _n => indices.len()
        )
    }

    /// Returns `length` values starting at `offset`, clamped to the array.
    pub fn slice(&self, offset: usize, length: usize) -> RecordArray {
        map_array!(
            self,
            v => v.iter().skip(offset).take(length).cloned().collect(),
            n => (*n).saturating_sub(offset).min(length)
        )
    }

    /// Appends all values of `other`, which must have the same type.
    pub fn extend_from(&mut self, other: &RecordArray) -> ExecResult<()> {
        if let (RecordArray::Null(n), RecordArray::Null(m)) = (&mut *self, other) {
            *n += *m;
            return Ok(());
        }
        let (left_type, right_type) = (self.data_type(), other.data_type());
        zip_same!(
            self,
            other,
            a, b => {
                a.extend(b.iter().cloned());
                Ok(())
            },
            else Err(ExecutionError::Schema(format!(
                "cannot append {} values to a {} column",
                right_type, left_type
            )))
        )
    }

    /// Writes `values` into the positions where `mask` is true, in order.
    /// Positions where the mask is false keep their current values.
    pub fn scatter_into(&mut self, mask: &[bool], values: &RecordArray) -> ExecResult<()> {
        if let RecordArray::Null(_) = values {
            let keep: Vec<Option<usize>> = mask
                .iter()
                .enumerate()
                .map(|(i, masked)| (!masked).then_some(i))
                .collect();
            *self = self.take(&keep);
            return Ok(());
        }
        if let RecordArray::Null(n) = self {
            *self = RecordArray::new_null(values.data_type(), *n);
        }
        let (target_type, value_type) = (self.data_type(), values.data_type());
        zip_same!(
            self,
            values,
            target, source => {
                let mut source = source.iter();
                for (slot, keep) in target.iter_mut().zip(mask) {
                    if *keep {
                        if let Some(value) = source.next() {
                            *slot = value.clone();
                        }
                    }
                }
                Ok(())
            },
            else Err(ExecutionError::Type(format!(
                "cannot scatter {} values into a {} column",
                value_type, target_type
            )))
        )
    }

    /// Reinserts a dense array of `k` values into the `k` true positions of
    /// `mask`. Every other position is null.
    pub fn scatter(mask: &[bool], values: &RecordArray) -> ExecResult<RecordArray> {
        let mut target = RecordArray::new_null(values.data_type(), mask.len());
        target.scatter_into(mask, values)?;
        Ok(target)
    }

    /// Returns the boolean values, if this is a boolean (or all-null) array.
    pub fn as_boolean(&self) -> Option<Vec<Option<bool>>> {
        match self {
            RecordArray::Boolean(v) => Some(v.clone()),
            RecordArray::Null(n) => Some(vec![None; *n]),
            _ => None,
        }
    }

    /// Returns the values widened to `i64`, for integer arrays.
    pub fn to_i64_values(&self) -> Option<Vec<Option<i64>>> {
        match self {
            RecordArray::Byte(v) => Some(v.iter().map(|x| x.map(i64::from)).collect()),
            RecordArray::Short(v) => Some(v.iter().map(|x| x.map(i64::from)).collect()),
            RecordArray::Integer(v) => Some(v.iter().map(|x| x.map(i64::from)).collect()),
            RecordArray::Long(v) => Some(v.clone()),
            RecordArray::Null(n) => Some(vec![None; *n]),
            _ => None,
        }
    }

    /// Returns the values widened to `f64`, for numeric arrays.
    pub fn to_f64_values(&self) -> Option<Vec<Option<f64>>> {
        match self {
            RecordArray::Double(v) => Some(v.clone()),
            other => other
                .to_i64_values()
                .map(|v| v.into_iter().map(|x| x.map(|x| x as f64)).collect()),
        }
    }
}

enum Coerced<T> {
    Value(T),
    Null,
    Invalid,
}

fn push_coerced<T>(values: &mut Vec<Option<T>>, coerced: Coerced<T>) -> PushOutcome {
    match coerced {
        Coerced::Value(v) => {
            values.push(Some(v));
            PushOutcome::Stored
        }
        Coerced::Null => {
            values.push(None);
            PushOutcome::Stored
        }
        Coerced::Invalid => {
            values.push(None);
            PushOutcome::StoredNull
        }
    }
}

fn push_integer<T>(
    values: &mut Vec<Option<T>>,
    value: &ScalarValue,
    narrow: impl Fn(i64) -> Option<T>,
) -> PushOutcome {
    match coerce_integer(value) {
        Coerced::Value(v) => match narrow(v) {
            Some(n) => {
                values.push(Some(n));
                PushOutcome::Stored
            }
            None => PushOutcome::Overflow,
        },
        Coerced::Null => push_coerced(values, Coerced::Null),
        Coerced::Invalid => push_coerced(values, Coerced::Invalid),
    }
}

fn coerce_integer(value: &ScalarValue) -> Coerced<i64> {
    if value.is_null() {
        return Coerced::Null;
    }
    match value {
        ScalarValue::Integer(Some(v)) => Coerced::Value(*v),
        ScalarValue::Double(Some(f))
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
        {
            Coerced::Value(*f as i64)
        }
        ScalarValue::Boolean(Some(b)) => Coerced::Value(i64::from(*b)),
        ScalarValue::Utf8(Some(s)) => s.trim().parse().map_or(Coerced::Invalid, Coerced::Value),
        _ => Coerced::Invalid,
    }
}

fn coerce_double(value: &ScalarValue) -> Coerced<f64> {
    if value.is_null() {
        return Coerced::Null;
    }
    match value {
        ScalarValue::Utf8(Some(s)) => s.trim().parse().map_or(Coerced::Invalid, Coerced::Value),
        other => other.as_f64().map_or(Coerced::Invalid, Coerced::Value),
    }
}

fn coerce_bool(value: &ScalarValue) -> Coerced<bool> {
    if value.is_null() {
        return Coerced::Null;
    }
    match value {
        ScalarValue::Boolean(Some(b)) => Coerced::Value(*b),
        ScalarValue::Integer(Some(i)) => Coerced::Value(*i != 0),
        ScalarValue::Utf8(Some(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Coerced::Value(true),
            "false" | "f" | "no" | "0" => Coerced::Value(false),
            _ => Coerced::Invalid,
        },
        _ => Coerced::Invalid,
    }
}

fn coerce_date(value: &ScalarValue) -> Coerced<i32> {
    if value.is_null() {
        return Coerced::Null;
    }
    match value {
        ScalarValue::Date32(Some(d)) => Coerced::Value(*d),
        ScalarValue::Integer(Some(i)) => i32::try_from(*i).map_or(Coerced::Invalid, Coerced::Value),
        ScalarValue::Utf8(Some(s)) => {
            ScalarValue::parse_date32(s).map_or(Coerced::Invalid, Coerced::Value)
        }
        _ => Coerced::Invalid,
    }
}

fn coerce_timestamp(value: &ScalarValue, nanos: bool) -> Coerced<i64> {
    const NANOS: i64 = 1_000_000_000;
    if value.is_null() {
        return Coerced::Null;
    }
    let from_nanos = |n: i64| if nanos { n } else { n.div_euclid(NANOS) };
    let from_seconds = |s: i64| if nanos { s.saturating_mul(NANOS) } else { s };
    match value {
        ScalarValue::TimestampSecond(Some(s)) => Coerced::Value(from_seconds(*s)),
        ScalarValue::TimestampNanosecond(Some(n)) => Coerced::Value(from_nanos(*n)),
        ScalarValue::Date32(Some(d)) => Coerced::Value(from_seconds(i64::from(*d) * 86_400)),
        ScalarValue::Integer(Some(i)) => Coerced::Value(*i),
        ScalarValue::Utf8(Some(s)) => ScalarValue::parse_timestamp_nanos(s)
            .map_or(Coerced::Invalid, |n| Coerced::Value(from_nanos(n))),
        _ => Coerced::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_coerces_strings() {
        let mut array = RecordArray::new_empty(ColumnDataType::Long, 4);
        assert_eq!(array.push(&ScalarValue::from("42")), PushOutcome::Stored);
        assert_eq!(array.push(&ScalarValue::from("forty")), PushOutcome::StoredNull);
        assert_eq!(array.push(&ScalarValue::Null), PushOutcome::Stored);
        assert_eq!(array.len(), 3);
        assert_eq!(array.get(0), ScalarValue::Integer(Some(42)));
        assert!(array.is_null(1));
        assert_eq!(array.null_count(), 2);
    }

    #[test]
    fn test_push_overflow_stores_nothing() {
        let mut array = RecordArray::new_empty(ColumnDataType::Byte, 2);
        assert_eq!(array.push(&ScalarValue::from(7i64)), PushOutcome::Stored);
        assert_eq!(array.push(&ScalarValue::from(300i64)), PushOutcome::Overflow);
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn test_push_widening_preserves_values() {
        let mut array = RecordArray::new_empty(ColumnDataType::Byte, 3);
        array.push_widening(&ScalarValue::from(1i64)).unwrap();
        assert_eq!(array.data_type(), ColumnDataType::Byte);
        array.push_widening(&ScalarValue::from(300i64)).unwrap();
        assert_eq!(array.data_type(), ColumnDataType::Short);
        let outcome = array.push_widening(&ScalarValue::from(5_000_000_000i64)).unwrap();
        assert_eq!(outcome, PushOutcome::Stored);
        assert_eq!(array.data_type(), ColumnDataType::Long);
        let values: Vec<_> = array.iter().collect();
        assert_eq!(
            values,
            vec![
                ScalarValue::from(1i64),
                ScalarValue::from(300i64),
                ScalarValue::from(5_000_000_000i64)
            ]
        );
    }

    #[test]
    fn test_null_array_takes_type_of_first_value() {
        let mut array = RecordArray::new_null(ColumnDataType::Null, 2);
        array.push_widening(&ScalarValue::from("x")).unwrap();
        assert_eq!(array.data_type(), ColumnDataType::Utf8);
        assert_eq!(array.len(), 3);
        assert_eq!(array.get_string_value(2), Some("x".to_string()));
        assert_eq!(array.get_string_value(0), None);
    }

    #[test]
    fn test_filter_in_place() {
        let mut array = RecordArray::Long(vec![Some(1), Some(2), None, Some(4)]);
        array.filter(&[true, false, true, true]);
        assert_eq!(array, RecordArray::Long(vec![Some(1), None, Some(4)]));

        let mut nulls = RecordArray::Null(3);
        nulls.filter(&[true, false, true]);
        assert_eq!(nulls.len(), 2);
    }

    #[test]
    fn test_take_and_slice() {
        let array = RecordArray::Utf8(vec![Some("a".into()), Some("b".into()), None]);
        let taken = array.take(&[Some(1), None, Some(0)]);
        assert_eq!(
            taken,
            RecordArray::Utf8(vec![Some("b".into()), None, Some("a".into())])
        );
        assert_eq!(array.slice(1, 5).len(), 2);
        assert_eq!(array.slice(5, 1).len(), 0);
    }

    #[test]
    fn test_scatter_gather_round_trip() {
        let original = RecordArray::Long(vec![Some(10), Some(20), Some(30), Some(40)]);
        let mask = [false, true, false, true];

        let mut dense = original.clone();
        dense.filter(&mask);
        assert_eq!(dense, RecordArray::Long(vec![Some(20), Some(40)]));

        let scattered = RecordArray::scatter(&mask, &dense).unwrap();
        assert_eq!(scattered, RecordArray::Long(vec![None, Some(20), None, Some(40)]));

        let mut prior = RecordArray::Long(vec![Some(1), Some(2), Some(3), Some(4)]);
        prior.scatter_into(&mask, &dense).unwrap();
        assert_eq!(prior, RecordArray::Long(vec![Some(1), Some(20), Some(3), Some(40)]));
    }

    #[test]
    fn test_scatter_type_mismatch() {
        let mut target = RecordArray::Long(vec![None, None]);
        let values = RecordArray::Utf8(vec![Some("a".into())]);
        assert!(target.scatter_into(&[true, false], &values).is_err());
    }

    #[test]
    fn test_cast() {
        let array = RecordArray::Byte(vec![Some(1), None]);
        assert_eq!(array.cast(ColumnDataType::Long), RecordArray::Long(vec![Some(1), None]));

        let strings = RecordArray::Utf8(vec![Some("1.5".into()), Some("x".into())]);
        assert_eq!(
            strings.cast(ColumnDataType::Double),
            RecordArray::Double(vec![Some(1.5), None])
        );

        let wide = RecordArray::Long(vec![Some(1_000)]);
        assert_eq!(wide.cast(ColumnDataType::Byte), RecordArray::Byte(vec![None]));
    }

    #[test]
    fn test_extend_requires_same_type() {
        let mut array = RecordArray::Long(vec![Some(1)]);
        array.extend_from(&RecordArray::Long(vec![Some(2)])).unwrap();
        assert_eq!(array.len(), 2);
        assert!(array.extend_from(&RecordArray::Double(vec![Some(1.0)])).is_err());
    }
}
