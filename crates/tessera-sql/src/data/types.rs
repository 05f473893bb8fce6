//! Column data types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The logical type of a column.
///
/// The four integer types form the upcast chain
/// `Byte -> Short -> Integer -> Long`: an integer column starts at the
/// narrowest width that holds its first value and is widened as larger
/// values arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnDataType {
    /// Untyped column; every value is null.
    Null,
    /// Boolean.
    Boolean,
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Short,
    /// Signed 32-bit integer.
    Integer,
    /// Signed 64-bit integer.
    Long,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    Utf8,
    /// Days since the Unix epoch.
    Date32,
    /// Seconds since the Unix epoch.
    TimestampSecond,
    /// Nanoseconds since the Unix epoch.
    TimestampNanosecond,
}

impl ColumnDataType {
    /// Returns true for the integer types and `Double`.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, ColumnDataType::Double)
    }

    /// Returns true for the integer upcast chain.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnDataType::Byte
                | ColumnDataType::Short
                | ColumnDataType::Integer
                | ColumnDataType::Long
        )
    }

    /// Returns true for the date and timestamp types.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnDataType::Date32
                | ColumnDataType::TimestampSecond
                | ColumnDataType::TimestampNanosecond
        )
    }

    /// Returns the next type in the integer upcast chain.
    fn wider_integer(&self) -> Option<ColumnDataType> {
        match self {
            ColumnDataType::Byte => Some(ColumnDataType::Short),
            ColumnDataType::Short => Some(ColumnDataType::Integer),
            ColumnDataType::Integer => Some(ColumnDataType::Long),
            _ => None,
        }
    }

    /// Returns true if `target` lies strictly above this type on the integer
    /// upcast chain.
    pub(crate) fn widens_to(&self, target: ColumnDataType) -> bool {
        let mut current = *self;
        while let Some(next) = current.wider_integer() {
            if next == target {
                return true;
            }
            current = next;
        }
        false
    }

    /// Returns the narrowest integer type that represents `value` exactly.
    pub fn narrowest_integer(value: i64) -> ColumnDataType {
        if u8::try_from(value).is_ok() {
            ColumnDataType::Byte
        } else if i16::try_from(value).is_ok() {
            ColumnDataType::Short
        } else if i32::try_from(value).is_ok() {
            ColumnDataType::Integer
        } else {
            ColumnDataType::Long
        }
    }

    /// Returns the common type two columns are reconciled to when their rows
    /// are combined (concatenation, union, CASE branches).
    pub fn common_with(&self, other: &ColumnDataType) -> Option<ColumnDataType> {
        use ColumnDataType::*;
        if self == other {
            return Some(*self);
        }
        match (self, other) {
            (Null, t) | (t, Null) => Some(*t),
            (a, b) if a.is_integer() && b.is_integer() => {
                Some(if a.integer_rank() >= b.integer_rank() { *a } else { *b })
            }
            (a, b) if a.is_numeric() && b.is_numeric() => Some(Double),
            (Utf8, _) | (_, Utf8) => Some(Utf8),
            _ => None,
        }
    }

    /// Returns the type produced by arithmetic between two operand types.
    pub fn arithmetic_result(&self, other: &ColumnDataType) -> Option<ColumnDataType> {
        use ColumnDataType::*;
        match (self, other) {
            (Null, Double) | (Double, Null) => Some(Double),
            (Null, t) | (t, Null) if t.is_integer() || *t == Null => Some(Long),
            (a, b) if a.is_integer() && b.is_integer() => Some(Long),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(Double),
            _ => None,
        }
    }

    fn integer_rank(&self) -> u8 {
        match self {
            ColumnDataType::Byte => 0,
            ColumnDataType::Short => 1,
            ColumnDataType::Integer => 2,
            _ => 3,
        }
    }

    /// Maps a SQL type name from the parser's AST.
    pub fn from_sql(data_type: &sqlparser::ast::DataType) -> Option<ColumnDataType> {
        use sqlparser::ast::DataType as SqlType;
        Some(match data_type {
            SqlType::Boolean => ColumnDataType::Boolean,
            SqlType::TinyInt(_) | SqlType::UnsignedTinyInt(_) => ColumnDataType::Byte,
            SqlType::SmallInt(_) => ColumnDataType::Short,
            SqlType::Int(_) | SqlType::Integer(_) => ColumnDataType::Integer,
            SqlType::BigInt(_) => ColumnDataType::Long,
            SqlType::Float(_)
            | SqlType::Real
            | SqlType::Double
            | SqlType::DoublePrecision
            | SqlType::Decimal(_)
            | SqlType::Numeric(_) => ColumnDataType::Double,
            SqlType::Char(_)
            | SqlType::Varchar(_)
            | SqlType::CharacterVarying(_)
            | SqlType::Text => ColumnDataType::Utf8,
            SqlType::Date => ColumnDataType::Date32,
            SqlType::Timestamp(_, _) | SqlType::Datetime(_) => ColumnDataType::TimestampSecond,
            _ => return None,
        })
    }
}

impl fmt::Display for ColumnDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnDataType::Null => "Null",
            ColumnDataType::Boolean => "Boolean",
            ColumnDataType::Byte => "Byte",
            ColumnDataType::Short => "Short",
            ColumnDataType::Integer => "Integer",
            ColumnDataType::Long => "Long",
            ColumnDataType::Double => "Double",
            ColumnDataType::Utf8 => "Utf8",
            ColumnDataType::Date32 => "Date32",
            ColumnDataType::TimestampSecond => "TimestampSecond",
            ColumnDataType::TimestampNanosecond => "TimestampNanosecond",
        };
        write!(f, "{}", name)
    }
}
