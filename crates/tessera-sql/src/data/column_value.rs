//! Results of physical expression evaluation.

use super::array::RecordArray;
use super::scalar::ScalarValue;
use super::types::ColumnDataType;

/// The value of an expression over a batch: either one value per row or a
/// single value standing for every row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// One value per row.
    Array(RecordArray),
    /// One value broadcast to `len` rows.
    Scalar {
        /// The broadcast value.
        value: ScalarValue,
        /// Number of rows it stands for.
        len: usize,
    },
}

impl ColumnValue {
    /// Creates a scalar column value.
    pub fn scalar(value: ScalarValue, len: usize) -> Self {
        ColumnValue::Scalar { value, len }
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        match self {
            ColumnValue::Array(array) => array.len(),
            ColumnValue::Scalar { len, .. } => *len,
        }
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the data type of the values.
    pub fn data_type(&self) -> ColumnDataType {
        match self {
            ColumnValue::Array(array) => array.data_type(),
            ColumnValue::Scalar { value, .. } => value.data_type(),
        }
    }

    /// Returns the value for row `index`.
    pub fn get(&self, index: usize) -> ScalarValue {
        match self {
            ColumnValue::Array(array) => array.get(index),
            ColumnValue::Scalar { value, .. } => value.clone(),
        }
    }

    /// Returns an array view of `size` rows, expanding a scalar.
    pub fn to_array(&self, size: usize) -> RecordArray {
        match self {
            ColumnValue::Array(array) => array.clone(),
            ColumnValue::Scalar { value, .. } => RecordArray::from_scalar(value, size),
        }
    }

    /// Consumes the value, returning an array of `len()` rows.
    pub fn into_array(self) -> RecordArray {
        match self {
            ColumnValue::Array(array) => array,
            ColumnValue::Scalar { value, len } => RecordArray::from_scalar(&value, len),
        }
    }

    /// Returns the value as a boolean mask where null counts as false.
    pub fn to_mask(&self) -> Option<Vec<bool>> {
        match self {
            ColumnValue::Array(array) => array
                .as_boolean()
                .map(|values| values.into_iter().map(|v| v.unwrap_or(false)).collect()),
            ColumnValue::Scalar { value, len } => match value {
                ScalarValue::Boolean(v) => Some(vec![v.unwrap_or(false); *len]),
                ScalarValue::Null => Some(vec![false; *len]),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_to_array() {
        let value = ColumnValue::scalar(ScalarValue::from(7i64), 3);
        assert_eq!(value.len(), 3);
        assert_eq!(
            value.to_array(3),
            RecordArray::Long(vec![Some(7), Some(7), Some(7)])
        );
        assert_eq!(value.get(2), ScalarValue::from(7i64));
    }

    #[test]
    fn test_to_mask_treats_null_as_false() {
        let value = ColumnValue::Array(RecordArray::Boolean(vec![Some(true), None, Some(false)]));
        assert_eq!(value.to_mask(), Some(vec![true, false, false]));

        let not_boolean = ColumnValue::scalar(ScalarValue::from(1i64), 2);
        assert_eq!(not_boolean.to_mask(), None);
    }
}
