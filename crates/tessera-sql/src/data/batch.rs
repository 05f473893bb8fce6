//! Record batches.
//!
//! A [`RecordBatch`] is a horizontal slice of a table: a schema plus one
//! [`RecordArray`] per field, all of the same length. The row count is
//! stored explicitly so that batches without columns (for example the
//! input of `COUNT(*)` after projection pushdown) still carry rows.
//!
//! # Upcasting
//!
//! Values are added through [`RecordBatch::add_value`]. When an integer
//! value does not fit the column's current width the column is replaced by
//! the next wider array and the schema field type is updated to match, so a
//! column's width is always the narrowest one that holds every value added
//! so far.

use std::fmt;
use std::sync::Arc;

use super::array::{PushOutcome, RecordArray};
use super::scalar::ScalarValue;
use super::schema::{Schema, SchemaRef};
use crate::error::{ExecResult, ExecutionError};

/// A batch of rows stored column-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    schema: SchemaRef,
    columns: Vec<RecordArray>,
    num_rows: usize,
}

impl RecordBatch {
    /// Creates a batch from columns. Every column must have the same length
    /// and there must be one column per schema field. Schema field types
    /// are updated to the concrete column types.
    pub fn new(schema: SchemaRef, columns: Vec<RecordArray>) -> ExecResult<Self> {
        let num_rows = columns.first().map_or(0, RecordArray::len);
        Self::with_row_count(schema, columns, num_rows)
    }

    /// Creates a batch with an explicit row count, which is required when
    /// there are no columns.
    pub fn with_row_count(
        mut schema: SchemaRef,
        columns: Vec<RecordArray>,
        num_rows: usize,
    ) -> ExecResult<Self> {
        if columns.len() != schema.len() {
            return Err(ExecutionError::Schema(format!(
                "column count {} doesn't match schema field count {}",
                columns.len(),
                schema.len()
            )));
        }
        for (i, column) in columns.iter().enumerate() {
            if column.len() != num_rows {
                return Err(ExecutionError::Schema(format!(
                    "column {} has {} rows, expected {}",
                    i,
                    column.len(),
                    num_rows
                )));
            }
            let data_type = column.data_type();
            if schema.fields()[i].data_type != data_type
                && data_type != crate::data::ColumnDataType::Null
            {
                Arc::make_mut(&mut schema).set_data_type(i, data_type);
            }
        }
        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    /// Creates an empty batch.
    pub fn empty(schema: SchemaRef) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| RecordArray::new_empty(f.data_type, 0))
            .collect();
        Self {
            schema,
            columns,
            num_rows: 0,
        }
    }

    /// Creates a batch from rows of scalars.
    pub fn from_rows<R: AsRef<[ScalarValue]>>(
        schema: SchemaRef,
        rows: impl IntoIterator<Item = R>,
    ) -> ExecResult<Self> {
        let mut batch = Self::empty(schema);
        for row in rows {
            batch.push_row(row.as_ref())?;
        }
        Ok(batch)
    }

    /// Returns the schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns the number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Returns the number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Returns the column at `index`.
    pub fn column(&self, index: usize) -> Option<&RecordArray> {
        self.columns.get(index)
    }

    /// Returns all columns.
    pub fn columns(&self) -> &[RecordArray] {
        &self.columns
    }

    /// Returns the value at (`row`, `column`).
    pub fn value(&self, row: usize, column: usize) -> ScalarValue {
        self.columns
            .get(column)
            .map_or(ScalarValue::Null, |c| c.get(row))
    }

    /// Returns one row as scalars.
    pub fn row(&self, index: usize) -> Vec<ScalarValue> {
        self.columns.iter().map(|c| c.get(index)).collect()
    }

    /// Appends a value to one column, widening the column if needed.
    ///
    /// The row becomes visible once every column has received its value;
    /// [`RecordBatch::push_row`] does this for a whole row.
    pub fn add_value(&mut self, column: usize, value: &ScalarValue) -> ExecResult<PushOutcome> {
        let array = self.columns.get_mut(column).ok_or_else(|| {
            ExecutionError::Schema(format!("column index {} out of range", column))
        })?;
        let before = array.data_type();
        let outcome = array.push_widening(value)?;
        let after = array.data_type();
        if before != after {
            Arc::make_mut(&mut self.schema).set_data_type(column, after);
        }
        self.num_rows = self
            .columns
            .iter()
            .map(RecordArray::len)
            .min()
            .unwrap_or(self.num_rows);
        Ok(outcome)
    }

    /// Appends a row. Unparseable values are stored as nulls.
    pub fn push_row(&mut self, row: &[ScalarValue]) -> ExecResult<()> {
        if row.len() != self.columns.len() {
            return Err(ExecutionError::Schema(format!(
                "row has {} values, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        if self.columns.is_empty() {
            self.num_rows += 1;
            return Ok(());
        }
        for (i, value) in row.iter().enumerate() {
            self.add_value(i, value)?;
        }
        Ok(())
    }

    /// Keeps only the rows whose mask entry is true, in place.
    pub fn filter(&mut self, mask: &[bool]) -> ExecResult<()> {
        if mask.len() != self.num_rows {
            return Err(ExecutionError::Schema(format!(
                "filter mask length {} doesn't match row count {}",
                mask.len(),
                self.num_rows
            )));
        }
        for column in &mut self.columns {
            column.filter(mask);
        }
        self.num_rows = mask.iter().filter(|keep| **keep).count();
        Ok(())
    }

    /// Returns a filtered copy of this batch.
    pub fn filtered(&self, mask: &[bool]) -> ExecResult<RecordBatch> {
        let mut batch = self.clone();
        batch.filter(mask)?;
        Ok(batch)
    }

    /// Returns a batch with only the columns at `indices`.
    pub fn project(&self, indices: &[usize]) -> ExecResult<RecordBatch> {
        let schema = self.schema.project(indices).ok_or_else(|| {
            ExecutionError::Schema(format!("invalid projection {:?}", indices))
        })?;
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        Ok(Self {
            schema: Arc::new(schema),
            columns,
            num_rows: self.num_rows,
        })
    }

    /// Returns a batch with columns in `new_order`, skipping any index
    /// listed in `excluded`.
    pub fn reorder(&self, new_order: &[usize], excluded: &[usize]) -> ExecResult<RecordBatch> {
        let indices: Vec<usize> = new_order
            .iter()
            .copied()
            .filter(|i| !excluded.contains(i))
            .collect();
        self.project(&indices)
    }

    /// Returns `length` rows starting at `offset`, clamped to the batch.
    pub fn slice(&self, offset: usize, length: usize) -> RecordBatch {
        let num_rows = self.num_rows.saturating_sub(offset).min(length);
        Self {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.slice(offset, length)).collect(),
            num_rows,
        }
    }

    /// Gathers rows by index. A `None` index produces a row of nulls.
    pub fn take(&self, indices: &[Option<usize>]) -> RecordBatch {
        Self {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            num_rows: indices.len(),
        }
    }

    /// Returns the batch under a different schema with the same number of
    /// fields, used to rename or requalify columns.
    pub fn with_schema(self, schema: SchemaRef) -> ExecResult<RecordBatch> {
        Self::with_row_count(schema, self.columns, self.num_rows)
    }

    /// Appends the rows of `other`. The schemas must have the same field
    /// names; integer columns of different widths are widened to match.
    pub fn concat(&mut self, other: &RecordBatch) -> ExecResult<()> {
        if self.schema.len() != other.schema.len()
            || self
                .schema
                .fields()
                .iter()
                .zip(other.schema.fields())
                .any(|(a, b)| a.name != b.name)
        {
            return Err(ExecutionError::Schema(format!(
                "cannot concatenate batches with schemas {} and {}",
                self.schema, other.schema
            )));
        }
        for (i, (column, incoming)) in self.columns.iter_mut().zip(&other.columns).enumerate() {
            let (mine, theirs) = (column.data_type(), incoming.data_type());
            if mine == theirs {
                column.extend_from(incoming)?;
                continue;
            }
            let common = mine.common_with(&theirs).ok_or_else(|| {
                ExecutionError::Type(format!(
                    "cannot concatenate {} and {} columns",
                    mine, theirs
                ))
            })?;
            if mine != common {
                *column = column.cast(common);
                Arc::make_mut(&mut self.schema).set_data_type(i, common);
            }
            column.extend_from(&incoming.cast(common))?;
        }
        self.num_rows += other.num_rows;
        Ok(())
    }

    /// Concatenates batches into one.
    pub fn concat_all(schema: SchemaRef, batches: &[RecordBatch]) -> ExecResult<RecordBatch> {
        let mut iter = batches.iter();
        let mut result = match iter.next() {
            Some(first) => first.clone(),
            None => return Ok(Self::empty(schema)),
        };
        for batch in iter {
            result.concat(batch)?;
        }
        Ok(result)
    }

    /// Splits the batch into batches of at most `batch_size` rows. The last
    /// batch holds the remainder.
    pub fn repartition(self, batch_size: usize) -> Repartition {
        Repartition {
            batch: self,
            batch_size: batch_size.max(1),
            offset: 0,
        }
    }
}

/// Iterator returned by [`RecordBatch::repartition`].
#[derive(Debug)]
pub struct Repartition {
    batch: RecordBatch,
    batch_size: usize,
    offset: usize,
}

impl Iterator for Repartition {
    type Item = RecordBatch;

    fn next(&mut self) -> Option<RecordBatch> {
        if self.offset >= self.batch.num_rows() {
            return None;
        }
        let slice = self.batch.slice(self.offset, self.batch_size);
        self.offset += self.batch_size;
        Some(slice)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .batch
            .num_rows()
            .saturating_sub(self.offset)
            .div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl fmt::Display for RecordBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "RecordBatch ({} rows x {} cols)",
            self.num_rows,
            self.num_columns()
        )?;

        let names: Vec<_> = self.schema.fields().iter().map(|f| f.name.as_str()).collect();
        writeln!(f, "{}", names.join(" | "))?;
        writeln!(
            f,
            "{}",
            "-".repeat(names.iter().map(|n| n.len() + 3).sum::<usize>())
        )?;

        let display_rows = self.num_rows.min(10);
        for i in 0..display_rows {
            let values: Vec<_> = self.columns.iter().map(|c| c.get(i).to_string()).collect();
            writeln!(f, "{}", values.join(" | "))?;
        }
        if self.num_rows > 10 {
            writeln!(f, "... ({} more rows)", self.num_rows - 10)?;
        }
        Ok(())
    }
}

/// Builds a schema reference from `(name, type)` pairs.
pub fn schema_of(fields: &[(&str, crate::data::ColumnDataType)]) -> SchemaRef {
    Arc::new(Schema::new(
        fields
            .iter()
            .map(|(name, data_type)| crate::data::QualifiedField::new(*name, *data_type))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColumnDataType;

    fn numbers(n: i64) -> RecordBatch {
        let schema = schema_of(&[("n", ColumnDataType::Long), ("label", ColumnDataType::Utf8)]);
        RecordBatch::from_rows(
            schema,
            (0..n).map(|i| vec![ScalarValue::from(i), ScalarValue::from(format!("row{i}"))]),
        )
        .unwrap()
    }

    #[test]
    fn test_numeric_upcast_monotonic() {
        let schema = schema_of(&[("v", ColumnDataType::Byte)]);
        let mut batch = RecordBatch::empty(schema);

        batch.push_row(&[ScalarValue::from(1i64)]).unwrap();
        assert_eq!(batch.schema().fields()[0].data_type, ColumnDataType::Byte);

        batch.push_row(&[ScalarValue::from(300i64)]).unwrap();
        assert_eq!(batch.schema().fields()[0].data_type, ColumnDataType::Short);

        batch.push_row(&[ScalarValue::from(5_000_000_000i64)]).unwrap();
        assert_eq!(batch.schema().fields()[0].data_type, ColumnDataType::Long);
        assert_eq!(batch.column(0).unwrap().data_type(), ColumnDataType::Long);

        batch.push_row(&[ScalarValue::from(2i64)]).unwrap();
        assert_eq!(batch.column(0).unwrap().data_type(), ColumnDataType::Long);

        let values: Vec<_> = batch.column(0).unwrap().iter().collect();
        assert_eq!(
            values,
            vec![
                ScalarValue::from(1i64),
                ScalarValue::from(300i64),
                ScalarValue::from(5_000_000_000i64),
                ScalarValue::from(2i64),
            ]
        );
    }

    #[test]
    fn test_unparseable_value_becomes_null() {
        let schema = schema_of(&[("v", ColumnDataType::Double)]);
        let mut batch = RecordBatch::empty(schema);
        let outcome = batch.add_value(0, &ScalarValue::from("abc")).unwrap();
        assert_eq!(outcome, PushOutcome::StoredNull);
        assert_eq!(batch.num_rows(), 1);
        assert!(batch.value(0, 0).is_null());
    }

    #[test]
    fn test_filter_all_true_is_noop() {
        let original = numbers(5);
        let mut batch = original.clone();
        batch.filter(&[true; 5]).unwrap();
        assert_eq!(batch, original);
    }

    #[test]
    fn test_filter_composition() {
        let original = numbers(6);
        let m1 = [true, false, true, true, false, true];
        let m2 = [false, true, true, false];

        let mut twice = original.clone();
        twice.filter(&m1).unwrap();
        twice.filter(&m2).unwrap();

        let composed = [false, false, true, true, false, false];
        let mut once = original.clone();
        once.filter(&composed).unwrap();

        assert_eq!(twice, once);
        assert_eq!(once.num_rows(), 2);
        assert_eq!(once.value(0, 0), ScalarValue::from(2i64));
    }

    #[test]
    fn test_filter_mask_length_checked() {
        let mut batch = numbers(3);
        assert!(batch.filter(&[true]).is_err());
    }

    #[test]
    fn test_repartition_row_conservation() {
        let batch = numbers(10);
        let parts: Vec<_> = batch.clone().repartition(3).collect();
        let sizes: Vec<_> = parts.iter().map(RecordBatch::num_rows).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);

        let rejoined = RecordBatch::concat_all(batch.schema().clone(), &parts).unwrap();
        assert_eq!(rejoined, batch);
    }

    #[test]
    fn test_repartition_empty() {
        let batch = numbers(0);
        assert_eq!(batch.repartition(3).count(), 0);
    }

    #[test]
    fn test_project_and_reorder() {
        let batch = numbers(2);
        let projected = batch.project(&[1]).unwrap();
        assert_eq!(projected.schema().field_names(), vec!["label"]);
        assert_eq!(projected.num_rows(), 2);

        let reordered = batch.reorder(&[1, 0], &[0]).unwrap();
        assert_eq!(reordered.schema().field_names(), vec!["label"]);
        assert!(batch.project(&[5]).is_err());
    }

    #[test]
    fn test_concat_widens_integers() {
        let schema = schema_of(&[("v", ColumnDataType::Byte)]);
        let mut small = RecordBatch::from_rows(schema.clone(), [[ScalarValue::from(1i64)]]).unwrap();
        let large = RecordBatch::from_rows(schema, [[ScalarValue::from(70_000i64)]]).unwrap();
        assert_eq!(large.column(0).unwrap().data_type(), ColumnDataType::Integer);

        small.concat(&large).unwrap();
        assert_eq!(small.num_rows(), 2);
        assert_eq!(small.schema().fields()[0].data_type, ColumnDataType::Integer);
        assert_eq!(small.value(1, 0), ScalarValue::from(70_000i64));
    }

    #[test]
    fn test_zero_column_batch_keeps_rows() {
        let mut batch = RecordBatch::empty(Arc::new(Schema::empty()));
        batch.push_row(&[]).unwrap();
        batch.push_row(&[]).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.slice(1, 5).num_rows(), 1);
    }

    #[test]
    fn test_clone_is_deep() {
        let original = numbers(3);
        let mut copy = original.clone();
        copy.filter(&[false, false, true]).unwrap();
        assert_eq!(original.num_rows(), 3);
        assert_eq!(copy.num_rows(), 1);
    }
}
