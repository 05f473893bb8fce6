//! Columnar data model.
//!
//! This module defines the values that flow through query execution:
//!
//! - [`ColumnDataType`]: the logical column types, including the integer
//!   upcast chain
//! - [`Schema`] and [`QualifiedField`]: ordered, optionally qualified fields
//! - [`ScalarValue`]: a single nullable value
//! - [`RecordArray`]: a typed, nullable column
//! - [`RecordBatch`]: a schema plus parallel columns
//! - [`ColumnValue`]: the result of evaluating an expression over a batch

mod array;
mod batch;
mod column_value;
mod scalar;
mod schema;
mod types;

pub use array::{PushOutcome, RecordArray};
pub use batch::{schema_of, RecordBatch, Repartition};
pub use column_value::ColumnValue;
pub use scalar::{KeyValue, ScalarValue};
pub use schema::{Column, QualifiedField, Schema, SchemaRef, TableReference};
pub use types::ColumnDataType;
