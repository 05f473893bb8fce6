//! Empty relation.

use futures::stream;

use super::BatchStream;
use crate::data::{RecordArray, RecordBatch, SchemaRef};

/// Produces no rows, or one row of nulls (`SELECT` without `FROM`, where
/// the schema has no columns).
#[derive(Debug, Clone)]
pub struct EmptyExec {
    /// Produce a single row.
    pub produce_one_row: bool,
    /// Output schema.
    pub schema: SchemaRef,
}

impl EmptyExec {
    /// Creates an empty relation.
    pub fn new(produce_one_row: bool, schema: SchemaRef) -> Self {
        Self {
            produce_one_row,
            schema,
        }
    }

    pub(super) fn execute(&self) -> BatchStream {
        if !self.produce_one_row {
            return Box::pin(stream::empty());
        }
        let columns = self
            .schema
            .fields()
            .iter()
            .map(|f| RecordArray::new_null(f.data_type, 1))
            .collect();
        let batch = RecordBatch::with_row_count(self.schema.clone(), columns, 1);
        Box::pin(stream::once(async move { batch }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::data::Schema;
    use crate::execution::{collect, ExecutionPlan};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_one_row_without_columns() {
        let schema = Arc::new(Schema::empty());
        let plan = ExecutionPlan::Empty(EmptyExec::new(true, schema.clone()));
        let batches = collect(&plan, &QueryContext::default()).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 1);
        assert_eq!(batches[0].num_columns(), 0);

        let plan = ExecutionPlan::Empty(EmptyExec::new(false, schema));
        assert!(collect(&plan, &QueryContext::default()).await.unwrap().is_empty());
    }
}
