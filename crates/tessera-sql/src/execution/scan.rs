//! Table scan.

use std::sync::Arc;

use futures::StreamExt;

use super::BatchStream;
use crate::context::QueryContext;
use crate::data::{RecordBatch, SchemaRef};
use crate::datasource::DataSource;
use crate::error::{ExecResult, ExecutionError};

/// Reads rows from a [`DataSource`] and packs them into batches of at most
/// `batch_size` rows.
#[derive(Debug, Clone)]
pub struct ScanExec {
    /// Registered table name.
    pub table_name: String,
    /// Row source.
    pub source: Arc<dyn DataSource>,
    /// Schema of the rows the source produces.
    pub source_schema: SchemaRef,
    /// Source columns kept (None = all).
    pub projection: Option<Vec<usize>>,
    /// Output schema.
    pub schema: SchemaRef,
}

impl ScanExec {
    /// Creates a scan over every column.
    pub fn new(
        table_name: impl Into<String>,
        source: Arc<dyn DataSource>,
        source_schema: SchemaRef,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            source,
            schema: source_schema.clone(),
            source_schema,
            projection: None,
        }
    }

    /// Keeps only the source columns at `indices`.
    pub fn with_projection(mut self, indices: Vec<usize>) -> ExecResult<Self> {
        let projected = self.source_schema.project(&indices).ok_or_else(|| {
            ExecutionError::Plan(format!(
                "scan projection {:?} out of range for {}",
                indices, self.table_name
            ))
        })?;
        self.schema = Arc::new(projected);
        self.projection = Some(indices);
        Ok(self)
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> BatchStream {
        let scan = self.clone();
        let ctx = ctx.clone();
        Box::pin(async_stream::try_stream! {
            ctx.check_cancelled()?;
            let mut rows = scan
                .source
                .read_source(&ctx, ctx.cancellation_token().clone())
                .await?;
            let mut batch = RecordBatch::empty(scan.source_schema.clone());
            while let Some(row) = rows.next().await {
                batch.push_row(&row?)?;
                if batch.num_rows() >= ctx.batch_size {
                    let full = std::mem::replace(
                        &mut batch,
                        RecordBatch::empty(scan.source_schema.clone()),
                    );
                    yield scan.project(full)?;
                    ctx.check_cancelled()?;
                }
            }
            if batch.num_rows() > 0 {
                yield scan.project(batch)?;
            }
            tracing::trace!(table = %scan.table_name, "scan finished");
        })
    }

    fn project(&self, batch: RecordBatch) -> ExecResult<RecordBatch> {
        match &self.projection {
            Some(indices) => batch.project(indices),
            None => Ok(batch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{schema_of, ColumnDataType, ScalarValue};
    use crate::execution::test_util::{rows, scan};
    use crate::execution::{collect, ExecutionPlan};

    fn numbers(n: i64) -> Vec<Vec<ScalarValue>> {
        (0..n)
            .map(|i| vec![ScalarValue::from(i), ScalarValue::from(format!("v{i}"))])
            .collect()
    }

    fn schema() -> SchemaRef {
        schema_of(&[("n", ColumnDataType::Long), ("label", ColumnDataType::Utf8)])
    }

    #[tokio::test]
    async fn test_scan_batches_rows() {
        let plan = scan("t", schema(), numbers(10));
        let ctx = QueryContext::default().with_batch_size(4);
        let batches = collect(&plan, &ctx).await.unwrap();
        let sizes: Vec<usize> = batches.iter().map(RecordBatch::num_rows).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(rows(&batches), numbers(10));
    }

    #[tokio::test]
    async fn test_scan_projection() {
        let ExecutionPlan::Scan(exec) = scan("t", schema(), numbers(3)).as_ref().clone() else {
            unreachable!()
        };
        let plan = ExecutionPlan::Scan(exec.with_projection(vec![1]).unwrap());
        let batches = collect(&plan, &QueryContext::default()).await.unwrap();
        assert_eq!(batches[0].num_columns(), 1);
        assert_eq!(batches[0].schema().fields()[0].name, "label");
    }

    #[tokio::test]
    async fn test_scan_soft_nulls_and_upcast() {
        let schema = schema_of(&[("n", ColumnDataType::Byte)]);
        let plan = scan(
            "t",
            schema,
            vec![
                vec![ScalarValue::from(1i64)],
                vec![ScalarValue::from("not a number")],
                vec![ScalarValue::from(70_000i64)],
            ],
        );
        let batches = collect(&plan, &QueryContext::default()).await.unwrap();
        let column = batches[0].column(0).unwrap();
        assert!(column.is_null(1));
        assert_eq!(column.get(2), ScalarValue::from(70_000i64));
        assert_eq!(column.data_type(), ColumnDataType::Integer);
    }

    #[tokio::test]
    async fn test_scan_observes_cancellation() {
        let plan = scan("t", schema(), numbers(10));
        let ctx = QueryContext::default().with_batch_size(4);
        ctx.cancellation_token().cancel();
        let result = collect(&plan, &ctx).await;
        assert!(matches!(result, Err(ExecutionError::Cancelled)));
    }
}
