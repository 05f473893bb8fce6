//! Concurrent union.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{BatchStream, ExecutionPlan};
use crate::context::QueryContext;
use crate::data::{ColumnDataType, RecordBatch, SchemaRef};
use crate::error::{ExecResult, ExecutionError};

/// Concatenates the rows of every input. Each input runs on its own task;
/// batches are yielded in arrival order, so the order across inputs is
/// unspecified.
#[derive(Debug, Clone)]
pub struct UnionExec {
    /// Inputs, all with the same number of columns.
    pub inputs: Vec<Arc<ExecutionPlan>>,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Aborts the branch tasks when the union stream is dropped early.
struct AbortOnDrop(Vec<JoinHandle<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

impl UnionExec {
    /// Creates a union.
    pub fn new(inputs: Vec<Arc<ExecutionPlan>>, schema: SchemaRef) -> Self {
        Self { inputs, schema }
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let branches = self
            .inputs
            .iter()
            .map(|input| input.execute(ctx))
            .collect::<ExecResult<Vec<_>>>()?;
        let schema = self.schema.clone();
        let ctx = ctx.clone();
        Ok(Box::pin(async_stream::try_stream! {
            let (tx, mut rx) = mpsc::channel::<ExecResult<RecordBatch>>(branches.len().max(1) * 2);
            let mut tasks = AbortOnDrop(Vec::with_capacity(branches.len()));
            for mut branch in branches {
                let tx = tx.clone();
                tasks.0.push(tokio::spawn(async move {
                    while let Some(batch) = branch.next().await {
                        let failed = batch.is_err();
                        if tx.send(batch).await.is_err() || failed {
                            break;
                        }
                    }
                }));
            }
            drop(tx);

            while let Some(batch) = rx.recv().await {
                let batch = conform(&schema, batch?)?;
                yield batch;
                ctx.check_cancelled()?;
            }
            for handle in std::mem::take(&mut tasks.0) {
                handle
                    .await
                    .map_err(|e| ExecutionError::Internal(format!("union branch failed: {e}")))?;
            }
        }))
    }
}

/// Renames a branch batch to the union schema, widening columns whose type
/// differs from the union field type.
fn conform(schema: &SchemaRef, batch: RecordBatch) -> ExecResult<RecordBatch> {
    let num_rows = batch.num_rows();
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, column)| {
            let actual = column.data_type();
            if actual == field.data_type || actual == ColumnDataType::Null {
                return column.clone();
            }
            match field.data_type.common_with(&actual) {
                Some(common) if common != actual => column.cast(common),
                _ => column.clone(),
            }
        })
        .collect();
    RecordBatch::with_row_count(schema.clone(), columns, num_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{schema_of, ScalarValue};
    use crate::execution::collect;
    use crate::execution::test_util::{rows, scan};
    use crate::physical::PhysicalExpr;
    use crate::execution::FilterExec;
    use crate::logical::BinaryOp;

    fn numbers(range: std::ops::Range<i64>) -> Vec<Vec<ScalarValue>> {
        range.map(|i| vec![ScalarValue::from(i)]).collect()
    }

    #[tokio::test]
    async fn test_union_yields_every_branch() {
        let schema = schema_of(&[("n", ColumnDataType::Long)]);
        let plan = ExecutionPlan::Union(UnionExec::new(
            vec![
                scan("a", schema.clone(), numbers(0..5)),
                scan("b", schema.clone(), numbers(5..8)),
                scan("c", schema.clone(), numbers(8..10)),
            ],
            schema,
        ));
        let ctx = QueryContext::default().with_batch_size(2);
        let mut values: Vec<i64> = rows(&collect(&plan, &ctx).await.unwrap())
            .into_iter()
            .filter_map(|row| row[0].as_i64())
            .collect();
        values.sort_unstable();
        assert_eq!(values, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_union_widens_branch_columns() {
        let plan = ExecutionPlan::Union(UnionExec::new(
            vec![
                scan("a", schema_of(&[("n", ColumnDataType::Byte)]), numbers(0..2)),
                scan("b", schema_of(&[("m", ColumnDataType::Long)]), numbers(2..4)),
            ],
            schema_of(&[("n", ColumnDataType::Long)]),
        ));
        let batches = collect(&plan, &QueryContext::default()).await.unwrap();
        for batch in &batches {
            assert_eq!(batch.schema().fields()[0].name, "n");
            assert_eq!(batch.column(0).unwrap().data_type(), ColumnDataType::Long);
        }
        assert_eq!(rows(&batches).len(), 4);
    }

    #[tokio::test]
    async fn test_union_propagates_branch_error() {
        let schema = schema_of(&[("n", ColumnDataType::Long)]);
        let failing = Arc::new(ExecutionPlan::Filter(FilterExec::new(
            scan("a", schema.clone(), numbers(0..3)),
            PhysicalExpr::binary(
                PhysicalExpr::column("n", 0),
                BinaryOp::Plus,
                PhysicalExpr::literal(1i64),
            ),
        )));
        let plan = ExecutionPlan::Union(UnionExec::new(
            vec![failing, scan("b", schema.clone(), numbers(0..3))],
            schema,
        ));
        let result = collect(&plan, &QueryContext::default()).await;
        assert!(matches!(result, Err(ExecutionError::Type(_))));
    }
}
