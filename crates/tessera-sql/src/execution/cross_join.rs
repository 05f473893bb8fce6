//! Cartesian product.

use std::sync::Arc;

use futures::StreamExt;

use super::join::{build_batch_from_indices, output_column_indices, JoinSide};
use super::{BatchStream, ExecutionPlan};
use crate::context::QueryContext;
use crate::data::{RecordBatch, SchemaRef};
use crate::error::ExecResult;
use crate::logical::JoinType;

/// Pairs every left row with every right row. The left input is collected
/// first; output follows right batch order, then left row order.
#[derive(Debug, Clone)]
pub struct CrossJoinExec {
    /// Collected input.
    pub left: Arc<ExecutionPlan>,
    /// Streamed input.
    pub right: Arc<ExecutionPlan>,
    /// Output schema: left fields then right fields.
    pub schema: SchemaRef,
}

impl CrossJoinExec {
    /// Creates a cross join.
    pub fn new(left: Arc<ExecutionPlan>, right: Arc<ExecutionPlan>, schema: SchemaRef) -> Self {
        Self {
            left,
            right,
            schema,
        }
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let mut left_stream = self.left.execute(ctx)?;
        let mut right_stream = self.right.execute(ctx)?;
        let left_schema = self.left.schema();
        let schema = self.schema.clone();
        let column_indices =
            output_column_indices(JoinType::Inner, left_schema.len(), self.right.schema().len());
        let ctx = ctx.clone();
        Ok(Box::pin(async_stream::try_stream! {
            let mut left_batches = Vec::new();
            while let Some(batch) = left_stream.next().await {
                left_batches.push(batch?);
            }
            let left = RecordBatch::concat_all(left_schema, &left_batches)?;
            while let Some(right) = right_stream.next().await {
                let right = right?;
                if left.num_rows() == 0 {
                    continue;
                }
                let pairs = left.num_rows() * right.num_rows();
                let mut left_indices = Vec::with_capacity(pairs);
                let mut right_indices = Vec::with_capacity(pairs);
                for r in 0..right.num_rows() {
                    for l in 0..left.num_rows() {
                        left_indices.push(Some(l));
                        right_indices.push(Some(r));
                    }
                }
                let output = build_batch_from_indices(
                    &schema,
                    &left,
                    &right,
                    &left_indices,
                    &right_indices,
                    &column_indices,
                    JoinSide::Left,
                )?;
                for batch in output.repartition(ctx.batch_size) {
                    yield batch;
                }
                ctx.check_cancelled()?;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{schema_of, ColumnDataType, ScalarValue, Schema};
    use crate::execution::collect;
    use crate::execution::test_util::{rows, scan};

    #[tokio::test]
    async fn test_cross_join_pairs_all_rows() {
        let left_schema = schema_of(&[("a", ColumnDataType::Long)]);
        let right_schema = schema_of(&[("b", ColumnDataType::Utf8)]);
        let plan = ExecutionPlan::CrossJoin(CrossJoinExec::new(
            scan("l", left_schema.clone(), vec![vec![1i64.into()], vec![2i64.into()], vec![3i64.into()]]),
            scan("r", right_schema.clone(), vec![vec!["x".into()], vec!["y".into()]]),
            Arc::new(Schema::join(&left_schema, &right_schema)),
        ));
        let ctx = QueryContext::default().with_batch_size(4);
        let batches = collect(&plan, &ctx).await.unwrap();
        let out = rows(&batches);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], vec![ScalarValue::from(1i64), ScalarValue::from("x")]);
        assert_eq!(out[5], vec![ScalarValue::from(3i64), ScalarValue::from("y")]);
        assert!(batches.iter().all(|b| b.num_rows() <= 4));
    }

    #[tokio::test]
    async fn test_cross_join_with_empty_side() {
        let left_schema = schema_of(&[("a", ColumnDataType::Long)]);
        let right_schema = schema_of(&[("b", ColumnDataType::Utf8)]);
        let plan = ExecutionPlan::CrossJoin(CrossJoinExec::new(
            scan("l", left_schema.clone(), vec![]),
            scan("r", right_schema.clone(), vec![vec!["x".into()]]),
            Arc::new(Schema::join(&left_schema, &right_schema)),
        ));
        assert!(collect(&plan, &QueryContext::default()).await.unwrap().is_empty());
    }
}
