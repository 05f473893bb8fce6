//! Projection.

use std::sync::Arc;

use futures::StreamExt;

use super::{BatchStream, ExecutionPlan};
use crate::context::QueryContext;
use crate::data::{RecordBatch, SchemaRef};
use crate::error::ExecResult;
use crate::physical::PhysicalExpr;

/// Evaluates one expression per output column.
#[derive(Debug, Clone)]
pub struct ProjectionExec {
    /// Input plan.
    pub input: Arc<ExecutionPlan>,
    /// Output expressions over the input schema.
    pub exprs: Vec<PhysicalExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

impl ProjectionExec {
    /// Creates a projection.
    pub fn new(input: Arc<ExecutionPlan>, exprs: Vec<PhysicalExpr>, schema: SchemaRef) -> Self {
        Self {
            input,
            exprs,
            schema,
        }
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let mut input = self.input.execute(ctx)?;
        let exprs = self.exprs.clone();
        let schema = self.schema.clone();
        Ok(Box::pin(async_stream::try_stream! {
            while let Some(batch) = input.next().await {
                let batch = batch?;
                let num_rows = batch.num_rows();
                let columns = exprs
                    .iter()
                    .map(|expr| Ok(expr.evaluate(&batch)?.to_array(num_rows)))
                    .collect::<ExecResult<Vec<_>>>()?;
                yield RecordBatch::with_row_count(schema.clone(), columns, num_rows)?;
            }
        }))
    }
}
