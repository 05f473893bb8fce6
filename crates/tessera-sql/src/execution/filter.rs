//! Predicate filtering.

use std::sync::Arc;

use futures::StreamExt;

use super::{BatchStream, ExecutionPlan};
use crate::context::QueryContext;
use crate::error::{ExecResult, ExecutionError};
use crate::physical::PhysicalExpr;

/// Keeps the rows for which the predicate is true. Null counts as false.
/// Batches left empty are not yielded.
#[derive(Debug, Clone)]
pub struct FilterExec {
    /// Input plan.
    pub input: Arc<ExecutionPlan>,
    /// Boolean predicate over the input schema.
    pub predicate: PhysicalExpr,
}

impl FilterExec {
    /// Creates a filter.
    pub fn new(input: Arc<ExecutionPlan>, predicate: PhysicalExpr) -> Self {
        Self { input, predicate }
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let mut input = self.input.execute(ctx)?;
        let predicate = self.predicate.clone();
        Ok(Box::pin(async_stream::try_stream! {
            while let Some(batch) = input.next().await {
                let mut batch = batch?;
                let mask = predicate.evaluate(&batch)?.to_mask().ok_or_else(|| {
                    ExecutionError::Type(format!("filter predicate {} is not boolean", predicate))
                })?;
                batch.filter(&mask)?;
                if batch.num_rows() > 0 {
                    yield batch;
                }
            }
        }))
    }
}
