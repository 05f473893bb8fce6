//! Sorting.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use futures::StreamExt;

use super::{BatchStream, ExecutionPlan};
use crate::context::QueryContext;
use crate::data::{RecordBatch, ScalarValue};
use crate::error::ExecResult;
use crate::physical::PhysicalExpr;

/// A sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSortExpr {
    /// Key expression over the input schema.
    pub expr: PhysicalExpr,
    /// Ascending order.
    pub asc: bool,
    /// Nulls sort before non-null values.
    pub nulls_first: bool,
}

impl PhysicalSortExpr {
    /// Creates a sort key.
    pub fn new(expr: PhysicalExpr, asc: bool, nulls_first: bool) -> Self {
        Self {
            expr,
            asc,
            nulls_first,
        }
    }

    fn compare(&self, a: &ScalarValue, b: &ScalarValue) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if self.asc => a.sort_cmp(b),
            (false, false) => b.sort_cmp(a),
        }
    }
}

impl fmt::Display for PhysicalSortExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} NULLS {}",
            self.expr,
            if self.asc { "ASC" } else { "DESC" },
            if self.nulls_first { "FIRST" } else { "LAST" }
        )
    }
}

/// Collects its input and emits it in key order. The sort is stable, and
/// with `fetch` only the first rows are kept.
#[derive(Debug, Clone)]
pub struct SortExec {
    /// Input plan.
    pub input: Arc<ExecutionPlan>,
    /// Sort keys, most significant first.
    pub order_by: Vec<PhysicalSortExpr>,
    /// Rows to keep.
    pub fetch: Option<usize>,
}

impl SortExec {
    /// Creates a sort.
    pub fn new(input: Arc<ExecutionPlan>, order_by: Vec<PhysicalSortExpr>, fetch: Option<usize>) -> Self {
        Self {
            input,
            order_by,
            fetch,
        }
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let mut input = self.input.execute(ctx)?;
        let sort = self.clone();
        let ctx = ctx.clone();
        Ok(Box::pin(async_stream::try_stream! {
            let mut batches = Vec::new();
            while let Some(batch) = input.next().await {
                batches.push(batch?);
                ctx.check_cancelled()?;
            }
            let batch = RecordBatch::concat_all(sort.input.schema(), &batches)?;
            drop(batches);
            let sorted = sort.sort_batch(&batch)?;
            for output in sorted.repartition(ctx.batch_size) {
                yield output;
            }
        }))
    }

    fn sort_batch(&self, batch: &RecordBatch) -> ExecResult<RecordBatch> {
        let keys = self
            .order_by
            .iter()
            .map(|key| {
                let values = key.expr.evaluate(batch)?.to_array(batch.num_rows());
                Ok(values.iter().collect::<Vec<_>>())
            })
            .collect::<ExecResult<Vec<_>>>()?;
        let mut indices: Vec<usize> = (0..batch.num_rows()).collect();
        indices.sort_by(|&a, &b| {
            self.order_by
                .iter()
                .zip(&keys)
                .map(|(key, values)| match (values.get(a), values.get(b)) {
                    (Some(x), Some(y)) => key.compare(x, y),
                    _ => Ordering::Equal,
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        if let Some(fetch) = self.fetch {
            indices.truncate(fetch);
        }
        let indices: Vec<Option<usize>> = indices.into_iter().map(Some).collect();
        Ok(batch.take(&indices))
    }
}
