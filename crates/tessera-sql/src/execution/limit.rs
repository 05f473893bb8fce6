//! Skip and fetch.

use std::sync::Arc;

use futures::StreamExt;

use super::{BatchStream, ExecutionPlan};
use crate::context::QueryContext;
use crate::error::ExecResult;

/// Skips `skip` rows, then passes through at most `fetch` rows. Stops
/// pulling from the input once `fetch` rows have been produced.
#[derive(Debug, Clone)]
pub struct LimitExec {
    /// Input plan.
    pub input: Arc<ExecutionPlan>,
    /// Rows to skip.
    pub skip: usize,
    /// Rows to return after skipping (None = all).
    pub fetch: Option<usize>,
}

impl LimitExec {
    /// Creates a limit.
    pub fn new(input: Arc<ExecutionPlan>, skip: usize, fetch: Option<usize>) -> Self {
        Self { input, skip, fetch }
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let mut input = self.input.execute(ctx)?;
        let mut skip = self.skip;
        let mut remaining = self.fetch;
        Ok(Box::pin(async_stream::try_stream! {
            while remaining != Some(0) {
                let Some(batch) = input.next().await else {
                    break;
                };
                let mut batch = batch?;
                if skip > 0 {
                    let num_rows = batch.num_rows();
                    if skip >= num_rows {
                        skip -= num_rows;
                        continue;
                    }
                    batch = batch.slice(skip, num_rows - skip);
                    skip = 0;
                }
                if let Some(left) = remaining.as_mut() {
                    if batch.num_rows() > *left {
                        batch = batch.slice(0, *left);
                    }
                    *left -= batch.num_rows();
                }
                if batch.num_rows() > 0 {
                    yield batch;
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{schema_of, ColumnDataType, ScalarValue};
    use crate::execution::collect;
    use crate::execution::test_util::{rows, scan};

    fn limit(skip: usize, fetch: Option<usize>) -> ExecutionPlan {
        let input = scan(
            "t",
            schema_of(&[("n", ColumnDataType::Long)]),
            (0..10).map(|i| vec![ScalarValue::from(i)]).collect(),
        );
        ExecutionPlan::Limit(LimitExec::new(input, skip, fetch))
    }

    async fn values(plan: ExecutionPlan) -> Vec<i64> {
        let ctx = QueryContext::default().with_batch_size(3);
        rows(&collect(&plan, &ctx).await.unwrap())
            .into_iter()
            .filter_map(|row| row[0].as_i64())
            .collect()
    }

    #[tokio::test]
    async fn test_skip_and_fetch_across_batches() {
        assert_eq!(values(limit(4, Some(3))).await, vec![4, 5, 6]);
        assert_eq!(values(limit(0, Some(2))).await, vec![0, 1]);
        assert_eq!(values(limit(8, None)).await, vec![8, 9]);
        assert_eq!(values(limit(12, Some(1))).await, Vec::<i64>::new());
        assert_eq!(values(limit(0, Some(0))).await, Vec::<i64>::new());
    }
}
