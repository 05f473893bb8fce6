//! Result caching.

use std::sync::Arc;

use futures::StreamExt;

use super::{BatchStream, ExecutionPlan};
use crate::context::QueryContext;
use crate::data::RecordBatch;
use crate::datasource::{CacheOptions, DataWriter};
use crate::error::ExecResult;

/// Materializes its input into a single batch and, unless a complete entry
/// already exists, writes every input batch to the cache. The writer is
/// closed on success and discarded on failure, so a partial result is never
/// published; when several queries miss on the same key at once, only the
/// first to finish publishes. Output is re-split to the context batch size.
#[derive(Debug, Clone)]
pub struct OutputCacheExec {
    /// Input plan.
    pub input: Arc<ExecutionPlan>,
    /// Cache entry settings.
    pub options: CacheOptions,
}

impl OutputCacheExec {
    /// Creates a caching node.
    pub fn new(input: Arc<ExecutionPlan>, options: CacheOptions) -> Self {
        Self { input, options }
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let mut input = self.input.execute(ctx)?;
        let options = self.options.clone();
        let schema = self.input.schema();
        let ctx = ctx.clone();
        Ok(Box::pin(async_stream::try_stream! {
            let mut writer = if options.provider.exists(&options.key).await? {
                None
            } else {
                Some(options.create_writer())
            };
            let mut master = RecordBatch::empty(schema);
            let consumed =
                consume(&mut input, &mut master, writer.as_deref_mut(), &ctx).await;
            if let Some(writer) = writer.as_mut() {
                match &consumed {
                    Ok(()) => {
                        writer.close().await?;
                        tracing::debug!(key = %options.key, rows = master.num_rows(), "cached query output");
                    }
                    Err(error) => {
                        if let Err(discard) = writer.discard().await {
                            tracing::warn!(key = %options.key, error = %discard, "failed to discard cache entry");
                        }
                        tracing::debug!(key = %options.key, %error, "cache write abandoned");
                    }
                }
            }
            consumed?;
            for batch in master.repartition(ctx.batch_size) {
                yield batch;
            }
        }))
    }
}

async fn consume(
    input: &mut BatchStream,
    master: &mut RecordBatch,
    mut writer: Option<&mut (dyn DataWriter + 'static)>,
    ctx: &QueryContext,
) -> ExecResult<()> {
    while let Some(batch) = input.next().await {
        let batch = batch?;
        if let Some(writer) = writer.as_deref_mut() {
            writer.write(&batch, ctx.cancellation_token()).await?;
        }
        master.concat(&batch)?;
        ctx.check_cancelled()?;
    }
    Ok(())
}
