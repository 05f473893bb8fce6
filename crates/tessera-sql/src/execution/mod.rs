//! Streaming execution plans.
//!
//! An [`ExecutionPlan`] is a tree of physical nodes. Executing a node
//! returns a lazily-evaluated [`BatchStream`]: each poll pulls at most one
//! batch through the tree. Cancellation is checked between batches, never
//! in the middle of one.
//!
//! Only [`UnionExec`] runs its children concurrently; every other node
//! pulls from its inputs sequentially, so batch order within a branch
//! follows source order.

mod aggregate;
mod cross_join;
mod empty;
mod filter;
mod join;
mod limit;
mod output_cache;
mod projection;
mod scan;
mod sort;
mod union;

use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::context::QueryContext;
use crate::data::{RecordBatch, SchemaRef};
use crate::error::ExecResult;
use crate::profiler::instrument;

pub use aggregate::AggregateExec;
pub use cross_join::CrossJoinExec;
pub use empty::EmptyExec;
pub use filter::FilterExec;
pub use join::{
    append_left_indices, append_right_indices, apply_join_filter_to_indices,
    build_batch_from_indices, get_final_indices, output_column_indices, ColumnIndex,
    HashJoinExec, JoinFilter, JoinMap, JoinSide,
};
pub use limit::LimitExec;
pub use output_cache::OutputCacheExec;
pub use projection::ProjectionExec;
pub use scan::ScanExec;
pub use sort::{PhysicalSortExpr, SortExec};
pub use union::UnionExec;

/// A stream of record batches.
pub type BatchStream = BoxStream<'static, ExecResult<RecordBatch>>;

/// A node in a physical execution plan.
#[derive(Debug, Clone)]
pub enum ExecutionPlan {
    /// Reads rows from a data source.
    Scan(ScanExec),
    /// Drops rows failing a predicate.
    Filter(FilterExec),
    /// Computes output columns.
    Projection(ProjectionExec),
    /// Concatenates inputs, running them concurrently.
    Union(UnionExec),
    /// Equi-join over a hash table built from the left input.
    HashJoin(HashJoinExec),
    /// Cartesian product.
    CrossJoin(CrossJoinExec),
    /// Grouped or ungrouped aggregation.
    Aggregate(AggregateExec),
    /// Full sort, optionally keeping the first rows.
    Sort(SortExec),
    /// Skip and fetch.
    Limit(LimitExec),
    /// No rows, or a single row with no columns.
    Empty(EmptyExec),
    /// Materializes its input, writing it to a cache on first run.
    OutputCache(OutputCacheExec),
}

impl ExecutionPlan {
    /// Returns the output schema.
    pub fn schema(&self) -> SchemaRef {
        match self {
            ExecutionPlan::Scan(scan) => scan.schema.clone(),
            ExecutionPlan::Filter(filter) => filter.input.schema(),
            ExecutionPlan::Projection(projection) => projection.schema.clone(),
            ExecutionPlan::Union(union) => union.schema.clone(),
            ExecutionPlan::HashJoin(join) => join.schema.clone(),
            ExecutionPlan::CrossJoin(cross) => cross.schema.clone(),
            ExecutionPlan::Aggregate(aggregate) => aggregate.schema.clone(),
            ExecutionPlan::Sort(sort) => sort.input.schema(),
            ExecutionPlan::Limit(limit) => limit.input.schema(),
            ExecutionPlan::Empty(empty) => empty.schema.clone(),
            ExecutionPlan::OutputCache(cache) => cache.input.schema(),
        }
    }

    /// Returns the child nodes.
    pub fn children(&self) -> Vec<&Arc<ExecutionPlan>> {
        match self {
            ExecutionPlan::Scan(_) | ExecutionPlan::Empty(_) => vec![],
            ExecutionPlan::Filter(filter) => vec![&filter.input],
            ExecutionPlan::Projection(projection) => vec![&projection.input],
            ExecutionPlan::Union(union) => union.inputs.iter().collect(),
            ExecutionPlan::HashJoin(join) => vec![&join.left, &join.right],
            ExecutionPlan::CrossJoin(cross) => vec![&cross.left, &cross.right],
            ExecutionPlan::Aggregate(aggregate) => vec![&aggregate.input],
            ExecutionPlan::Sort(sort) => vec![&sort.input],
            ExecutionPlan::Limit(limit) => vec![&limit.input],
            ExecutionPlan::OutputCache(cache) => vec![&cache.input],
        }
    }

    /// Returns the node name.
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionPlan::Scan(_) => "Scan",
            ExecutionPlan::Filter(_) => "Filter",
            ExecutionPlan::Projection(_) => "Projection",
            ExecutionPlan::Union(_) => "Union",
            ExecutionPlan::HashJoin(_) => "HashJoin",
            ExecutionPlan::CrossJoin(_) => "CrossJoin",
            ExecutionPlan::Aggregate(_) => "Aggregate",
            ExecutionPlan::Sort(_) => "Sort",
            ExecutionPlan::Limit(_) => "Limit",
            ExecutionPlan::Empty(_) => "Empty",
            ExecutionPlan::OutputCache(_) => "OutputCache",
        }
    }

    /// Starts executing this node. Children are started eagerly so plan
    /// errors surface here; batches are produced only when the stream is
    /// polled.
    pub fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let ctx = ctx.scoped(self.name());
        let stream = match self {
            ExecutionPlan::Scan(scan) => scan.execute(&ctx),
            ExecutionPlan::Filter(filter) => filter.execute(&ctx)?,
            ExecutionPlan::Projection(projection) => projection.execute(&ctx)?,
            ExecutionPlan::Union(union) => union.execute(&ctx)?,
            ExecutionPlan::HashJoin(join) => join.execute(&ctx)?,
            ExecutionPlan::CrossJoin(cross) => cross.execute(&ctx)?,
            ExecutionPlan::Aggregate(aggregate) => aggregate.execute(&ctx)?,
            ExecutionPlan::Sort(sort) => sort.execute(&ctx)?,
            ExecutionPlan::Limit(limit) => limit.execute(&ctx)?,
            ExecutionPlan::Empty(empty) => empty.execute(),
            ExecutionPlan::OutputCache(cache) => cache.execute(&ctx)?,
        };
        Ok(instrument(stream, ctx.timing().cloned()))
    }

    /// Returns an indented tree of the plan.
    pub fn display(&self) -> String {
        let mut output = String::new();
        format_node(self, 0, &mut output);
        output
    }

    fn describe(&self) -> String {
        match self {
            ExecutionPlan::Scan(scan) => {
                let mut line = format!("Scan: {}", scan.table_name);
                if let Some(projection) = &scan.projection {
                    line.push_str(&format!(" projection={:?}", projection));
                }
                line
            }
            ExecutionPlan::Filter(filter) => format!("Filter: {}", filter.predicate),
            ExecutionPlan::Projection(projection) => {
                format!("Projection: {}", comma_list(&projection.exprs))
            }
            ExecutionPlan::Union(_) => "Union".to_string(),
            ExecutionPlan::HashJoin(hash_join) => {
                let keys: Vec<String> = hash_join
                    .on
                    .iter()
                    .map(|(l, r)| format!("{} = {}", l, r))
                    .collect();
                let mut line =
                    format!("HashJoin: {} on=[{}]", hash_join.join_type, keys.join(", "));
                if let Some(filter) = &hash_join.filter {
                    line.push_str(&format!(" filter={}", filter.expr));
                }
                line
            }
            ExecutionPlan::CrossJoin(_) => "CrossJoin".to_string(),
            ExecutionPlan::Aggregate(aggregate) => format!(
                "Aggregate: mode={} groupBy=[{}] aggr=[{}]",
                aggregate.mode,
                comma_list(&aggregate.group_by),
                comma_list(&aggregate.aggregates)
            ),
            ExecutionPlan::Sort(sort) => {
                let mut line = format!("Sort: {}", comma_list(&sort.order_by));
                if let Some(fetch) = sort.fetch {
                    line.push_str(&format!(" fetch={}", fetch));
                }
                line
            }
            ExecutionPlan::Limit(limit) => match limit.fetch {
                Some(fetch) => format!("Limit: skip={} fetch={}", limit.skip, fetch),
                None => format!("Limit: skip={}", limit.skip),
            },
            ExecutionPlan::Empty(empty) => {
                format!("Empty: produce_one_row={}", empty.produce_one_row)
            }
            ExecutionPlan::OutputCache(cache) => {
                format!("OutputCache: key={}", cache.options.key)
            }
        }
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

fn comma_list<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_node(plan: &ExecutionPlan, indent: usize, output: &mut String) {
    output.push_str(&"  ".repeat(indent));
    output.push_str(&plan.describe());
    output.push('\n');
    for child in plan.children() {
        format_node(child, indent + 1, output);
    }
}

/// Executes `plan` and collects every batch.
pub async fn collect(plan: &ExecutionPlan, ctx: &QueryContext) -> ExecResult<Vec<RecordBatch>> {
    plan.execute(ctx)?.try_collect().await
}
