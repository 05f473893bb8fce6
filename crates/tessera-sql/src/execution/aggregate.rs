//! Hash aggregation.
//!
//! Without grouping keys the node always emits exactly one row, even for
//! empty input. With grouping keys it keeps one accumulator set per
//! distinct key tuple, in first-seen order, and emits one row per group.
//! Null keys form their own group.
//!
//! In [`AggregationMode::Final`] the input is the output of a
//! [`AggregationMode::Partial`] node: group columns first, then the state
//! columns of each aggregate in order.

use std::sync::Arc;

use futures::StreamExt;
use rustc_hash::FxHashMap;

use super::{BatchStream, ExecutionPlan};
use crate::context::QueryContext;
use crate::data::{KeyValue, QualifiedField, RecordArray, RecordBatch, ScalarValue, Schema, SchemaRef};
use crate::error::{ExecResult, ExecutionError};
use crate::physical::{state_offsets, Accumulator, AggregateExpr, AggregationMode, PhysicalExpr};

/// Grouped or ungrouped aggregation.
#[derive(Debug, Clone)]
pub struct AggregateExec {
    /// Input plan.
    pub input: Arc<ExecutionPlan>,
    /// Aggregation stage.
    pub mode: AggregationMode,
    /// Grouping expressions over the input schema.
    pub group_by: Vec<PhysicalExpr>,
    /// Aggregates. Arguments are only evaluated outside the final stage.
    pub aggregates: Vec<AggregateExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

impl AggregateExec {
    /// Creates an aggregation.
    pub fn new(
        input: Arc<ExecutionPlan>,
        mode: AggregationMode,
        group_by: Vec<PhysicalExpr>,
        aggregates: Vec<AggregateExpr>,
        schema: SchemaRef,
    ) -> Self {
        Self {
            input,
            mode,
            group_by,
            aggregates,
            schema,
        }
    }

    /// Returns the output schema for `mode`: the group fields, then either
    /// the state fields or the result field of each aggregate.
    pub fn output_schema(
        mode: AggregationMode,
        group_fields: Vec<QualifiedField>,
        aggregates: &[AggregateExpr],
    ) -> SchemaRef {
        let mut fields = group_fields;
        for aggregate in aggregates {
            if mode.emits_state() {
                fields.extend(aggregate.state_fields());
            } else {
                fields.push(aggregate.field());
            }
        }
        Arc::new(Schema::new(fields))
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let mut input = self.input.execute(ctx)?;
        let aggregate = self.clone();
        let ctx = ctx.clone();
        Ok(Box::pin(async_stream::try_stream! {
            let mut table = GroupTable::new(&aggregate);
            while let Some(batch) = input.next().await {
                table.update(&aggregate, &batch?)?;
                ctx.check_cancelled()?;
            }
            tracing::debug!(mode = %aggregate.mode, groups = table.len(), "aggregation finished");
            let output = table.finish(&aggregate)?;
            for batch in output.repartition(ctx.batch_size) {
                yield batch;
            }
        }))
    }

    fn new_accumulators(&self) -> Vec<Accumulator> {
        self.aggregates.iter().map(AggregateExpr::create_accumulator).collect()
    }

    /// Returns, per aggregate, the input arrays it consumes from `batch`:
    /// raw argument values, or state columns in the final stage.
    fn aggregate_inputs(&self, batch: &RecordBatch) -> ExecResult<Vec<Vec<RecordArray>>> {
        if !self.mode.consumes_state() {
            return self
                .aggregates
                .iter()
                .map(|aggregate| aggregate.evaluate_args(batch))
                .collect();
        }
        let offsets = state_offsets(&self.aggregates, self.group_by.len());
        self.aggregates
            .iter()
            .zip(offsets)
            .map(|(aggregate, offset)| {
                (offset..offset + aggregate.state_fields().len())
                    .map(|i| {
                        batch.column(i).cloned().ok_or_else(|| {
                            ExecutionError::Schema(format!(
                                "missing state column {} for {}",
                                i, aggregate.name
                            ))
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

fn fold(mode: AggregationMode, accumulator: &mut Accumulator, values: &[RecordArray]) -> ExecResult<()> {
    if mode.consumes_state() {
        accumulator.merge_batch(values)
    } else {
        accumulator.update_batch(values)
    }
}

fn emit(mode: AggregationMode, accumulators: &[Accumulator], row: &mut Vec<ScalarValue>) -> ExecResult<()> {
    for accumulator in accumulators {
        if mode.emits_state() {
            row.extend(accumulator.state()?);
        } else {
            row.push(accumulator.evaluate()?);
        }
    }
    Ok(())
}

/// Accumulators keyed by group.
struct GroupTable {
    index: FxHashMap<Vec<KeyValue>, usize>,
    keys: Vec<Vec<ScalarValue>>,
    accumulators: Vec<Vec<Accumulator>>,
}

impl GroupTable {
    fn new(aggregate: &AggregateExec) -> Self {
        let mut table = Self {
            index: FxHashMap::default(),
            keys: Vec::new(),
            accumulators: Vec::new(),
        };
        if aggregate.group_by.is_empty() {
            table.index.insert(Vec::new(), 0);
            table.keys.push(Vec::new());
            table.accumulators.push(aggregate.new_accumulators());
        }
        table
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn update(&mut self, aggregate: &AggregateExec, batch: &RecordBatch) -> ExecResult<()> {
        let inputs = aggregate.aggregate_inputs(batch)?;
        if aggregate.group_by.is_empty() {
            if let Some(accumulators) = self.accumulators.first_mut() {
                for (accumulator, values) in accumulators.iter_mut().zip(&inputs) {
                    fold(aggregate.mode, accumulator, values)?;
                }
            }
            return Ok(());
        }

        let num_rows = batch.num_rows();
        let group_values = aggregate
            .group_by
            .iter()
            .map(|expr| Ok(expr.evaluate(batch)?.to_array(num_rows)))
            .collect::<ExecResult<Vec<_>>>()?;

        // rows of this batch per group, in first-seen order
        let mut batch_groups: Vec<(usize, Vec<Option<usize>>)> = Vec::new();
        let mut slot_of_group: FxHashMap<usize, usize> = FxHashMap::default();
        for row in 0..num_rows {
            let values: Vec<ScalarValue> = group_values.iter().map(|a| a.get(row)).collect();
            let key: Vec<KeyValue> = values.iter().map(ScalarValue::key).collect();
            let group = match self.index.get(&key) {
                Some(&group) => group,
                None => {
                    let group = self.keys.len();
                    self.index.insert(key, group);
                    self.keys.push(values);
                    self.accumulators.push(aggregate.new_accumulators());
                    group
                }
            };
            let slot = *slot_of_group.entry(group).or_insert_with(|| {
                batch_groups.push((group, Vec::new()));
                batch_groups.len() - 1
            });
            if let Some((_, rows)) = batch_groups.get_mut(slot) {
                rows.push(Some(row));
            }
        }

        for (group, rows) in batch_groups {
            let Some(accumulators) = self.accumulators.get_mut(group) else {
                continue;
            };
            for (accumulator, values) in accumulators.iter_mut().zip(&inputs) {
                let taken: Vec<RecordArray> = values.iter().map(|v| v.take(&rows)).collect();
                fold(aggregate.mode, accumulator, &taken)?;
            }
        }
        Ok(())
    }

    fn finish(self, aggregate: &AggregateExec) -> ExecResult<RecordBatch> {
        let mut output = RecordBatch::empty(aggregate.schema.clone());
        for (mut row, accumulators) in self.keys.into_iter().zip(self.accumulators) {
            emit(aggregate.mode, &accumulators, &mut row)?;
            output.push_row(&row)?;
        }
        Ok(output)
    }
}
