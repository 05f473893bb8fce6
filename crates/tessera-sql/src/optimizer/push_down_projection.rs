//! Column pruning.
//!
//! Walks the plan from the root carrying, for each operator, which of its
//! output columns an ancestor consumes. Projections drop unused
//! expressions and scans narrow their projection, so unused columns are
//! never read. The root always keeps its full schema.

use std::sync::Arc;

use super::{OptimizerError, OptimizerResult, OptimizerRule};
use crate::data::Schema;
use crate::logical::{
    AggregateOperator, CrossJoinOperator, FilterOperator, JoinOperator, LogicalExpr,
    LogicalOperator, ProjectionOperator, SubqueryAliasOperator, UnionOperator,
};

/// Narrows every operator, down to each scan, to the columns consumed by
/// its ancestors.
#[derive(Debug, Default, Clone, Copy)]
pub struct PushDownProjection;

impl OptimizerRule for PushDownProjection {
    fn name(&self) -> &str {
        "push_down_projection"
    }

    fn try_optimize(&self, op: &LogicalOperator) -> OptimizerResult<Option<LogicalOperator>> {
        let root = Arc::new(op.clone());
        let required = vec![true; root.schema().len()];
        let pruned = prune(&root, &required)?;
        if Arc::ptr_eq(&pruned, &root) {
            Ok(None)
        } else {
            Ok(Some(pruned.as_ref().clone()))
        }
    }
}

/// Returns `op` rewritten to produce at least the columns flagged in
/// `required`, in their original relative order.
fn prune(op: &Arc<LogicalOperator>, required: &[bool]) -> OptimizerResult<Arc<LogicalOperator>> {
    match op.as_ref() {
        LogicalOperator::Scan(scan) => {
            if required.iter().all(|r| *r) {
                return Ok(op.clone());
            }
            let mut kept = kept_positions(required);
            if kept.is_empty() && !required.is_empty() {
                // Keep one column so row counts survive.
                kept.push(0);
            }
            let indices: Vec<usize> = match &scan.projection {
                Some(projection) => kept
                    .iter()
                    .map(|&i| {
                        projection.get(i).copied().ok_or_else(|| {
                            OptimizerError::Internal(format!(
                                "scan column {} outside projection {:?}",
                                i, projection
                            ))
                        })
                    })
                    .collect::<OptimizerResult<_>>()?,
                None => kept,
            };
            if scan.projection.as_ref() == Some(&indices) {
                return Ok(op.clone());
            }
            Ok(Arc::new(scan.clone().with_projection(indices)?.into()))
        }
        LogicalOperator::Projection(projection) => {
            let mut exprs: Vec<LogicalExpr> = projection
                .exprs
                .iter()
                .zip(required)
                .filter(|(_, r)| **r)
                .map(|(e, _)| e.clone())
                .collect();
            if exprs.is_empty() {
                if let Some(first) = projection.exprs.first() {
                    exprs.push(first.clone());
                }
            }
            let input_schema = projection.input.schema();
            let mut needed = vec![false; input_schema.len()];
            mark(exprs.iter(), &input_schema, &mut needed)?;
            let input = prune(&projection.input, &needed)?;
            if exprs.len() == projection.exprs.len() && Arc::ptr_eq(&input, &projection.input) {
                return Ok(op.clone());
            }
            Ok(Arc::new(ProjectionOperator::try_new(input, exprs)?.into()))
        }
        LogicalOperator::Filter(filter) => {
            let mut needed = required.to_vec();
            mark([&filter.predicate].into_iter(), &filter.input.schema(), &mut needed)?;
            let input = prune(&filter.input, &needed)?;
            if Arc::ptr_eq(&input, &filter.input) {
                return Ok(op.clone());
            }
            Ok(Arc::new(
                FilterOperator::try_new(input, filter.predicate.clone())?.into(),
            ))
        }
        LogicalOperator::Sort(sort) => {
            let mut needed = required.to_vec();
            mark(sort.order_by.iter(), &sort.input.schema(), &mut needed)?;
            rebuild_single(op, &sort.input, &needed)
        }
        LogicalOperator::Limit(limit) => rebuild_single(op, &limit.input, required),
        LogicalOperator::Distinct(distinct) => {
            let needed = vec![true; distinct.input.schema().len()];
            rebuild_single(op, &distinct.input, &needed)
        }
        LogicalOperator::Aggregate(aggregate) => {
            let input_schema = aggregate.input.schema();
            let mut needed = vec![false; input_schema.len()];
            mark(
                aggregate.group_by.iter().chain(aggregate.aggregates.iter()),
                &input_schema,
                &mut needed,
            )?;
            let input = prune(&aggregate.input, &needed)?;
            if Arc::ptr_eq(&input, &aggregate.input) {
                return Ok(op.clone());
            }
            Ok(Arc::new(
                AggregateOperator::try_new(
                    input,
                    aggregate.group_by.clone(),
                    aggregate.aggregates.clone(),
                )?
                .into(),
            ))
        }
        LogicalOperator::Join(join) => {
            let left_schema = join.left.schema();
            let right_schema = join.right.schema();
            let (mut left_needed, mut right_needed) = if join.join_type.outputs_left_only() {
                (required.to_vec(), vec![false; right_schema.len()])
            } else if join.join_type.outputs_right_only() {
                (vec![false; left_schema.len()], required.to_vec())
            } else {
                split_required(required, left_schema.len())
            };
            for (l, r) in &join.on {
                mark([l].into_iter(), &left_schema, &mut left_needed)?;
                mark([r].into_iter(), &right_schema, &mut right_needed)?;
            }
            if let Some(filter) = &join.filter {
                let combined = Schema::join(&left_schema, &right_schema);
                let mut needed = vec![false; combined.len()];
                mark([filter].into_iter(), &combined, &mut needed)?;
                let (l, r) = split_required(&needed, left_schema.len());
                merge(&mut left_needed, &l);
                merge(&mut right_needed, &r);
            }
            let left = prune(&join.left, &left_needed)?;
            let right = prune(&join.right, &right_needed)?;
            if Arc::ptr_eq(&left, &join.left) && Arc::ptr_eq(&right, &join.right) {
                return Ok(op.clone());
            }
            Ok(Arc::new(
                JoinOperator::try_new(
                    left,
                    right,
                    join.join_type,
                    join.on.clone(),
                    join.filter.clone(),
                )?
                .into(),
            ))
        }
        LogicalOperator::CrossJoin(cross) => {
            let (left_needed, right_needed) = split_required(required, cross.left.schema().len());
            let left = prune(&cross.left, &left_needed)?;
            let right = prune(&cross.right, &right_needed)?;
            if Arc::ptr_eq(&left, &cross.left) && Arc::ptr_eq(&right, &cross.right) {
                return Ok(op.clone());
            }
            Ok(Arc::new(CrossJoinOperator::new(left, right).into()))
        }
        LogicalOperator::Union(union) => {
            // Branches must keep identical shapes, so only prune below them.
            let mut changed = false;
            let mut inputs = Vec::with_capacity(union.inputs.len());
            for input in &union.inputs {
                let needed = vec![true; input.schema().len()];
                let pruned = prune(input, &needed)?;
                changed |= !Arc::ptr_eq(&pruned, input);
                inputs.push(pruned);
            }
            if !changed {
                return Ok(op.clone());
            }
            Ok(Arc::new(UnionOperator::try_new(inputs)?.into()))
        }
        LogicalOperator::SubqueryAlias(alias) => {
            let input = prune(&alias.input, required)?;
            if Arc::ptr_eq(&input, &alias.input) {
                return Ok(op.clone());
            }
            Ok(Arc::new(
                SubqueryAliasOperator::new(input, alias.alias.clone()).into(),
            ))
        }
        LogicalOperator::EmptyRelation(_) => Ok(op.clone()),
    }
}

fn rebuild_single(
    op: &Arc<LogicalOperator>,
    input: &Arc<LogicalOperator>,
    needed: &[bool],
) -> OptimizerResult<Arc<LogicalOperator>> {
    let pruned = prune(input, needed)?;
    if Arc::ptr_eq(&pruned, input) {
        return Ok(op.clone());
    }
    Ok(Arc::new(op.with_new_inputs(vec![pruned])?))
}

/// Flags every input column referenced by `exprs`.
fn mark<'a>(
    exprs: impl Iterator<Item = &'a LogicalExpr>,
    schema: &Schema,
    needed: &mut [bool],
) -> OptimizerResult<()> {
    for expr in exprs {
        for column in expr.columns() {
            let index = schema.index_of_column(&column).ok_or_else(|| {
                OptimizerError::Internal(format!("column {} missing from {}", column, schema))
            })?;
            needed[index] = true;
        }
    }
    Ok(())
}

fn kept_positions(required: &[bool]) -> Vec<usize> {
    required
        .iter()
        .enumerate()
        .filter(|(_, r)| **r)
        .map(|(i, _)| i)
        .collect()
}

fn split_required(required: &[bool], left_len: usize) -> (Vec<bool>, Vec<bool>) {
    let split = left_len.min(required.len());
    (required[..split].to_vec(), required[split..].to_vec())
}

fn merge(into: &mut [bool], other: &[bool]) {
    for (a, b) in into.iter_mut().zip(other) {
        *a |= *b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::test_util::plan;
    use crate::optimizer::{Optimizer, OptimizerConfig};

    fn optimize(sql: &str) -> String {
        let mut optimizer = Optimizer::empty(OptimizerConfig::default());
        optimizer.add_rule(Arc::new(PushDownProjection));
        optimizer.optimize(plan(sql)).unwrap().display()
    }

    #[test]
    fn test_scan_reads_only_used_columns() {
        assert_eq!(
            optimize("SELECT id FROM orders WHERE amount > 10"),
            "Projection: orders.id\n  Filter: orders.amount > 10\n    Scan: orders projection=[0, 2]\n"
        );
    }

    #[test]
    fn test_count_star_keeps_one_column() {
        let text = optimize("SELECT COUNT(*) FROM orders");
        assert!(text.ends_with("Scan: orders projection=[0]\n"), "{}", text);
    }

    #[test]
    fn test_join_keeps_key_and_output_columns() {
        let text = optimize(
            "SELECT c.name FROM orders o JOIN customers c ON o.customer_id = c.id",
        );
        assert!(text.contains("Scan: orders AS o projection=[1]"), "{}", text);
        assert!(text.contains("Scan: customers AS c projection=[0, 1]"), "{}", text);
    }

    #[test]
    fn test_inner_projection_is_narrowed() {
        let text = optimize("SELECT s.a FROM (SELECT id AS a, amount AS b FROM orders) s");
        assert!(text.contains("Projection: orders.id AS a\n"), "{}", text);
        assert!(text.contains("Scan: orders projection=[0]"), "{}", text);
    }

    #[test]
    fn test_union_branches_keep_shape() {
        let text = optimize("SELECT id FROM orders UNION ALL SELECT id FROM customers");
        assert!(text.contains("Scan: orders projection=[0]"), "{}", text);
        assert!(text.contains("Scan: customers projection=[0]"), "{}", text);
    }

    #[test]
    fn test_root_schema_is_unchanged() {
        let original = plan("SELECT * FROM orders");
        let mut optimizer = Optimizer::empty(OptimizerConfig::default());
        optimizer.add_rule(Arc::new(PushDownProjection));
        let optimized = optimizer.optimize(original.clone()).unwrap();
        assert_eq!(optimized, original);
    }
}
