//! Decorrelation of scalar subqueries into left joins.
//!
//! Execution has no per-row subquery path, so every scalar subquery must be
//! rewritten into a join before physical planning. For a subquery whose
//! correlated predicates are equalities between an inner column and an
//! outer column, the predicates are pulled out of the subquery, the inner
//! columns become extra group keys (and extra output columns), and the
//! subquery is left-joined to the outer input on those columns:
//!
//! ```text
//! Filter: (<subquery>) > 100               Projection: <outer columns>
//!   Scan: customers AS c          =>         Filter: __scalar_sq_1.MAX(o.amount) > 100
//!                                              Join: Left on=[c.id = __scalar_sq_1.customer_id]
//!                                                Scan: customers AS c
//!                                                SubqueryAlias: __scalar_sq_1
//!                                                  Projection: MAX(o.amount), o.customer_id
//!                                                    Aggregate: groupBy=[o.customer_id] ...
//! ```
//!
//! An uncorrelated subquery is left-joined with no keys. Outer rows without
//! a match see NULL, except where the subquery's value is a `COUNT`: there
//! the reference becomes `CASE WHEN <alias>.<key> IS NULL THEN 0 ELSE
//! <value> END`, since a count over no rows is zero.
//!
//! The subquery must return at most one row per outer row. That holds for
//! an aggregate grouped by nothing but correlation keys and for `LIMIT 1`;
//! any other shape is rejected rather than left to multiply outer rows.

use std::sync::Arc;

use tessera_common::constants::SCALAR_SUBQUERY_ALIAS_PREFIX;
use tracing::debug;

use super::{OptimizerError, OptimizerResult, OptimizerRule};
use crate::data::{Column, ScalarValue};
use crate::logical::{
    conjoin, transform_down, visit_plan, AggregateFunc, AggregateOperator, BinaryOp,
    FilterOperator, JoinOperator, JoinType, LogicalExpr, LogicalOperator, LogicalPlan,
    PlanResult, PlanVisitor, ProjectionOperator, SubqueryAliasOperator,
};

/// Rewrites scalar subqueries in filters and projections into left joins.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarSubqueryToJoin;

impl OptimizerRule for ScalarSubqueryToJoin {
    fn name(&self) -> &str {
        "scalar_subquery_to_join"
    }

    fn try_optimize(&self, op: &LogicalOperator) -> OptimizerResult<Option<LogicalOperator>> {
        let root = Arc::new(op.clone());
        let mut next_id = 1usize;
        let rewritten = transform_down(&root, &mut |node: &LogicalOperator| {
            decorrelate(node, &mut next_id)
        })?;
        if Arc::ptr_eq(&rewritten, &root) {
            Ok(None)
        } else {
            Ok(Some(rewritten.as_ref().clone()))
        }
    }
}

/// A correlated equality pulled out of a subquery: the inner column (as
/// visible at the current level of the subquery) and the outer column.
type Correlation = (Column, Column);

fn decorrelate(
    op: &LogicalOperator,
    next_id: &mut usize,
) -> OptimizerResult<Option<LogicalOperator>> {
    match op {
        LogicalOperator::Filter(filter) if filter.predicate.contains_subquery() => {
            let (joined, mut exprs) =
                join_subqueries(&filter.input, vec![filter.predicate.clone()], next_id)?;
            let predicate = exprs
                .pop()
                .ok_or_else(|| OptimizerError::Internal("filter predicate lost".into()))?;
            let filtered: Arc<LogicalOperator> =
                Arc::new(FilterOperator::try_new(joined, predicate)?.into());
            // Restore the filter's original output columns.
            let columns = filter
                .input
                .schema()
                .fields()
                .iter()
                .map(|field| LogicalExpr::Column(field.column()))
                .collect();
            Ok(Some(ProjectionOperator::try_new(filtered, columns)?.into()))
        }
        LogicalOperator::Projection(projection)
            if projection.exprs.iter().any(LogicalExpr::contains_subquery) =>
        {
            let (joined, exprs) =
                join_subqueries(&projection.input, projection.exprs.clone(), next_id)?;
            let exprs = exprs
                .into_iter()
                .zip(projection.exprs.iter())
                .map(|(new, old)| {
                    let name = old.output_name();
                    if new.output_name() == name {
                        new
                    } else {
                        new.alias(name)
                    }
                })
                .collect();
            Ok(Some(ProjectionOperator::try_new(joined, exprs)?.into()))
        }
        other => {
            if let Some(expr) = other.expressions().into_iter().find(|e| e.contains_subquery()) {
                return Err(OptimizerError::Unsupported(format!(
                    "scalar subquery in {} expression {}",
                    other.name(),
                    expr
                )));
            }
            Ok(None)
        }
    }
}

/// Left-joins every scalar subquery found in `exprs` onto `input` and
/// replaces each subquery with a reference to its value column.
fn join_subqueries(
    input: &Arc<LogicalOperator>,
    exprs: Vec<LogicalExpr>,
    next_id: &mut usize,
) -> OptimizerResult<(Arc<LogicalOperator>, Vec<LogicalExpr>)> {
    let mut subqueries: Vec<LogicalPlan> = Vec::new();
    for expr in &exprs {
        expr.apply(&mut |e| {
            if let LogicalExpr::ScalarSubquery(plan) = e {
                if !subqueries.contains(plan) {
                    subqueries.push(plan.clone());
                }
            }
            true
        });
    }

    let mut current = input.clone();
    let mut replacements: Vec<(LogicalPlan, LogicalExpr)> = Vec::with_capacity(subqueries.len());
    for subquery in subqueries {
        let alias = format!("{}{}", SCALAR_SUBQUERY_ALIAS_PREFIX, *next_id);
        *next_id += 1;
        let (joined, value) = join_subquery(current, &subquery, &alias)?;
        current = joined;
        replacements.push((subquery, value));
    }

    let exprs = exprs
        .into_iter()
        .map(|expr| {
            expr.transform_up(&mut |e| {
                PlanResult::Ok(match e {
                    LogicalExpr::ScalarSubquery(plan) => {
                        match replacements.iter().find(|(p, _)| *p == plan) {
                            Some((_, value)) => value.clone(),
                            None => LogicalExpr::ScalarSubquery(plan),
                        }
                    }
                    other => other,
                })
            })
        })
        .collect::<PlanResult<Vec<_>>>()?;
    Ok((current, exprs))
}

fn join_subquery(
    outer: Arc<LogicalOperator>,
    subquery: &LogicalPlan,
    alias: &str,
) -> OptimizerResult<(Arc<LogicalOperator>, LogicalExpr)> {
    let (inner, correlations) = pull_up_correlations(&subquery.root)?;
    if contains_outer_reference(&inner) {
        return Err(OptimizerError::Unsupported(
            "correlated subquery outside a filter".to_string(),
        ));
    }
    let keys: Vec<&Column> = correlations.iter().map(|(inner, _)| inner).collect();
    if !at_most_one_row(&subquery.root, &keys) {
        return Err(OptimizerError::Unsupported(format!(
            "scalar subquery that may return more than one row: {}",
            subquery.root.name()
        )));
    }

    let outer_schema = outer.schema();
    let value_name = inner
        .schema()
        .field(0)
        .map(|f| f.name.clone())
        .ok_or_else(|| OptimizerError::Internal("scalar subquery has no columns".into()))?;

    let mut on = Vec::with_capacity(correlations.len());
    for (inner_column, outer_column) in &correlations {
        if outer_schema.index_of_column(outer_column).is_none() {
            return Err(OptimizerError::Unsupported(format!(
                "subquery references {} from beyond its enclosing query",
                outer_column
            )));
        }
        on.push((
            LogicalExpr::Column(outer_column.clone()),
            LogicalExpr::Column(Column::qualified(alias, inner_column.name.clone())),
        ));
    }

    debug!(
        alias,
        keys = on.len(),
        "decorrelated scalar subquery into left join"
    );
    let unmatched = correlations
        .first()
        .filter(|_| counts_rows(&inner, &value_name))
        .map(|(key, _)| Column::qualified(alias, key.name.clone()));

    let aliased: Arc<LogicalOperator> = Arc::new(SubqueryAliasOperator::new(inner, alias).into());
    let joined = JoinOperator::try_new(outer, aliased, JoinType::Left, on, None)?;
    let value = LogicalExpr::Column(Column::qualified(alias, value_name));
    let value = match unmatched {
        Some(key) => LogicalExpr::Case {
            operand: None,
            when_then: vec![(
                LogicalExpr::Column(key).is_null(),
                LogicalExpr::lit(ScalarValue::from(0i64)),
            )],
            else_result: Some(Box::new(value)),
        },
        None => value,
    };
    Ok((Arc::new(joined.into()), value))
}

/// Returns true if `op` yields at most one row for each combination of
/// `keys`, once the correlated predicates on them are pulled out.
fn at_most_one_row(op: &LogicalOperator, keys: &[&Column]) -> bool {
    match op {
        LogicalOperator::Projection(p) => at_most_one_row(&p.input, keys),
        LogicalOperator::Filter(f) => at_most_one_row(&f.input, keys),
        LogicalOperator::SubqueryAlias(a) => at_most_one_row(&a.input, keys),
        LogicalOperator::Sort(s) => {
            s.fetch.is_some_and(|n| n <= 1) || at_most_one_row(&s.input, keys)
        }
        LogicalOperator::Limit(l) => {
            l.fetch.is_some_and(|n| n <= 1) || at_most_one_row(&l.input, keys)
        }
        LogicalOperator::Aggregate(a) => a.group_by.iter().all(|g| match g {
            LogicalExpr::Column(c) => keys.iter().any(|k| k.name == c.name),
            _ => false,
        }),
        LogicalOperator::EmptyRelation(_) => true,
        _ => false,
    }
}

/// Returns true if the column `name` of `op` is a `COUNT`, which is 0
/// rather than NULL over no rows.
fn counts_rows(op: &LogicalOperator, name: &str) -> bool {
    match op {
        LogicalOperator::Projection(p) => {
            let Some(expr) = p.exprs.iter().find(|e| e.output_name() == name) else {
                return false;
            };
            match unaliased(expr) {
                LogicalExpr::Column(c) => counts_rows(&p.input, &c.name),
                other => is_count(other),
            }
        }
        LogicalOperator::Filter(f) => counts_rows(&f.input, name),
        LogicalOperator::Sort(s) => counts_rows(&s.input, name),
        LogicalOperator::Limit(l) => counts_rows(&l.input, name),
        LogicalOperator::SubqueryAlias(a) => counts_rows(&a.input, name),
        LogicalOperator::Aggregate(a) => a
            .aggregates
            .iter()
            .any(|e| e.output_name() == name && is_count(unaliased(e))),
        _ => false,
    }
}

fn unaliased(mut expr: &LogicalExpr) -> &LogicalExpr {
    while let LogicalExpr::Alias { expr: inner, .. } = expr {
        expr = inner.as_ref();
    }
    expr
}

fn is_count(expr: &LogicalExpr) -> bool {
    matches!(
        expr,
        LogicalExpr::AggregateFunction {
            func: AggregateFunc::Count,
            ..
        }
    )
}

/// Removes correlated equality conjuncts from the filters of `op`, making
/// the inner side of each available in `op`'s output.
fn pull_up_correlations(
    op: &Arc<LogicalOperator>,
) -> OptimizerResult<(Arc<LogicalOperator>, Vec<Correlation>)> {
    match op.as_ref() {
        LogicalOperator::Filter(filter) => {
            let (input, mut correlations) = pull_up_correlations(&filter.input)?;
            let mut kept = Vec::new();
            for conjunct in filter.conjuncts() {
                if !conjunct.contains_outer_reference() {
                    kept.push(conjunct.clone());
                    continue;
                }
                match correlated_equality(conjunct) {
                    Some(correlation) => correlations.push(correlation),
                    None => {
                        return Err(OptimizerError::Unsupported(format!(
                            "correlated predicate {}",
                            conjunct
                        )))
                    }
                }
            }
            let rebuilt = match conjoin(kept) {
                Some(predicate) => Arc::new(FilterOperator::try_new(input, predicate)?.into()),
                None => input,
            };
            Ok((rebuilt, correlations))
        }
        LogicalOperator::Projection(projection) => {
            reject_outer_references(op)?;
            let (input, correlations) = pull_up_correlations(&projection.input)?;
            if correlations.is_empty() {
                return Ok((op.clone(), correlations));
            }
            let mut exprs = projection.exprs.clone();
            for (inner, _) in &correlations {
                let present = exprs
                    .iter()
                    .any(|e| matches!(e, LogicalExpr::Column(c) if c == inner));
                if !present {
                    exprs.push(LogicalExpr::Column(inner.clone()));
                }
            }
            let rebuilt = ProjectionOperator::try_new(input, exprs)?;
            Ok((Arc::new(rebuilt.into()), correlations))
        }
        LogicalOperator::Aggregate(aggregate) => {
            reject_outer_references(op)?;
            let (input, correlations) = pull_up_correlations(&aggregate.input)?;
            if correlations.is_empty() {
                return Ok((op.clone(), correlations));
            }
            let mut group_by = aggregate.group_by.clone();
            for (inner, _) in &correlations {
                let key = LogicalExpr::Column(inner.clone());
                if !group_by.contains(&key) {
                    group_by.push(key);
                }
            }
            let rebuilt =
                AggregateOperator::try_new(input, group_by, aggregate.aggregates.clone())?;
            Ok((Arc::new(rebuilt.into()), correlations))
        }
        LogicalOperator::SubqueryAlias(alias) => {
            let (input, correlations) = pull_up_correlations(&alias.input)?;
            if correlations.is_empty() {
                return Ok((op.clone(), correlations));
            }
            let correlations = correlations
                .into_iter()
                .map(|(inner, outer)| (Column::qualified(&alias.alias, inner.name), outer))
                .collect();
            let rebuilt = SubqueryAliasOperator::new(input, alias.alias.clone());
            Ok((Arc::new(rebuilt.into()), correlations))
        }
        LogicalOperator::Sort(sort) => {
            reject_outer_references(op)?;
            let (input, correlations) = pull_up_correlations(&sort.input)?;
            if correlations.is_empty() {
                return Ok((op.clone(), correlations));
            }
            Ok((Arc::new(op.with_new_inputs(vec![input])?), correlations))
        }
        _ => {
            if contains_outer_reference(op) {
                return Err(OptimizerError::Unsupported(format!(
                    "correlated subquery through {}",
                    op.name()
                )));
            }
            Ok((op.clone(), Vec::new()))
        }
    }
}

/// Matches `inner = outer_ref(x)` in either orientation.
fn correlated_equality(expr: &LogicalExpr) -> Option<Correlation> {
    let LogicalExpr::BinaryOp {
        left,
        op: BinaryOp::Eq,
        right,
    } = expr
    else {
        return None;
    };
    match (left.as_ref(), right.as_ref()) {
        (LogicalExpr::Column(inner), LogicalExpr::OuterReferenceColumn { column, .. })
        | (LogicalExpr::OuterReferenceColumn { column, .. }, LogicalExpr::Column(inner)) => {
            Some((inner.clone(), column.clone()))
        }
        _ => None,
    }
}

fn reject_outer_references(op: &LogicalOperator) -> OptimizerResult<()> {
    match op
        .expressions()
        .into_iter()
        .find(|e| e.contains_outer_reference())
    {
        Some(expr) => Err(OptimizerError::Unsupported(format!(
            "outer reference in {} expression {}",
            op.name(),
            expr
        ))),
        None => Ok(()),
    }
}

struct OuterReferenceFinder {
    found: bool,
}

impl PlanVisitor for OuterReferenceFinder {
    fn pre_visit(&mut self, op: &LogicalOperator) -> bool {
        self.found = self.found
            || op
                .expressions()
                .into_iter()
                .any(LogicalExpr::contains_outer_reference);
        !self.found
    }
}

fn contains_outer_reference(op: &LogicalOperator) -> bool {
    let mut finder = OuterReferenceFinder { found: false };
    visit_plan(op, &mut finder);
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::test_util::plan;
    use crate::optimizer::{Optimizer, OptimizerConfig};

    fn optimizer() -> Optimizer {
        let mut optimizer = Optimizer::empty(OptimizerConfig::default());
        optimizer.add_rule(Arc::new(ScalarSubqueryToJoin));
        optimizer
    }

    #[test]
    fn test_correlated_filter_subquery() {
        let original = plan(
            "SELECT c.name FROM customers c \
             WHERE (SELECT MAX(o.amount) FROM orders o WHERE o.customer_id = c.id) > 100",
        );
        let optimized = optimizer().optimize(original.clone()).unwrap();
        assert_eq!(
            optimized.display(),
            "Projection: c.name\n\
             \x20 Projection: c.id, c.name, c.region\n\
             \x20   Filter: __scalar_sq_1.MAX(o.amount) > 100\n\
             \x20     Join: Left on=[c.id = __scalar_sq_1.customer_id]\n\
             \x20       Scan: customers AS c\n\
             \x20       SubqueryAlias: __scalar_sq_1\n\
             \x20         Projection: MAX(o.amount), o.customer_id\n\
             \x20           Aggregate: groupBy=[o.customer_id] aggr=[MAX(o.amount)]\n\
             \x20             Scan: orders AS o\n"
        );
        assert_eq!(optimized.schema(), original.schema());
    }

    #[test]
    fn test_uncorrelated_subquery_joins_without_keys() {
        let optimized = optimizer()
            .optimize(plan(
                "SELECT id FROM orders WHERE amount > (SELECT AVG(amount) FROM orders)",
            ))
            .unwrap();
        let text = optimized.display();
        assert!(text.contains("Join: Left on=[]"));
        assert!(text.contains("SubqueryAlias: __scalar_sq_1"));
        assert!(!text.contains("<subquery>"));
    }

    #[test]
    fn test_projection_subquery_keeps_output_names() {
        let original = plan(
            "SELECT c.name, (SELECT COUNT(*) FROM orders o WHERE o.customer_id = c.id) AS n \
             FROM customers c",
        );
        let optimized = optimizer().optimize(original.clone()).unwrap();
        assert_eq!(optimized.schema().field_names(), vec!["name", "n"]);
        assert_eq!(
            optimized.schema().fields()[1].data_type,
            original.schema().fields()[1].data_type
        );
        assert!(optimized.display().contains("groupBy=[o.customer_id]"));
    }

    #[test]
    fn test_two_subqueries_get_distinct_aliases() {
        let optimized = optimizer()
            .optimize(plan(
                "SELECT id FROM orders \
                 WHERE amount > (SELECT MIN(amount) FROM orders) \
                 AND amount < (SELECT MAX(amount) FROM orders)",
            ))
            .unwrap();
        let text = optimized.display();
        assert!(text.contains("__scalar_sq_1"));
        assert!(text.contains("__scalar_sq_2"));
    }

    #[test]
    fn test_correlated_count_defaults_to_zero() {
        let optimized = optimizer()
            .optimize(plan(
                "SELECT c.id FROM customers c \
                 WHERE (SELECT COUNT(*) FROM orders o WHERE o.customer_id = c.id) = 0",
            ))
            .unwrap();
        let text = optimized.display();
        assert!(
            text.contains("Filter: CASE WHEN __scalar_sq_1.customer_id IS NULL THEN 0 ELSE"),
            "{text}"
        );

        let uncorrelated = optimizer()
            .optimize(plan("SELECT id FROM orders WHERE id < (SELECT COUNT(*) FROM customers)"))
            .unwrap();
        assert!(!uncorrelated.display().contains("CASE"));
    }

    #[test]
    fn test_multi_row_subquery_is_rejected() {
        let err = optimizer()
            .optimize(plan("SELECT id, (SELECT id FROM customers) AS c FROM orders"))
            .unwrap_err();
        assert!(matches!(err, OptimizerError::Unsupported(_)));

        let err = optimizer()
            .optimize(plan(
                "SELECT name FROM customers c \
                 WHERE (SELECT SUM(o.amount) FROM orders o WHERE o.customer_id = c.id \
                 GROUP BY o.status) > 1",
            ))
            .unwrap_err();
        assert!(matches!(err, OptimizerError::Unsupported(_)));
    }

    #[test]
    fn test_single_row_subquery_shapes_are_accepted() {
        for sql in [
            "SELECT id, (SELECT id FROM customers LIMIT 1) AS c FROM orders",
            "SELECT name FROM customers c \
             WHERE (SELECT SUM(o.amount) FROM orders o WHERE o.customer_id = c.id \
             GROUP BY o.customer_id) > 1",
        ] {
            assert!(optimizer().optimize(plan(sql)).is_ok(), "{sql}");
        }
    }

    #[test]
    fn test_non_equality_correlation_is_unsupported() {
        let err = optimizer()
            .optimize(plan(
                "SELECT name FROM customers c \
                 WHERE (SELECT MAX(o.amount) FROM orders o WHERE o.customer_id > c.id) > 1",
            ))
            .unwrap_err();
        assert!(matches!(err, OptimizerError::Unsupported(_)));
    }
}
