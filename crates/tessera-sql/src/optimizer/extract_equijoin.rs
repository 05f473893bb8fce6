//! Extraction of hash-joinable equality keys from join conditions.

use std::sync::Arc;

use super::{ApplyOrder, OptimizerResult, OptimizerRule};
use crate::data::Schema;
use crate::logical::{
    conjoin, BinaryOp, CrossJoinOperator, FilterOperator, JoinOperator, JoinType, LogicalExpr,
    LogicalOperator,
};

/// Moves `left = right` conjuncts out of join filters (and out of filters
/// sitting on cross joins) into structured join keys.
///
/// A filter over a cross join or inner join is split three ways: equalities
/// between the two sides become keys, conjuncts over one side only move
/// below the join onto that side, and the rest stays above.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractEquijoinPredicate;

impl OptimizerRule for ExtractEquijoinPredicate {
    fn name(&self) -> &str {
        "extract_equijoin_predicate"
    }

    fn apply_order(&self) -> Option<ApplyOrder> {
        Some(ApplyOrder::BottomUp)
    }

    fn try_optimize(&self, op: &LogicalOperator) -> OptimizerResult<Option<LogicalOperator>> {
        match op {
            LogicalOperator::Join(join) => {
                let Some(filter) = &join.filter else {
                    return Ok(None);
                };
                let split = Split::new(
                    crate::logical::extract_conjuncts(filter),
                    &join.left.schema(),
                    &join.right.schema(),
                );
                if split.keys.is_empty() {
                    return Ok(None);
                }
                let mut on = join.on.clone();
                on.extend(split.keys);
                let residual = conjoin(
                    split
                        .left_only
                        .into_iter()
                        .chain(split.right_only)
                        .chain(split.rest)
                        .collect(),
                );
                let rebuilt = JoinOperator::try_new(
                    join.left.clone(),
                    join.right.clone(),
                    join.join_type,
                    on,
                    residual,
                )?;
                Ok(Some(rebuilt.into()))
            }
            LogicalOperator::Filter(filter) => {
                let Some((left, right)) = inner_join_sides(&filter.input) else {
                    return Ok(None);
                };
                let conjuncts: Vec<LogicalExpr> =
                    filter.conjuncts().into_iter().cloned().collect();
                let split = Split::new(
                    conjuncts.iter().collect(),
                    &left.schema(),
                    &right.schema(),
                );
                if !split.moves_anything() {
                    return Ok(None);
                }
                let rewritten = push_filter(filter.input.clone(), conjuncts)?;
                Ok(Some(
                    Arc::try_unwrap(rewritten).unwrap_or_else(|shared| (*shared).clone()),
                ))
            }
            _ => Ok(None),
        }
    }
}

/// Places `conjuncts` as close to `input` as possible, turning equalities
/// across a cross or inner join into keys.
fn push_filter(
    input: Arc<LogicalOperator>,
    conjuncts: Vec<LogicalExpr>,
) -> OptimizerResult<Arc<LogicalOperator>> {
    if conjuncts.is_empty() {
        return Ok(input);
    }
    let Some((left, right)) = inner_join_sides(&input) else {
        return wrap_filter(input, conjuncts);
    };
    let split = Split::new(conjuncts.iter().collect(), &left.schema(), &right.schema());
    if !split.moves_anything() {
        return wrap_filter(input, conjuncts);
    }

    let new_left = push_filter(left.clone(), split.left_only)?;
    let new_right = push_filter(right.clone(), split.right_only)?;
    let joined: LogicalOperator = match input.as_ref() {
        LogicalOperator::Join(join) => {
            let mut on = join.on.clone();
            on.extend(split.keys);
            JoinOperator::try_new(new_left, new_right, JoinType::Inner, on, join.filter.clone())?
                .into()
        }
        _ if split.keys.is_empty() => CrossJoinOperator::new(new_left, new_right).into(),
        _ => JoinOperator::try_new(new_left, new_right, JoinType::Inner, split.keys, None)?.into(),
    };
    wrap_filter(Arc::new(joined), split.rest)
}

fn wrap_filter(
    input: Arc<LogicalOperator>,
    conjuncts: Vec<LogicalExpr>,
) -> OptimizerResult<Arc<LogicalOperator>> {
    Ok(match conjoin(conjuncts) {
        Some(predicate) => Arc::new(FilterOperator::try_new(input, predicate)?.into()),
        None => input,
    })
}

/// Returns the inputs of a cross join or inner join.
fn inner_join_sides(op: &LogicalOperator) -> Option<(&Arc<LogicalOperator>, &Arc<LogicalOperator>)> {
    match op {
        LogicalOperator::CrossJoin(cross) => Some((&cross.left, &cross.right)),
        LogicalOperator::Join(join) if join.join_type == JoinType::Inner => {
            Some((&join.left, &join.right))
        }
        _ => None,
    }
}

#[derive(Debug, PartialEq)]
enum Side {
    Left,
    Right,
    Spanning,
    Neither,
}

fn side_of(expr: &LogicalExpr, left: &Schema, right: &Schema) -> Side {
    let columns = expr.columns();
    if columns.is_empty() || expr.contains_outer_reference() {
        return Side::Neither;
    }
    let in_left = columns.iter().all(|c| left.index_of_column(c).is_some());
    let in_right = columns.iter().all(|c| right.index_of_column(c).is_some());
    match (in_left, in_right) {
        (true, false) => Side::Left,
        (false, true) => Side::Right,
        (false, false) => Side::Spanning,
        (true, true) => Side::Neither,
    }
}

/// Conjuncts of a join condition, classified against the two join inputs.
struct Split {
    keys: Vec<(LogicalExpr, LogicalExpr)>,
    left_only: Vec<LogicalExpr>,
    right_only: Vec<LogicalExpr>,
    rest: Vec<LogicalExpr>,
}

impl Split {
    fn new(conjuncts: Vec<&LogicalExpr>, left: &Schema, right: &Schema) -> Self {
        let mut split = Split {
            keys: Vec::new(),
            left_only: Vec::new(),
            right_only: Vec::new(),
            rest: Vec::new(),
        };
        for conjunct in conjuncts {
            if let Some(key) = equijoin_key(conjunct, left, right) {
                split.keys.push(key);
                continue;
            }
            match side_of(conjunct, left, right) {
                Side::Left => split.left_only.push(conjunct.clone()),
                Side::Right => split.right_only.push(conjunct.clone()),
                Side::Spanning | Side::Neither => split.rest.push(conjunct.clone()),
            }
        }
        split
    }

    fn moves_anything(&self) -> bool {
        !(self.keys.is_empty() && self.left_only.is_empty() && self.right_only.is_empty())
    }
}

/// Returns `(left_expr, right_expr)` if `expr` is an equality whose operands
/// come from opposite sides.
fn equijoin_key(
    expr: &LogicalExpr,
    left: &Schema,
    right: &Schema,
) -> Option<(LogicalExpr, LogicalExpr)> {
    let LogicalExpr::BinaryOp {
        left: l,
        op: BinaryOp::Eq,
        right: r,
    } = expr
    else {
        return None;
    };
    match (side_of(l, left, right), side_of(r, left, right)) {
        (Side::Left, Side::Right) => Some((l.as_ref().clone(), r.as_ref().clone())),
        (Side::Right, Side::Left) => Some((r.as_ref().clone(), l.as_ref().clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::test_util::plan;
    use crate::optimizer::{Optimizer, OptimizerConfig};

    fn optimize(sql: &str) -> String {
        let mut optimizer = Optimizer::empty(OptimizerConfig::default());
        optimizer.add_rule(Arc::new(ExtractEquijoinPredicate));
        optimizer.optimize(plan(sql)).unwrap().display()
    }

    #[test]
    fn test_join_filter_split_into_keys_and_residual() {
        let text = optimize(
            "SELECT o.id FROM orders o LEFT JOIN customers c \
             ON o.customer_id = c.id AND o.amount > 10",
        );
        assert!(
            text.contains("Join: Left on=[o.customer_id = c.id] filter=o.amount > 10"),
            "{}",
            text
        );
    }

    #[test]
    fn test_swapped_equality_is_oriented() {
        let text = optimize("SELECT o.id FROM orders o JOIN customers c ON c.id = o.customer_id");
        assert!(text.contains("Join: Inner on=[o.customer_id = c.id]\n"), "{}", text);
    }

    #[test]
    fn test_filter_over_cross_join_becomes_inner_join() {
        let text = optimize(
            "SELECT o.id, c.name FROM orders o, customers c \
             WHERE o.customer_id = c.id AND o.amount > 10 AND c.region <> o.status",
        );
        assert_eq!(
            text,
            "Projection: o.id, c.name\n\
             \x20 Filter: c.region <> o.status\n\
             \x20   Join: Inner on=[o.customer_id = c.id]\n\
             \x20     Filter: o.amount > 10\n\
             \x20       Scan: orders AS o\n\
             \x20     Scan: customers AS c\n"
        );
    }

    #[test]
    fn test_three_way_cross_join() {
        let text = optimize(
            "SELECT a.id FROM orders a, customers b, orders c \
             WHERE a.customer_id = b.id AND b.id = c.customer_id",
        );
        assert!(!text.contains("CrossJoin"), "{}", text);
        assert!(text.contains("on=[b.id = c.customer_id]"), "{}", text);
        assert!(text.contains("on=[a.customer_id = b.id]"), "{}", text);
    }

    #[test]
    fn test_non_equality_stays_in_filter() {
        let original = plan("SELECT o.id FROM orders o, customers c WHERE o.customer_id < c.id");
        let mut optimizer = Optimizer::empty(OptimizerConfig::default());
        optimizer.add_rule(Arc::new(ExtractEquijoinPredicate));
        assert_eq!(optimizer.optimize(original.clone()).unwrap(), original);
    }
}
